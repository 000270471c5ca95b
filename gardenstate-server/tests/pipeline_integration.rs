//! End-to-end enrichment runs against the in-memory store with a scripted
//! generation backend.

mod common;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gardenstate_core::config::PipelineConfig;
use gardenstate_core::models::{Entry, InvocationResult, Role, ASSISTANT_UID};
use gardenstate_core::{DocumentStore, MemoryStore, Part};
use gardenstate_server::subsystems::enrich::{EnrichmentPipeline, PipelineSettings, PipelineState};
use gardenstate_server::subsystems::media::HttpImageSource;
use gardenstate_server::subsystems::queue::{
    run_dispatcher, run_invocation, DispatchReport, TriggerQueue,
};
use gardenstate_server::subsystems::writer::APOLOGY_MESSAGE;

use common::*;

async fn load_entry(store: &MemoryStore) -> Entry {
    store.get_entry(SUBJECT_ID, ENTRY_ID).await.unwrap().unwrap()
}

fn no_images() -> Arc<MapImageSource> {
    Arc::new(MapImageSource::default())
}

// ===========================================================================
// Skips
// ===========================================================================

#[tokio::test]
async fn test_entry_without_messages_is_skipped_without_writes() {
    let store = seeded_store(subject(vec![entry(ENTRY_ID, vec![])])).await;
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let pipeline = pipeline(store.clone(), backend.clone(), no_images());

    let trigger = msg("m1", 1, Role::User, "hello?", &[]);
    let report = pipeline.run(&event_for(&trigger)).await.unwrap();

    assert!(matches!(report.result, InvocationResult::Skipped { .. }));
    assert_eq!(backend.call_count(), 0);
    assert!(load_entry(&store).await.messages.is_empty());
}

#[tokio::test]
async fn test_assistant_message_is_ignored() {
    let reply = msg("m2", 2, Role::Assistant, "Water less.", &[]);
    let store = seeded_store(subject(vec![entry(
        ENTRY_ID,
        vec![msg("m1", 1, Role::User, "help", &[]), reply.clone()],
    )]))
    .await;
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let pipeline = pipeline(store.clone(), backend.clone(), no_images());

    let report = pipeline.run(&event_for(&reply)).await.unwrap();

    assert_eq!(report.state, PipelineState::Idle);
    assert!(matches!(report.result, InvocationResult::Skipped { .. }));
    assert_eq!(backend.call_count(), 0);
    assert_eq!(load_entry(&store).await.messages.len(), 2);
}

#[tokio::test]
async fn test_missing_entry_is_skipped() {
    let store = seeded_store(subject(vec![])).await;
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let pipeline = pipeline(store, backend.clone(), no_images());

    let trigger = msg("m1", 1, Role::User, "hello?", &[]);
    let report = pipeline.run(&event_for(&trigger)).await.unwrap();

    assert!(matches!(report.result, InvocationResult::Skipped { .. }));
    assert_eq!(backend.call_count(), 0);
}

// ===========================================================================
// Happy path and naming
// ===========================================================================

#[tokio::test]
async fn test_unnamed_entry_gets_reply_name_and_summary() {
    let trigger = msg("m1", 1, Role::User, "Why are the fronds yellow?", &[]);
    let store = seeded_store(subject(vec![entry(ENTRY_ID, vec![trigger.clone()])])).await;
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok("Probably overwatering.".to_string()),
        Ok("ENTRY_NAME: Yellow Fronds\nSUMMARY: Overwatering suspected".to_string()),
    ]));
    let pipeline = pipeline(store.clone(), backend.clone(), no_images());

    let report = pipeline.run(&event_for(&trigger)).await.unwrap();

    assert_eq!(report.state, PipelineState::Summarized);
    assert_eq!(report.result, InvocationResult::Success);
    assert_eq!(backend.call_count(), 2);

    let reply_prompt = backend.prompt(0);
    assert!(reply_prompt.contains("helpful gardening assistant"));
    assert!(reply_prompt.contains("Name: Fernando"));
    assert!(reply_prompt.contains("User: Why are the fronds yellow?"));
    assert!(backend.prompt(1).contains("ENTRY_NAME: [suggested name]"));

    let saved = load_entry(&store).await;
    assert_eq!(saved.messages.len(), 2);
    let reply = &saved.messages[1];
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.uid, ASSISTANT_UID);
    assert_eq!(reply.content, "Probably overwatering.");
    assert_eq!(saved.name.as_deref(), Some("Yellow Fronds"));
    assert_eq!(saved.summary, "Overwatering suspected");
}

#[tokio::test]
async fn test_named_entry_keeps_its_name() {
    let trigger = msg("m1", 1, Role::User, "Repotted today", &[]);
    let mut named = entry(ENTRY_ID, vec![trigger.clone()]);
    named.name = Some("Repotting".to_string());
    let store = seeded_store(subject(vec![named])).await;
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok("Nice work.".to_string()),
        Ok("ENTRY_NAME: Something Else\nSUMMARY: Moved to a bigger pot".to_string()),
    ]));
    let pipeline = pipeline(store.clone(), backend.clone(), no_images());

    pipeline.run(&event_for(&trigger)).await.unwrap();

    assert!(!backend.prompt(1).contains("ENTRY_NAME"));
    let saved = load_entry(&store).await;
    assert_eq!(saved.name.as_deref(), Some("Repotting"));
    assert_eq!(saved.summary, "Moved to a bigger pot");
}

#[tokio::test]
async fn test_whitespace_name_counts_as_blank() {
    let trigger = msg("m1", 1, Role::User, "Aphids!", &[]);
    let mut blank = entry(ENTRY_ID, vec![trigger.clone()]);
    blank.name = Some("   ".to_string());
    let store = seeded_store(subject(vec![blank])).await;
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok("Try neem oil.".to_string()),
        Ok("ENTRY_NAME: Aphid Outbreak\nSUMMARY: Aphids on new growth".to_string()),
    ]));
    let pipeline = pipeline(store.clone(), backend, no_images());

    pipeline.run(&event_for(&trigger)).await.unwrap();

    assert_eq!(load_entry(&store).await.name.as_deref(), Some("Aphid Outbreak"));
}

#[tokio::test]
async fn test_unmarked_summary_response_is_used_whole() {
    let trigger = msg("m1", 1, Role::User, "Watered", &[]);
    let store = seeded_store(subject(vec![entry(ENTRY_ID, vec![trigger.clone()])])).await;
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok("Good.".to_string()),
        Ok("  Just a plain sentence.\n".to_string()),
    ]));
    let pipeline = pipeline(store.clone(), backend, no_images());

    pipeline.run(&event_for(&trigger)).await.unwrap();

    let saved = load_entry(&store).await;
    assert_eq!(saved.summary, "Just a plain sentence.");
    assert!(saved.name.is_none());
}

// ===========================================================================
// Context assembly
// ===========================================================================

#[tokio::test]
async fn test_conversation_is_ordered_by_timestamp() {
    let trigger = msg("m3", 3, Role::User, "third", &[]);
    let store = seeded_store(subject(vec![entry(
        ENTRY_ID,
        vec![
            trigger.clone(),
            msg("m1", 1, Role::User, "first", &[]),
            msg("m2", 2, Role::Assistant, "answer", &[]),
        ],
    )]))
    .await;
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let pipeline = pipeline(store, backend.clone(), no_images());

    pipeline.run(&event_for(&trigger)).await.unwrap();

    assert!(backend
        .prompt(0)
        .contains("User: first\n\nAssistant: answer\n\nUser: third"));
}

#[tokio::test]
async fn test_reply_uses_recent_window_and_summary_uses_all_turns() {
    let messages: Vec<_> = (0..12)
        .map(|i| msg(&format!("m{}", i), i, Role::User, &format!("msg-{:02}", i), &[]))
        .collect();
    let trigger = messages[11].clone();
    let store = seeded_store(subject(vec![entry(ENTRY_ID, messages)])).await;
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let pipeline = pipeline(store, backend.clone(), no_images());

    pipeline.run(&event_for(&trigger)).await.unwrap();

    let reply_prompt = backend.prompt(0);
    assert!(!reply_prompt.contains("msg-00"));
    assert!(!reply_prompt.contains("msg-01"));
    assert!(reply_prompt.contains("msg-02"));
    assert!(reply_prompt.contains("msg-11"));

    let summary_prompt = backend.prompt(1);
    assert!(summary_prompt.contains("msg-00"));
    assert!(summary_prompt.contains("msg-11"));
}

#[tokio::test]
async fn test_sibling_context_is_capped_to_newest_entries() {
    let trigger = msg("m1", 1, Role::User, "How is it doing?", &[]);
    let mut entries = vec![entry(ENTRY_ID, vec![trigger.clone()])];
    for day in 1..=7 {
        let mut sibling = entry(&format!("old-{}", day), vec![]);
        sibling.entry_date = Some(format!("2024-04-0{}", day));
        sibling.summary = format!("summary-{}", day);
        entries.push(sibling);
    }
    let store = seeded_store(subject(entries)).await;
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let pipeline = EnrichmentPipeline::new(
        store,
        backend.clone(),
        no_images(),
        PipelineSettings {
            context_entries: 5,
            ..Default::default()
        },
    );

    pipeline.run(&event_for(&trigger)).await.unwrap();

    let prompt = backend.prompt(0);
    assert_eq!(prompt.matches("Entry from ").count(), 5);
    assert!(prompt.contains("Entry from 4/7/2024:\nAI summary: summary-7"));
    assert!(prompt.contains("summary-3"));
    assert!(!prompt.contains("summary-2"));
    assert!(!prompt.contains("summary-1"));
}

// ===========================================================================
// Images
// ===========================================================================

#[tokio::test]
async fn test_failed_image_is_dropped_and_others_inlined() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"leaf-a".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"leaf-c".to_vec()))
        .mount(&server)
        .await;

    let urls: Vec<String> = ["a", "b", "c"]
        .iter()
        .map(|n| format!("{}/{}.jpg", server.uri(), n))
        .collect();
    let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let trigger = msg("m1", 1, Role::User, "spots?", &refs);
    let store = seeded_store(subject(vec![entry(ENTRY_ID, vec![trigger.clone()])])).await;
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let images = Arc::new(HttpImageSource::new(Duration::from_secs(5)).unwrap());
    let pipeline = pipeline(store, backend.clone(), images);

    let report = pipeline.run(&event_for(&trigger)).await.unwrap();
    assert_eq!(report.result, InvocationResult::Success);

    let parts = backend.call(0);
    assert_eq!(parts.len(), 3);
    assert!(matches!(parts[0], Part::Text(_)));
    assert!(backend.prompt(0).contains("[shared 3 image(s)]"));
    assert_eq!(
        parts[1],
        Part::InlineData {
            mime_type: "image/jpeg".to_string(),
            data: STANDARD.encode(b"leaf-a"),
        }
    );
    assert_eq!(
        parts[2],
        Part::InlineData {
            mime_type: "image/jpeg".to_string(),
            data: STANDARD.encode(b"leaf-c"),
        }
    );

    // Summary call is text-only.
    assert_eq!(backend.call(1).len(), 1);
}

// ===========================================================================
// Failures
// ===========================================================================

#[tokio::test]
async fn test_reply_failure_writes_single_apology() {
    let trigger = msg("m1", 1, Role::User, "help", &[]);
    let mut existing = entry(ENTRY_ID, vec![trigger.clone()]);
    existing.summary = "old summary".to_string();
    let store = seeded_store(subject(vec![existing])).await;
    let backend = Arc::new(ScriptedBackend::new(vec![Err(api_error())]));
    let pipeline = pipeline(store.clone(), backend.clone(), no_images());

    let report = pipeline.run(&event_for(&trigger)).await.unwrap();

    assert_eq!(report.state, PipelineState::Failed);
    assert!(matches!(report.result, InvocationResult::Error { .. }));
    assert_eq!(backend.call_count(), 1);

    let saved = load_entry(&store).await;
    assert_eq!(saved.messages.len(), 2);
    assert_eq!(saved.messages[1].content, APOLOGY_MESSAGE);
    assert_eq!(saved.messages[1].uid, ASSISTANT_UID);
    assert_eq!(saved.summary, "old summary");
    assert!(saved.name.is_none());
}

#[tokio::test]
async fn test_summary_failure_keeps_reply_and_apologizes() {
    let trigger = msg("m1", 1, Role::User, "help", &[]);
    let store = seeded_store(subject(vec![entry(ENTRY_ID, vec![trigger.clone()])])).await;
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok("Here is advice.".to_string()),
        Err(api_error()),
    ]));
    let pipeline = pipeline(store.clone(), backend, no_images());

    let report = pipeline.run(&event_for(&trigger)).await.unwrap();

    assert_eq!(report.state, PipelineState::FailedAfterReply);
    let saved = load_entry(&store).await;
    let contents: Vec<&str> = saved.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["help", "Here is advice.", APOLOGY_MESSAGE]);
    assert_eq!(saved.summary, "");
    assert!(saved.name.is_none());
}

#[tokio::test]
async fn test_deadline_abandons_run_without_apology() {
    let trigger = msg("m1", 1, Role::User, "slow one", &[]);
    let store = seeded_store(subject(vec![entry(ENTRY_ID, vec![trigger.clone()])])).await;
    let backend =
        Arc::new(ScriptedBackend::new(vec![]).with_delay(Duration::from_millis(500)));
    let pipeline = pipeline(store.clone(), backend, no_images());

    let report = run_invocation(&pipeline, &event_for(&trigger), Duration::from_millis(20)).await;

    assert!(report.is_none());
    assert_eq!(load_entry(&store).await.messages.len(), 1);
}

// ===========================================================================
// Queue
// ===========================================================================

#[tokio::test]
async fn test_dispatcher_runs_queued_events() {
    let trigger = msg("m1", 1, Role::User, "queued", &[]);
    let store = seeded_store(subject(vec![entry(ENTRY_ID, vec![trigger.clone()])])).await;
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok("Queued reply.".to_string()),
        Ok("SUMMARY: handled via queue".to_string()),
    ]));
    let pipeline = pipeline(store.clone(), backend, no_images());

    let (queue, rx) = TriggerQueue::channel(8);
    let (shutdown_tx, _) = broadcast::channel(1);
    let dispatcher = tokio::spawn(run_dispatcher(
        pipeline,
        rx,
        PipelineConfig::default(),
        shutdown_tx.subscribe(),
    ));

    queue.enqueue(event_for(&trigger)).unwrap();

    let mut saved = load_entry(&store).await;
    for _ in 0..100 {
        if saved.summary == "handled via queue" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        saved = load_entry(&store).await;
    }
    assert_eq!(saved.summary, "handled via queue");
    assert_eq!(saved.messages[1].content, "Queued reply.");

    shutdown_tx.send(()).unwrap();
    dispatcher.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_invocation() {
    let trigger = msg("m1", 1, Role::User, "slow one", &[]);
    let store = seeded_store(subject(vec![entry(ENTRY_ID, vec![trigger.clone()])])).await;
    let backend = Arc::new(
        ScriptedBackend::new(vec![
            Ok("Patient reply.".to_string()),
            Ok("SUMMARY: finished during shutdown".to_string()),
        ])
        .with_delay(Duration::from_millis(100)),
    );
    let pipeline = pipeline(store.clone(), backend, no_images());

    let (queue, rx) = TriggerQueue::channel(8);
    let (shutdown_tx, _) = broadcast::channel(1);
    let config = PipelineConfig {
        shutdown_grace_seconds: 5,
        ..Default::default()
    };
    let dispatcher = tokio::spawn(run_dispatcher(pipeline, rx, config, shutdown_tx.subscribe()));

    queue.enqueue(event_for(&trigger)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown_tx.send(()).unwrap();

    let report = dispatcher.await.unwrap();
    assert_eq!(report, DispatchReport::default());
    let saved = load_entry(&store).await;
    assert_eq!(saved.summary, "finished during shutdown");
    assert_eq!(saved.messages.len(), 2);
}

#[tokio::test]
async fn test_shutdown_is_seen_while_all_workers_are_busy() {
    let first = msg("m1", 1, Role::User, "first", &[]);
    let second = msg("m2", 2, Role::User, "second", &[]);
    let store = seeded_store(subject(vec![entry(
        ENTRY_ID,
        vec![first.clone(), second.clone()],
    )]))
    .await;
    let backend = Arc::new(ScriptedBackend::new(vec![]).with_delay(Duration::from_secs(30)));
    let pipeline = pipeline(store.clone(), backend, no_images());

    let (queue, rx) = TriggerQueue::channel(8);
    let (shutdown_tx, _) = broadcast::channel(1);
    let config = PipelineConfig {
        workers: 1,
        shutdown_grace_seconds: 0,
        ..Default::default()
    };
    let dispatcher = tokio::spawn(run_dispatcher(pipeline, rx, config, shutdown_tx.subscribe()));

    queue.enqueue(event_for(&first)).unwrap();
    queue.enqueue(event_for(&second)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(()).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(2), dispatcher)
        .await
        .expect("dispatcher should stop promptly")
        .unwrap();
    assert_eq!(
        report,
        DispatchReport {
            abandoned: 1,
            not_started: 1,
        }
    );
    assert_eq!(load_entry(&store).await.messages.len(), 2);
}
