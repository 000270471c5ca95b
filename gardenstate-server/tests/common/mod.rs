//! Fakes and fixtures shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gardenstate_core::models::{Entry, Message, Role, Subject, TriggerEvent};
use gardenstate_core::{GenerationBackend, GenerationError, MemoryStore, Part};
use gardenstate_server::subsystems::enrich::{EnrichmentPipeline, PipelineSettings};
use gardenstate_server::subsystems::media::{ImageSource, MediaError};

pub const SUBJECT_ID: &str = "plant-1";
pub const ENTRY_ID: &str = "entry-1";

/// Replays scripted responses in order and records every request.
/// Once the script runs out it answers with a bare summary.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    calls: Mutex<Vec<Vec<Part>>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call(&self, index: usize) -> Vec<Part> {
        self.calls.lock().unwrap()[index].clone()
    }

    /// Text of the first part of call `index`.
    pub fn prompt(&self, index: usize) -> String {
        match &self.call(index)[0] {
            Part::Text(text) => text.clone(),
            Part::InlineData { .. } => panic!("first part should be text"),
        }
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, parts: Vec<Part>) -> Result<String, GenerationError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(parts);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("SUMMARY: default summary".to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn api_error() -> GenerationError {
    GenerationError::Api {
        code: 500,
        message: "backend exploded".to_string(),
    }
}

/// Serves bytes for known URLs and 404s everything else.
#[derive(Default)]
pub struct MapImageSource {
    pub images: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl ImageSource for MapImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        self.images.get(url).cloned().ok_or_else(|| MediaError::Status {
            status: 404,
            url: url.to_string(),
        })
    }
}

pub fn msg(id: &str, minute: u32, role: Role, content: &str, images: &[&str]) -> Message {
    Message {
        id: id.to_string(),
        uid: if role == Role::User { "user-1" } else { "ai-assistant" }.to_string(),
        timestamp: format!("2024-05-01T10:{:02}:00.000Z", minute),
        role,
        content: content.to_string(),
        images: images.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn entry(id: &str, messages: Vec<Message>) -> Entry {
    Entry {
        id: id.to_string(),
        created_at: "2024-05-01T09:00:00.000Z".to_string(),
        summary: String::new(),
        messages,
        ..Default::default()
    }
}

pub fn subject(entries: Vec<Entry>) -> Subject {
    Subject {
        id: SUBJECT_ID.to_string(),
        nickname: Some("Fernando".to_string()),
        plant_type: Some("Boston fern".to_string()),
        entries,
        ..Default::default()
    }
}

pub async fn seeded_store(subject: Subject) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.put_subject(subject).await;
    store
}

pub fn event_for(message: &Message) -> TriggerEvent {
    TriggerEvent {
        subject_id: SUBJECT_ID.to_string(),
        entry_id: ENTRY_ID.to_string(),
        message_id: message.id.clone(),
        message: message.clone(),
    }
}

pub fn pipeline(
    store: Arc<MemoryStore>,
    backend: Arc<ScriptedBackend>,
    images: Arc<dyn ImageSource>,
) -> EnrichmentPipeline {
    EnrichmentPipeline::new(store, backend, images, PipelineSettings::default())
}
