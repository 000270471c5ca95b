//! Enrichment pipeline: one invocation per newly created user message
//!
//! Flow:
//! 1. Load the entry (missing entry or no messages → skipped, no writes)
//! 2. Assemble context from the entry, its sibling entries and the subject
//! 3. Resolve images from the recent window (per-image failures dropped)
//! 4. Reply call → append the assistant reply
//! 5. Summary call over the full history → parse markers → update entry
//!
//! Any failure from step 1 onward appends a fixed apology message. A reply
//! already written is never removed.
//!
//! Dependencies are injected so tests can substitute fakes.

use std::sync::Arc;
use thiserror::Error;

use gardenstate_core::models::{InvocationResult, Role, TriggerEvent};
use gardenstate_core::{DocumentStore, GardenConfig, GenerationBackend, GenerationError, StoreError};

use super::context::{build_context, order_conversation, recent_turns};
use super::media::{collect_image_refs, resolve_images, ImageSource};
use super::parser::parse_summary_response;
use super::{prompts, writer};

/// Progress of a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ContextBuilt,
    Replied,
    Summarized,
    /// Failed before a reply was saved.
    Failed,
    /// Failed after the reply was saved; the reply is kept.
    FailedAfterReply,
}

impl PipelineState {
    fn failed_from(self) -> Self {
        match self {
            PipelineState::Replied => PipelineState::FailedAfterReply,
            _ => PipelineState::Failed,
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("store error in state {state:?}: {source}")]
    Store {
        state: PipelineState,
        #[source]
        source: StoreError,
    },

    #[error("generation failed in state {state:?}: {source}")]
    Generation {
        state: PipelineState,
        #[source]
        source: GenerationError,
    },
}

impl PipelineError {
    pub fn state(&self) -> PipelineState {
        match self {
            PipelineError::Store { state, .. } | PipelineError::Generation { state, .. } => *state,
        }
    }
}

/// Tunables read from `[pipeline]` and `[media]`.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub history_window: usize,
    pub context_entries: usize,
    pub image_mime_type: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            history_window: 10,
            context_entries: 5,
            image_mime_type: "image/jpeg".to_string(),
        }
    }
}

impl From<&GardenConfig> for PipelineSettings {
    fn from(config: &GardenConfig) -> Self {
        Self {
            history_window: config.pipeline.history_window,
            context_entries: config.pipeline.context_entries,
            image_mime_type: config.media.mime_type.clone(),
        }
    }
}

/// What a run did, for callers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub state: PipelineState,
    pub result: InvocationResult,
}

enum Completion {
    Done,
    Skipped(&'static str),
}

#[derive(Clone)]
pub struct EnrichmentPipeline {
    store: Arc<dyn DocumentStore>,
    backend: Arc<dyn GenerationBackend>,
    images: Arc<dyn ImageSource>,
    settings: PipelineSettings,
}

impl EnrichmentPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        backend: Arc<dyn GenerationBackend>,
        images: Arc<dyn ImageSource>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            backend,
            images,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Run one invocation.
    ///
    /// Returns `Err` only when writing the apology itself failed; every
    /// other failure is reported through `InvocationResult::Error`.
    pub async fn run(&self, event: &TriggerEvent) -> Result<RunReport, StoreError> {
        if event.message.role != Role::User {
            tracing::debug!(
                message_id = %event.message_id,
                role = event.message.role.as_str(),
                "Ignoring non-user message"
            );
            return Ok(RunReport {
                state: PipelineState::Idle,
                result: InvocationResult::skipped("message role is not user"),
            });
        }

        tracing::info!(
            subject_id = %event.subject_id,
            entry_id = %event.entry_id,
            message_id = %event.message_id,
            "Processing user message"
        );

        let mut state = PipelineState::Idle;
        match self.execute(event, &mut state).await {
            Ok(Completion::Done) => Ok(RunReport {
                state,
                result: InvocationResult::Success,
            }),
            Ok(Completion::Skipped(reason)) => {
                tracing::info!(entry_id = %event.entry_id, reason, "Nothing to enrich");
                Ok(RunReport {
                    state,
                    result: InvocationResult::skipped(reason),
                })
            }
            Err(e) => {
                tracing::error!(
                    subject_id = %event.subject_id,
                    entry_id = %event.entry_id,
                    state = ?e.state(),
                    error = %e,
                    "Enrichment failed, writing apology"
                );
                writer::write_apology(self.store.as_ref(), &event.subject_id, &event.entry_id)
                    .await?;
                Ok(RunReport {
                    state: e.state().failed_from(),
                    result: InvocationResult::Error {
                        error: e.to_string(),
                    },
                })
            }
        }
    }

    async fn execute(
        &self,
        event: &TriggerEvent,
        state: &mut PipelineState,
    ) -> Result<Completion, PipelineError> {
        let store = self.store.as_ref();
        let (subject_id, entry_id) = (event.subject_id.as_str(), event.entry_id.as_str());

        let entry = match store
            .get_entry(subject_id, entry_id)
            .await
            .map_err(|source| PipelineError::Store { state: *state, source })?
        {
            Some(entry) => entry,
            None => return Ok(Completion::Skipped("entry not found")),
        };
        if entry.messages.is_empty() {
            return Ok(Completion::Skipped("entry has no messages"));
        }

        let subject = store
            .get_subject(subject_id)
            .await
            .map_err(|source| PipelineError::Store { state: *state, source })?;
        if subject.is_none() {
            tracing::warn!(subject_id, "Subject not found, continuing with partial context");
        }

        let turns = order_conversation(&entry.messages);
        let context = build_context(&entry, subject.as_ref(), self.settings.context_entries);
        let name_requested = entry.has_blank_name();
        *state = PipelineState::ContextBuilt;

        let recent = recent_turns(&turns, self.settings.history_window);
        let refs = collect_image_refs(recent);
        let images =
            resolve_images(self.images.as_ref(), &refs, &self.settings.image_mime_type).await;
        tracing::debug!(requested = refs.len(), resolved = images.len(), "Images resolved");

        let reply = self
            .backend
            .generate(prompts::reply_request(&context, recent, images))
            .await
            .map_err(|source| PipelineError::Generation { state: *state, source })?;

        writer::append_reply(store, subject_id, entry_id, &reply)
            .await
            .map_err(|source| PipelineError::Store { state: *state, source })?;
        *state = PipelineState::Replied;

        let summary_text = self
            .backend
            .generate(prompts::summary_request(&turns, name_requested))
            .await
            .map_err(|source| PipelineError::Generation { state: *state, source })?;

        let parsed = parse_summary_response(&summary_text, name_requested);
        writer::apply_summary(store, subject_id, entry_id, &parsed, name_requested)
            .await
            .map_err(|source| PipelineError::Store { state: *state, source })?;
        *state = PipelineState::Summarized;

        Ok(Completion::Done)
    }
}
