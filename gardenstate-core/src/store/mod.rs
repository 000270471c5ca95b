//! Document store abstraction
//!
//! The pipeline treats persistence as a key-path document store:
//! `subject/{id}`, `subject/{id}/entries/{id}` and the `messages` collection
//! under an entry. Writes are either appends or unconditional field
//! overwrites, so re-running an invocation from scratch is safe.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Entry, EntryUpdate, Message, NewMessage, Subject};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{kind} not found: {path}")]
    NotFound { kind: &'static str, path: String },

    #[error("Corrupt record at {path}: {message}")]
    Corrupt { path: String, message: String },
}

impl StoreError {
    pub fn entry_not_found(subject_id: &str, entry_id: &str) -> Self {
        StoreError::NotFound {
            kind: "entry",
            path: entry_path(subject_id, entry_id),
        }
    }
}

pub fn subject_path(subject_id: &str) -> String {
    format!("subject/{}", subject_id)
}

pub fn entry_path(subject_id: &str, entry_id: &str) -> String {
    format!("subject/{}/entries/{}", subject_id, entry_id)
}

pub fn message_path(subject_id: &str, entry_id: &str, message_id: &str) -> String {
    format!("subject/{}/entries/{}/messages/{}", subject_id, entry_id, message_id)
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Subject metadata plus its entries. Entry `messages` may be left empty
    /// by backends that load them separately.
    async fn get_subject(&self, subject_id: &str) -> Result<Option<Subject>, StoreError>;

    /// One entry with all of its messages in storage (insertion) order.
    async fn get_entry(&self, subject_id: &str, entry_id: &str)
        -> Result<Option<Entry>, StoreError>;

    async fn get_message(
        &self,
        subject_id: &str,
        entry_id: &str,
        message_id: &str,
    ) -> Result<Option<Message>, StoreError>;

    /// Append under `.../entries/{entry_id}/messages` and return the new id.
    async fn append_message(
        &self,
        subject_id: &str,
        entry_id: &str,
        message: NewMessage,
    ) -> Result<String, StoreError>;

    /// Unconditional overwrite of the fields set in `update`.
    async fn update_entry(
        &self,
        subject_id: &str,
        entry_id: &str,
        update: EntryUpdate,
    ) -> Result<(), StoreError>;

    /// Cheap liveness probe, returns a human-readable backend description.
    async fn health_check(&self) -> Result<String, StoreError>;

    /// Backend name for logging.
    fn name(&self) -> &str;

    /// True when the backend itself announces new user messages (e.g. via a
    /// database trigger), so writers must not enqueue them a second time.
    fn emits_change_events(&self) -> bool {
        false
    }
}
