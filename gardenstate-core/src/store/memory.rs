use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{entry_path, subject_path, DocumentStore, StoreError};
use crate::models::{Entry, EntryUpdate, Message, NewMessage, Subject};

/// In-process store used for tests and the `memory` backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    subjects: RwLock<HashMap<String, Subject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a whole subject document.
    pub async fn put_subject(&self, subject: Subject) {
        self.subjects
            .write()
            .await
            .insert(subject.id.clone(), subject);
    }

    /// Insert or replace one entry under an existing subject.
    pub async fn put_entry(&self, subject_id: &str, entry: Entry) -> Result<(), StoreError> {
        let mut subjects = self.subjects.write().await;
        let subject = subjects
            .get_mut(subject_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "subject",
                path: subject_path(subject_id),
            })?;

        match subject.entry_mut(&entry.id) {
            Some(existing) => *existing = entry,
            None => subject.entries.push(entry),
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_subject(&self, subject_id: &str) -> Result<Option<Subject>, StoreError> {
        Ok(self.subjects.read().await.get(subject_id).cloned())
    }

    async fn get_entry(
        &self,
        subject_id: &str,
        entry_id: &str,
    ) -> Result<Option<Entry>, StoreError> {
        Ok(self
            .subjects
            .read()
            .await
            .get(subject_id)
            .and_then(|s| s.entry(entry_id))
            .cloned())
    }

    async fn get_message(
        &self,
        subject_id: &str,
        entry_id: &str,
        message_id: &str,
    ) -> Result<Option<Message>, StoreError> {
        Ok(self
            .subjects
            .read()
            .await
            .get(subject_id)
            .and_then(|s| s.entry(entry_id))
            .and_then(|e| e.messages.iter().find(|m| m.id == message_id))
            .cloned())
    }

    async fn append_message(
        &self,
        subject_id: &str,
        entry_id: &str,
        message: NewMessage,
    ) -> Result<String, StoreError> {
        let mut subjects = self.subjects.write().await;
        let entry = subjects
            .get_mut(subject_id)
            .and_then(|s| s.entry_mut(entry_id))
            .ok_or_else(|| StoreError::entry_not_found(subject_id, entry_id))?;

        let id = Uuid::new_v4().to_string();
        entry.messages.push(message.into_message(id.clone()));
        Ok(id)
    }

    async fn update_entry(
        &self,
        subject_id: &str,
        entry_id: &str,
        update: EntryUpdate,
    ) -> Result<(), StoreError> {
        let mut subjects = self.subjects.write().await;
        let entry = subjects
            .get_mut(subject_id)
            .and_then(|s| s.entry_mut(entry_id))
            .ok_or_else(|| StoreError::entry_not_found(subject_id, entry_id))?;

        if let Some(summary) = update.summary {
            entry.summary = summary;
        }
        if let Some(name) = update.name {
            entry.name = Some(name);
        }
        tracing::debug!(path = %entry_path(subject_id, entry_id), "Entry updated");
        Ok(())
    }

    async fn health_check(&self) -> Result<String, StoreError> {
        let count = self.subjects.read().await.len();
        Ok(format!("memory store ({} subjects)", count))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
