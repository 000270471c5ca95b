//! Persistence writer: assistant turns and entry field updates
//!
//! All writes are appends or unconditional overwrites. Concurrent
//! invocations for the same entry can interleave; the last `summary`/`name`
//! write wins.

use gardenstate_core::models::{EntryUpdate, NewMessage};
use gardenstate_core::{DocumentStore, StoreError};

use super::parser::ParsedSummary;

/// Shown in the conversation whenever an invocation fails.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, I encountered an error processing your message. Please try again.";

/// Append the generated reply as an assistant turn.
pub async fn append_reply(
    store: &dyn DocumentStore,
    subject_id: &str,
    entry_id: &str,
    reply: &str,
) -> Result<String, StoreError> {
    let id = store
        .append_message(subject_id, entry_id, NewMessage::assistant(reply))
        .await?;
    tracing::info!(subject_id, entry_id, message_id = %id, "Assistant reply saved");
    Ok(id)
}

/// Summary is always written; name only when it was requested and the
/// parser found one.
pub fn entry_update(parsed: &ParsedSummary, name_requested: bool) -> EntryUpdate {
    EntryUpdate {
        summary: Some(parsed.summary.clone()),
        name: (name_requested && !parsed.name.is_empty()).then(|| parsed.name.clone()),
    }
}

pub async fn apply_summary(
    store: &dyn DocumentStore,
    subject_id: &str,
    entry_id: &str,
    parsed: &ParsedSummary,
    name_requested: bool,
) -> Result<(), StoreError> {
    let update = entry_update(parsed, name_requested);
    let name_updated = update.name.is_some();
    store.update_entry(subject_id, entry_id, update).await?;
    tracing::info!(subject_id, entry_id, name_updated, "Entry summary updated");
    Ok(())
}

/// Append the fixed apology. Failure here is not recovered.
pub async fn write_apology(
    store: &dyn DocumentStore,
    subject_id: &str,
    entry_id: &str,
) -> Result<String, StoreError> {
    store
        .append_message(subject_id, entry_id, NewMessage::assistant(APOLOGY_MESSAGE))
        .await
}
