//! Postgres change listener
//!
//! The `messages` insert trigger publishes `{subjectId, entryId, messageId}`
//! on [`USER_MESSAGE_CHANNEL`] for every user message. Each notification is
//! resolved to the stored message and pushed onto the trigger queue. A full
//! queue holds the listener back rather than dropping the notification.

use serde::Deserialize;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use gardenstate_core::db::USER_MESSAGE_CHANNEL;
use gardenstate_core::models::TriggerEvent;
use gardenstate_core::{DocumentStore, StoreError};

use super::queue::{QueueError, TriggerQueue};

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Invalid notification payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserMessageNotification {
    pub subject_id: String,
    pub entry_id: String,
    pub message_id: String,
}

/// Resolve a notification payload into a trigger event. `None` when the
/// message has disappeared since the notification was sent.
pub async fn event_from_payload(
    store: &dyn DocumentStore,
    payload: &str,
) -> Result<Option<TriggerEvent>, ListenerError> {
    let note: UserMessageNotification = serde_json::from_str(payload)?;
    let message = store
        .get_message(&note.subject_id, &note.entry_id, &note.message_id)
        .await?;

    Ok(message.map(|message| TriggerEvent {
        subject_id: note.subject_id,
        entry_id: note.entry_id,
        message_id: note.message_id,
        message,
    }))
}

async fn dispatch(
    store: &dyn DocumentStore,
    queue: &TriggerQueue,
    payload: &str,
) -> Result<(), ListenerError> {
    match event_from_payload(store, payload).await? {
        Some(event) => queue.enqueue_wait(event).await?,
        None => tracing::warn!(payload, "Notified message not found, skipping"),
    }
    Ok(())
}

/// Listen until shutdown. Per-notification failures are logged and do not
/// stop the loop; losing the listener connection does.
pub async fn run_notify_listener(
    pool: PgPool,
    store: Arc<dyn DocumentStore>,
    queue: TriggerQueue,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), sqlx::Error> {
    let mut listener = PgListener::connect_with(&pool).await?;
    listener.listen(USER_MESSAGE_CHANNEL).await?;
    tracing::info!(channel = USER_MESSAGE_CHANNEL, "Listening for new user messages");

    loop {
        tokio::select! {
            res = listener.recv() => {
                let notification = res?;
                if let Err(e) = dispatch(store.as_ref(), &queue, notification.payload()).await {
                    tracing::error!(
                        payload = notification.payload(),
                        error = %e,
                        "Failed to enqueue notified message"
                    );
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Notify listener shutting down...");
                break;
            }
        }
    }

    Ok(())
}
