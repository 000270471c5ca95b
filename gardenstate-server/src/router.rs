use crate::subsystems::enrich::EnrichmentPipeline;
use crate::subsystems::queue::TriggerQueue;
use gardenstate_core::ipc::{GardenRequest, GardenResponse};
use gardenstate_core::DocumentStore;
use std::sync::Arc;

/// Everything a request handler needs, shared by IPC and HTTP.
#[derive(Clone)]
pub struct RouterState {
    pub pipeline: EnrichmentPipeline,
    pub queue: TriggerQueue,
}

impl RouterState {
    pub fn new(pipeline: EnrichmentPipeline, queue: TriggerQueue) -> Self {
        Self { pipeline, queue }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        self.pipeline.store()
    }
}

pub async fn handle_request(request: GardenRequest, state: &RouterState) -> GardenResponse {
    match request {
        GardenRequest::Ping => GardenResponse::pong(),
        GardenRequest::Health => {
            let store = state.store();
            match store.health_check().await {
                Ok(backend) => GardenResponse::ok(serde_json::json!({
                    "store": store.name(),
                    "backend": backend,
                    "status": "healthy"
                })),
                Err(e) => GardenResponse::err(format!("Store health check failed: {}", e)),
            }
        }
        GardenRequest::Trigger { event } => {
            let message_id = event.message_id.clone();
            match state.queue.enqueue(event) {
                Ok(()) => GardenResponse::ok(serde_json::json!({
                    "queued": true,
                    "message_id": message_id
                })),
                Err(e) => GardenResponse::err(e.to_string()),
            }
        }
        GardenRequest::Enrich { event } => match state.pipeline.run(&event).await {
            Ok(report) => GardenResponse::from_invocation(&report.result),
            Err(e) => GardenResponse::err(format!("Failed to write apology: {}", e)),
        },
    }
}
