use serde::{Deserialize, Serialize};

use crate::models::{InvocationResult, TriggerEvent};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GardenRequest {
    Ping,
    Health,
    /// Queue an enrichment run and return immediately.
    Trigger { event: TriggerEvent },
    /// Run the enrichment pipeline inline and return its result.
    Enrich { event: TriggerEvent },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GardenResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl GardenResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    /// Pipeline results map onto the envelope: `error` outcomes become error
    /// responses, everything else is `ok` with the result as data.
    pub fn from_invocation(result: &InvocationResult) -> Self {
        match result {
            InvocationResult::Error { error } => Self::err(error.clone()),
            other => Self::ok(serde_json::to_value(other).unwrap_or_default()),
        }
    }
}
