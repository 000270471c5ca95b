use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author id reserved for assistant turns.
pub const ASSISTANT_UID: &str = "ai-assistant";

/// Content substituted when a user sends images without any text.
pub const IMAGE_ONLY_PLACEHOLDER: &str = "[Image]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// Any role this service does not enrich.
    #[serde(other)]
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One turn of an entry's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub uid: String,
    /// ISO-8601; ordering key, compared as a date.
    pub timestamp: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Message {
    /// Parsed timestamp, `None` when the stored string is not a valid date.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// A message about to be appended; the store assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub uid: String,
    pub timestamp: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl NewMessage {
    /// An assistant turn stamped with the current time.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            uid: ASSISTANT_UID.to_string(),
            timestamp: now_iso8601(),
            role: Role::Assistant,
            content: content.into(),
            images: Vec::new(),
        }
    }

    /// A user turn stamped with the current time. Blank text with images
    /// attached is replaced by [`IMAGE_ONLY_PLACEHOLDER`].
    pub fn user(uid: impl Into<String>, content: &str, images: Vec<String>) -> Self {
        let trimmed = content.trim();
        let content = if trimmed.is_empty() && !images.is_empty() {
            IMAGE_ONLY_PLACEHOLDER.to_string()
        } else {
            trimmed.to_string()
        };

        Self {
            uid: uid.into(),
            timestamp: now_iso8601(),
            role: Role::User,
            content,
            images,
        }
    }

    pub fn into_message(self, id: String) -> Message {
        Message {
            id,
            uid: self.uid,
            timestamp: self.timestamp,
            role: self.role,
            content: self.content,
            images: self.images,
        }
    }
}

/// Current UTC time in the millisecond ISO-8601 form clients write.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
