use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::message::Message;

/// One journal session about a subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub created_at: String,
    #[serde(default)]
    pub entry_date: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub human_summary: Option<String>,
    /// Storage order; callers sort by timestamp.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Entry {
    pub fn has_blank_name(&self) -> bool {
        self.name.as_deref().map_or(true, |n| n.trim().is_empty())
    }

    /// `entryDate`, falling back to `createdAt` when unset or empty.
    pub fn effective_date(&self) -> &str {
        match self.entry_date.as_deref() {
            Some(d) if !d.is_empty() => d,
            _ => &self.created_at,
        }
    }

    pub fn effective_date_utc(&self) -> Option<DateTime<Utc>> {
        parse_date(self.effective_date())
    }
}

/// Field update on an entry document. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub summary: Option<String>,
    pub name: Option<String>,
}

impl EntryUpdate {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.name.is_none()
    }
}

/// Parse either a full ISO-8601 timestamp or a bare `YYYY-MM-DD` date
/// (taken as UTC midnight).
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// `M/D/YYYY`, or the raw string when it does not parse.
pub fn display_date(s: &str) -> String {
    match parse_date(s) {
        Some(t) => t.format("%-m/%-d/%Y").to_string(),
        None => s.to_string(),
    }
}
