use serde::{Deserialize, Serialize};

use super::entry::Entry;

/// A tracked plant and its journal entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    #[serde(default)]
    pub plant_type: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date_acquired: Option<String>,
    #[serde(default)]
    pub age_when_acquired: Option<String>,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl Subject {
    pub fn entry(&self, entry_id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == entry_id)
    }

    pub fn entry_mut(&mut self, entry_id: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == entry_id)
    }
}
