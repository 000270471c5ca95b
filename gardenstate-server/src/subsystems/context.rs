//! Context assembler: conversation ordering and the context preamble
//!
//! Builds the textual context injected into the reply request:
//! - the current entry's user notes
//! - up to N other entries of the same subject, most recent first
//! - subject (plant) metadata
//!
//! Never fails: missing data yields a shorter or empty context.

use std::cmp::Reverse;

use gardenstate_core::models::{display_date, Entry, Message, Role, Subject};

/// Who spoke a turn, as rendered in transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Human,
    Assistant,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Human => "User",
            Speaker::Assistant => "Assistant",
        }
    }
}

/// One message as the prompts see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
    pub images: Vec<String>,
}

/// Sort by timestamp ascending and map to turns.
///
/// The sort is stable, so equal timestamps keep storage order. Timestamps
/// that do not parse sort before every valid one.
pub fn order_conversation(messages: &[Message]) -> Vec<ConversationTurn> {
    let mut ordered: Vec<&Message> = messages.iter().collect();
    ordered.sort_by_key(|m| m.timestamp_utc());

    ordered
        .into_iter()
        .map(|m| ConversationTurn {
            speaker: if m.role == Role::User {
                Speaker::Human
            } else {
                Speaker::Assistant
            },
            text: m.content.clone(),
            images: m.images.clone(),
        })
        .collect()
}

/// The last `window` turns.
pub fn recent_turns(turns: &[ConversationTurn], window: usize) -> &[ConversationTurn] {
    &turns[turns.len().saturating_sub(window)..]
}

/// The value as written, when it has any non-whitespace content.
fn present(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

/// Render one sibling entry, or `None` when it has neither notes nor summary.
fn render_sibling(entry: &Entry) -> Option<String> {
    let notes = present(entry.human_summary.as_ref());
    let summary = present(Some(&entry.summary));

    if notes.is_none() && summary.is_none() {
        return None;
    }

    let mut block = format!("Entry from {}:\n", display_date(entry.effective_date()));
    if let Some(notes) = notes {
        block.push_str(&format!("User notes: {}\n", notes));
    }
    if let Some(summary) = summary {
        block.push_str(&format!("AI summary: {}\n", summary));
    }
    Some(block)
}

/// Sibling entry blocks: sort by date descending, take `max_entries`, then
/// drop entries with nothing to say. The cap is applied before the filter,
/// so fewer than `max_entries` blocks may come back even when older
/// non-empty entries exist.
pub fn sibling_context(subject: &Subject, entry_id: &str, max_entries: usize) -> Vec<String> {
    let mut others: Vec<&Entry> = subject.entries.iter().filter(|e| e.id != entry_id).collect();
    // Unparseable dates sort last (treated as oldest).
    others.sort_by_key(|e| Reverse(e.effective_date_utc()));

    others
        .into_iter()
        .take(max_entries)
        .filter_map(render_sibling)
        .collect()
}

fn subject_block(subject: &Subject) -> Option<String> {
    let nickname = present(subject.nickname.as_ref());
    let plant_type = present(subject.plant_type.as_ref());
    let description = present(subject.description.as_ref());

    // Acquisition fields only appear alongside one of the identifying fields.
    if nickname.is_none() && plant_type.is_none() && description.is_none() {
        return None;
    }

    let mut block = String::from("\nPlant Information:\n");
    if let Some(v) = nickname {
        block.push_str(&format!("Name: {}\n", v));
    }
    if let Some(v) = plant_type {
        block.push_str(&format!("Type: {}\n", v));
    }
    if let Some(v) = description {
        block.push_str(&format!("Description: {}\n", v));
    }
    if let Some(v) = present(subject.date_acquired.as_ref()) {
        block.push_str(&format!("Acquired: {}\n", display_date(v.trim())));
    }
    if let Some(v) = present(subject.age_when_acquired.as_ref()) {
        block.push_str(&format!("Age when acquired: {}\n", v));
    }
    Some(block)
}

/// Assemble the context blob for `entry`.
///
/// `subject` may be `None` when the subject document could not be read; the
/// entry's own notes are still included.
pub fn build_context(entry: &Entry, subject: Option<&Subject>, max_entries: usize) -> String {
    let mut context = String::new();

    if let Some(notes) = present(entry.human_summary.as_ref()) {
        context.push_str(&format!("\nCurrent entry notes from user: {}\n", notes));
    }

    if let Some(subject) = subject {
        let siblings = sibling_context(subject, &entry.id, max_entries);
        if !siblings.is_empty() {
            context.push_str(&format!(
                "\nPrevious entries for this plant:\n{}",
                siblings.join("\n---\n")
            ));
        }

        if let Some(block) = subject_block(subject) {
            context.push_str(&block);
        }
    }

    context
}

// ============================================================================
// TESTS
// ============================================================================
