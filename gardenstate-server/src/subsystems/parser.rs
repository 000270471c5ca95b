//! Response parser: `ENTRY_NAME:` / `SUMMARY:` marker protocol
//!
//! Best-effort extraction from free-form model output. Extra prose around
//! the markers is tolerated; when no marker is found the whole response is
//! the summary. Parsing never fails.

use regex::Regex;

pub const NAME_MARKER: &str = "ENTRY_NAME:";
pub const SUMMARY_MARKER: &str = "SUMMARY:";

/// Name runs lazily up to the next summary marker or end of input.
const NAME_PATTERN: &str = r"(?s)ENTRY_NAME:(.*?)(?:SUMMARY:|\z)";

/// Summary runs from the first summary marker to end of input.
const SUMMARY_PATTERN: &str = r"(?s)SUMMARY:(.*)\z";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedSummary {
    /// Empty when no name was requested or none could be extracted.
    pub name: String,
    pub summary: String,
}

fn capture_trimmed(pattern: &str, text: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    let caps = re.captures(text)?;
    caps.get(1).map(|m| m.as_str().trim().to_string())
}

/// Parse a summary-stage response.
pub fn parse_summary_response(response: &str, name_requested: bool) -> ParsedSummary {
    let has_name = response.contains(NAME_MARKER);
    let has_summary = response.contains(SUMMARY_MARKER);

    if name_requested && has_name && has_summary {
        return ParsedSummary {
            name: capture_trimmed(NAME_PATTERN, response).unwrap_or_default(),
            summary: capture_trimmed(SUMMARY_PATTERN, response).unwrap_or_default(),
        };
    }

    if has_summary {
        return ParsedSummary {
            name: String::new(),
            summary: capture_trimmed(SUMMARY_PATTERN, response).unwrap_or_default(),
        };
    }

    ParsedSummary {
        name: String::new(),
        summary: response.trim().to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
