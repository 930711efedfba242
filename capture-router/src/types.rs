//! Core types used throughout the capture router.
//!
//! This module defines the captured conversation record, the outcome types
//! returned by the archive channel, and the events that drive the capture
//! loop.

use serde::{Deserialize, Serialize};

/// One captured question/answer exchange.
///
/// The `id` is content-derived (see [`crate::identity`]) so that re-scanning
/// an unchanged page always produces the same record. The optional user
/// metadata fields (`tags`, `category`, `notes`, `favorite`) are never
/// written by the capture pipeline; they exist so records round-trip the
/// archive wire format unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    /// Stable content-derived identity. Unique key in the archive.
    pub id: String,
    /// Capture time, milliseconds since the epoch. Set once at first
    /// capture, never re-derived.
    pub timestamp: i64,
    /// Adapter name that produced the record, e.g. "Gemini".
    pub platform: String,
    /// Hostname of the page at capture time.
    pub domain: String,
    /// Plain-text question, trimmed, non-empty.
    pub question: String,
    /// Plain-text answer, trimmed, non-empty.
    pub answer: String,
    /// Cleaned HTML snapshot of the question, if extraction yielded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_html: Option<String>,
    /// Cleaned HTML snapshot of the answer, if extraction yielded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_html: Option<String>,
    /// Best-effort conversation title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// URL the record was captured from.
    pub page_url: String,
    /// User-assigned tags. Absent until the user sets them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// User-assigned category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// User notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// User favorite flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
}

/// Severity of a storage capacity warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityCategory {
    /// 80-95% of the configured maximum.
    Warning,
    /// 95-100% of the configured maximum. Saves still allowed.
    Severe,
    /// At or over the maximum. Saves refused.
    Full,
}

/// Capacity warning attached to a submission response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityWarning {
    pub category: CapacityCategory,
    pub message: String,
}

/// Result of submitting a record to the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    /// Whether the archive accepted the submission. A duplicate counts as
    /// accepted; a capacity refusal does not.
    pub accepted: bool,
    /// The record already existed under the same id. Expected and frequent;
    /// the capture loop uses it to populate its known-set.
    pub is_duplicate: bool,
    /// Present when storage usage crossed a warning band.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_warning: Option<CapacityWarning>,
}

/// Errors surfaced by an archive channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The runtime channel to the archive is gone. Terminal for the capture
    /// loop; the page must reload to resume capture.
    #[error("archive channel severed: {0}")]
    Severed(String),

    /// The archive answered with something unintelligible. Non-fatal.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The archive reported a handling failure. Non-fatal.
    #[error("archive error: {0}")]
    Remote(String),
}

/// Events delivered to the capture loop by the page bridge.
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// The document finished loading.
    Loaded,
    /// A batch of DOM mutation records.
    Mutations(Vec<crate::dom::MutationRecord>),
    /// Tab visibility changed.
    Visibility { hidden: bool },
}

/// Capture loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    ScanningInitial,
    Observing,
    ScanningIncremental,
    /// Terminal. Reached on channel loss; never left.
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_wire_format_is_camel_case() {
        let record = ConversationRecord {
            id: "Gemini-abc-def".to_string(),
            timestamp: 1_700_000_000_000,
            platform: "Gemini".to_string(),
            domain: "gemini.google.com".to_string(),
            question: "what is rust".to_string(),
            answer: "a systems programming language".to_string(),
            question_html: None,
            answer_html: None,
            title: Some("Rust intro".to_string()),
            page_url: "https://gemini.google.com/app/1".to_string(),
            tags: None,
            category: None,
            notes: None,
            favorite: None,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"pageUrl\""));
        assert!(json.contains("\"title\""));
        // Absent optional fields stay off the wire entirely.
        assert!(!json.contains("questionHtml"));
        assert!(!json.contains("tags"));

        let back: ConversationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn capacity_category_serializes_lowercase() {
        let json = serde_json::to_string(&CapacityCategory::Severe).unwrap();
        assert_eq!(json, "\"severe\"");
    }
}
