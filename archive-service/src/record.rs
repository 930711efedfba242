//! Record and query types.
//!
//! The wire shape mirrors what the capture side sends: camelCase keys,
//! optional fields off the wire when absent.

use serde::{Deserialize, Serialize};

/// One archived question/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    /// Content-derived identity; unique key, upsert semantics.
    pub id: String,
    /// Capture time, milliseconds since the epoch. Never re-derived on
    /// update.
    pub timestamp: i64,
    pub platform: String,
    pub domain: String,
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub page_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
}

impl ConversationRecord {
    /// Serialized size used for capacity accounting.
    pub fn byte_size(&self) -> u64 {
        serde_json::to_string(self).map(|s| s.len() as u64).unwrap_or(0)
    }
}

/// User-editable fields; the only mutation path after capture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
}

impl RecordUpdate {
    /// Apply onto an existing record, leaving capture fields untouched.
    pub fn apply(self, record: &mut ConversationRecord) {
        if let Some(tags) = self.tags {
            record.tags = Some(tags);
        }
        if let Some(category) = self.category {
            record.category = Some(category);
        }
        if let Some(notes) = self.notes {
            record.notes = Some(notes);
        }
        if let Some(favorite) = self.favorite {
            record.favorite = Some(favorite);
        }
    }
}

/// Sort order for search results. Never both: either relevance or recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Relevance,
    Time,
}

impl Default for SortBy {
    fn default() -> Self {
        SortBy::Relevance
    }
}

/// Search restrictions and presentation options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Platform equality filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Tag membership filter, any-of.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Inclusive lower timestamp bound, milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<i64>,
    /// Inclusive upper timestamp bound, milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite_only: Option<bool>,
    #[serde(default)]
    pub sort_by: SortBy,
}

/// Distinct literal query occurrences for UI emphasis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Highlights {
    pub question: Vec<String>,
    pub answer: Vec<String>,
}

/// One search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub record: ConversationRecord,
    pub score: i64,
    pub highlights: Highlights,
}

/// Archive statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_count: u64,
    pub total_bytes: u64,
    pub size_formatted: String,
    pub platforms: std::collections::BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newest: Option<i64>,
}

#[cfg(test)]
pub(crate) fn sample_record(id: &str, question: &str, answer: &str) -> ConversationRecord {
    ConversationRecord {
        id: id.to_string(),
        timestamp: 1_700_000_000_000,
        platform: "Gemini".to_string(),
        domain: "gemini.google.com".to_string(),
        question: question.to_string(),
        answer: answer.to_string(),
        question_html: None,
        answer_html: None,
        title: None,
        page_url: "https://gemini.google.com/app/1".to_string(),
        tags: None,
        category: None,
        notes: None,
        favorite: None,
    }
}
