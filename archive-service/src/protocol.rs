//! Wire protocol: one JSON object per line, tagged by `type`.

use crate::domains::TrackedDomain;
use crate::export::{ExportFilters, ExportFormat};
use crate::record::{ConversationRecord, RecordUpdate, SearchOptions, SearchResult, Statistics};
use crate::store::{CapacityReport, CapacityWarning};
use serde::{Deserialize, Serialize};

/// Requests the archive accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    /// Submit a freshly captured record.
    SubmitRecord { record: ConversationRecord },
    /// Batched existence check against candidate ids.
    CheckIds { ids: Vec<String> },
    Search {
        query: String,
        #[serde(default)]
        options: SearchOptions,
    },
    GetRecord { id: String },
    GetAll,
    UpdateRecord { id: String, updates: RecordUpdate },
    DeleteRecord { id: String },
    IsDomainEnabled { domain: String },
    GetDomains,
    GetPlatforms,
    GetTags,
    GetStatistics,
    Export {
        format: ExportFormat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ids: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filters: Option<ExportFilters>,
    },
}

/// Responses, one per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    #[serde(rename_all = "camelCase")]
    Submitted {
        accepted: bool,
        is_duplicate: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capacity_warning: Option<CapacityWarning>,
    },
    ExistingIds { ids: Vec<String> },
    Results { results: Vec<SearchResult> },
    #[serde(rename_all = "camelCase")]
    Record {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        record: Option<ConversationRecord>,
    },
    Records { records: Vec<ConversationRecord> },
    Ack,
    DomainEnabled { enabled: bool },
    Domains { domains: Vec<TrackedDomain> },
    Platforms { platforms: Vec<String> },
    Tags { tags: Vec<String> },
    #[serde(rename_all = "camelCase")]
    Statistics {
        statistics: Statistics,
        capacity: CapacityReport,
    },
    Document { content: String },
    Error { message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}
