//! Conversation archive service.
//!
//! Stores captured question/answer records (SQLite, upsert-by-id), serves
//! the search engine over them, renders exports, and owns the tracked
//! domain allowlist. The capture side talks to it over a Unix socket with
//! one JSON request per line.

pub mod domains;
pub mod export;
pub mod protocol;
pub mod record;
pub mod search;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use domains::{DomainRegistry, TrackedDomain};
pub use export::{render, ExportFilters, ExportFormat};
pub use protocol::{Request, Response};
pub use record::{
    ConversationRecord, Highlights, RecordUpdate, SearchOptions, SearchResult, SortBy, Statistics,
};
pub use search::SearchEngine;
pub use server::{handle_request, ArchiveServer, ServerConfig, ServiceState};
pub use store::{
    format_bytes, CapacityCategory, CapacityPolicy, CapacityReport, CapacityWarning, RecordStore,
    StoreError,
};
