//! Capture Router - conversation capture for AI chat pages
//!
//! This crate turns live chat pages into normalized conversation records:
//!
//! - **Adapters**: per-platform scrapers (Gemini, ChatGPT, DeepSeek) over a
//!   snapshot tree of the rendered page
//! - **Identity**: deterministic content-derived record ids, so re-scans of
//!   an unchanged page never duplicate work
//! - **Capture loop**: a mutation-driven state machine with throttle and
//!   debounce gating, so streaming output is scanned once it settles
//!
//! # Architecture
//!
//! A browser-side shim streams page snapshots and mutation events over a
//! Unix socket, one connection per page context. Each connection gets its
//! own capture loop, which reconciles against the archive service once at
//! startup and then submits genuinely new records as they appear.

pub mod adapters;
pub mod bridge;
pub mod capture;
pub mod channel;
pub mod config;
pub mod dom;
pub mod identity;
pub mod sanitize;
pub mod types;

// Re-export commonly used types
pub use adapters::{AdapterRegistry, ObserveTarget, PlatformAdapter};
pub use bridge::{handle_page_connection, BridgeMessage};
pub use capture::CaptureLoop;
pub use channel::{ArchiveChannel, SocketArchiveChannel};
pub use config::{CaptureConfig, TimingConfig};
pub use dom::{DomElement, DomNode, MutationRecord, Page, ReadyState, SharedDom};
pub use identity::{record_id, simple_hash};
pub use sanitize::clean_inner_html;
pub use types::{
    CapacityCategory, CapacityWarning, ChannelError, ConversationRecord, LoopState, PageEvent,
    SubmitOutcome,
};
