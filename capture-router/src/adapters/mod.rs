//! Platform adapters.
//!
//! Each supported chat platform gets one adapter: a stateless scraper that
//! recognizes the platform from the page hostname and turns the current
//! snapshot tree into normalized conversation records. All adapters follow
//! the same pattern: locate question/answer elements through a prioritized
//! list of selector strategies (so a single upstream markup change degrades
//! rather than breaks extraction), extract trimmed visible text, optionally
//! keep a cleaned HTML fragment, and reject turns that fail minimum-length
//! heuristics as not-yet-rendered content.

pub mod chatgpt;
pub mod deepseek;
pub mod gemini;

use crate::dom::Page;
use crate::identity::record_id;
use crate::sanitize::clean_inner_html;
use crate::types::ConversationRecord;
use serde::{Deserialize, Serialize};

pub use chatgpt::ChatGptAdapter;
pub use deepseek::DeepSeekAdapter;
pub use gemini::GeminiAdapter;

/// Where the bridge should attach its mutation observer. The narrowest
/// container the adapter can name keeps callback volume down on long chat
/// pages; `Document` is the fallback when no platform container exists yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ObserveTarget {
    Document,
    ElementId(String),
    ClassContains(String),
    Tag(String),
}

/// Contract every platform adapter implements.
///
/// `detect` is a pure, cheap read of the page location. `extract_conversations`
/// scans the snapshot synchronously, is idempotent against an unchanged tree,
/// and deduplicates within a single call. A missing container means an empty
/// result, never an error.
pub trait PlatformAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, page: &Page) -> bool;

    fn extract_conversations(&self, page: &Page) -> Vec<ConversationRecord>;

    /// Narrowest mutation-observation scope for the current page.
    fn observe_target(&self, page: &Page) -> ObserveTarget;

    /// Class/id keywords that mark a mutation as possibly conversation
    /// related. Anything else is dropped before further work.
    fn mutation_hints(&self) -> &'static [&'static str];
}

/// Flat list of known adapters; the first whose `detect` matches wins.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Box::new(GeminiAdapter),
                Box::new(ChatGptAdapter),
                Box::new(DeepSeekAdapter),
            ],
        }
    }

    pub fn detect(&self, page: &Page) -> Option<&dyn PlatformAdapter> {
        self.adapters
            .iter()
            .find(|a| a.detect(page))
            .map(Box::as_ref)
    }

    /// Consume the registry, handing out the matching adapter as an owned
    /// box (the capture loop owns its adapter for the page's lifetime).
    pub fn into_adapter(self, page: &Page) -> Option<Box<dyn PlatformAdapter>> {
        self.adapters.into_iter().find(|a| a.detect(page))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble a record from extracted parts. Identity is derived here so every
/// adapter shares the same id scheme.
pub(crate) fn build_record(
    platform: &'static str,
    page: &Page,
    question: String,
    answer: String,
    question_html: Option<String>,
    answer_html: Option<String>,
    title: Option<String>,
) -> ConversationRecord {
    ConversationRecord {
        id: record_id(platform, &page.url, &question, &answer),
        timestamp: chrono::Utc::now().timestamp_millis(),
        platform: platform.to_string(),
        domain: page.hostname(),
        question,
        answer,
        question_html,
        answer_html,
        title,
        page_url: page.url.clone(),
        tags: None,
        category: None,
        notes: None,
        favorite: None,
    }
}

/// Minimum-length heuristic shared by all adapters: a question shorter than
/// six characters or an answer under the platform minimum is treated as a
/// placeholder or still-streaming turn and discarded.
pub(crate) fn passes_length_heuristics(question: &str, answer: &str, min_answer: usize) -> bool {
    question.chars().count() > 5 && answer.chars().count() >= min_answer
}

/// Cleaned HTML for an element, absent when empty.
pub(crate) fn html_snapshot(element: &crate::dom::DomElement) -> Option<String> {
    clean_inner_html(element)
}
