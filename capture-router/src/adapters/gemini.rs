//! Gemini adapter.
//!
//! Gemini renders the whole conversation under a `#chat-history` element,
//! one `conversation-container` per turn, with the user query and the model
//! response in dedicated containers. Class names carry stable prefixes even
//! though Angular appends generated suffixes, so matching is by substring.

use super::{build_record, html_snapshot, passes_length_heuristics, ObserveTarget, PlatformAdapter};
use crate::dom::Page;
use crate::types::ConversationRecord;
use std::collections::HashSet;

const MIN_ANSWER_LEN: usize = 20;

pub struct GeminiAdapter;

impl PlatformAdapter for GeminiAdapter {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    fn detect(&self, page: &Page) -> bool {
        page.hostname().contains("gemini.google.com")
    }

    fn extract_conversations(&self, page: &Page) -> Vec<ConversationRecord> {
        let mut records = Vec::new();
        let mut seen_ids = HashSet::new();

        let chat_history = match page.body.element_by_id("chat-history") {
            Some(el) => el,
            None => return records,
        };

        // Session title lives outside the history container.
        let title = page
            .body
            .find_class_containing("conversation-title")
            .map(|el| el.text_content())
            .filter(|t| !t.is_empty());

        for container in chat_history.find_all_class_containing("conversation-container") {
            let query_el = match container.find_class_containing("user-query-container") {
                Some(el) => el,
                None => continue,
            };
            let response_el = match container.find_class_containing("response-container-content") {
                Some(el) => el,
                None => continue,
            };

            let question = query_el.text_content();
            let answer = response_el.text_content();
            if !passes_length_heuristics(&question, &answer, MIN_ANSWER_LEN) {
                continue;
            }

            let record = build_record(
                self.name(),
                page,
                question,
                answer,
                html_snapshot(query_el),
                html_snapshot(response_el),
                title.clone(),
            );

            // The same turn can appear in overlapping containers; the id
            // collapses them.
            if !seen_ids.insert(record.id.clone()) {
                continue;
            }
            records.push(record);
        }

        records
    }

    fn observe_target(&self, page: &Page) -> ObserveTarget {
        if page.body.element_by_id("chat-history").is_some() {
            ObserveTarget::ElementId("chat-history".to_string())
        } else {
            ObserveTarget::Document
        }
    }

    fn mutation_hints(&self) -> &'static [&'static str] {
        &[
            "conversation-container",
            "user-query-container",
            "response-container-content",
            "chat-history",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{DomElement, ReadyState};

    fn turn(question: &str, answer: &str) -> DomElement {
        DomElement::new("div")
            .with_class("conversation-container ng-star-inserted")
            .with_child(
                DomElement::new("div")
                    .with_class("user-query-container")
                    .with_text(question),
            )
            .with_child(
                DomElement::new("div")
                    .with_class("response-container-content")
                    .with_child(DomElement::new("p").with_text(answer)),
            )
    }

    fn gemini_page(turns: Vec<DomElement>) -> Page {
        let mut history = DomElement::new("div").with_id("chat-history");
        for t in turns {
            history = history.with_child(t);
        }
        Page {
            url: "https://gemini.google.com/app/abc123".to_string(),
            title: "Gemini".to_string(),
            ready_state: ReadyState::Complete,
            body: DomElement::new("body")
                .with_child(
                    DomElement::new("div")
                        .with_class("conversation-title gds-title")
                        .with_text("Sorting algorithms"),
                )
                .with_child(history),
        }
    }

    #[test]
    fn extracts_turns_with_title() {
        let page = gemini_page(vec![
            turn("how do I sort a vec", "Use the sort method on a mutable slice."),
            turn("what about stability", "sort is stable; sort_unstable is not, but faster."),
        ]);

        let records = GeminiAdapter.extract_conversations(&page);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].platform, "Gemini");
        assert_eq!(records[0].domain, "gemini.google.com");
        assert_eq!(records[0].question, "how do I sort a vec");
        assert_eq!(records[0].title.as_deref(), Some("Sorting algorithms"));
        assert!(records[0].answer_html.is_some());
    }

    #[test]
    fn missing_history_container_yields_empty() {
        let page = Page {
            url: "https://gemini.google.com/app/abc123".to_string(),
            title: String::new(),
            ready_state: ReadyState::Complete,
            body: DomElement::new("body"),
        };
        assert!(GeminiAdapter.extract_conversations(&page).is_empty());
    }

    #[test]
    fn rejects_short_turns() {
        let page = gemini_page(vec![
            turn("hi", "Use the sort method on a mutable slice."),
            turn("how do I sort a vec", "short"),
        ]);
        assert!(GeminiAdapter.extract_conversations(&page).is_empty());
    }

    #[test]
    fn extraction_is_idempotent() {
        let page = gemini_page(vec![turn(
            "how do I sort a vec",
            "Use the sort method on a mutable slice.",
        )]);
        let first: Vec<String> = GeminiAdapter
            .extract_conversations(&page)
            .into_iter()
            .map(|r| r.id)
            .collect();
        let second: Vec<String> = GeminiAdapter
            .extract_conversations(&page)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn identical_turns_collapse_to_one_record() {
        let page = gemini_page(vec![
            turn("how do I sort a vec", "Use the sort method on a mutable slice."),
            turn("how do I sort a vec", "Use the sort method on a mutable slice."),
        ]);
        assert_eq!(GeminiAdapter.extract_conversations(&page).len(), 1);
    }

    #[test]
    fn observe_target_prefers_history_container() {
        let page = gemini_page(vec![]);
        assert_eq!(
            GeminiAdapter.observe_target(&page),
            ObserveTarget::ElementId("chat-history".to_string())
        );
    }
}
