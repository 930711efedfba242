//! ChatGPT adapter.
//!
//! ChatGPT's markup shifts often, so every lookup runs through a prioritized
//! selector chain: the stable `data-testid`/`data-message-author-role`
//! attributes first, generic class fragments as fallbacks. The first
//! strategy that yields matches wins; later ones are never mixed in.

use super::{build_record, html_snapshot, passes_length_heuristics, ObserveTarget, PlatformAdapter};
use crate::dom::{DomElement, Page};
use crate::types::ConversationRecord;
use std::collections::HashSet;

const MIN_ANSWER_LEN: usize = 11;

pub struct ChatGptAdapter;

impl ChatGptAdapter {
    /// Turn containers, first matching strategy wins.
    fn turn_containers<'a>(&self, page: &'a Page) -> Vec<&'a DomElement> {
        let by_testid = page.body.query_all(&|el| {
            el.attr("data-testid")
                .map(|v| v.contains("conversation-turn"))
                .unwrap_or(false)
        });
        if !by_testid.is_empty() {
            return by_testid;
        }

        let by_group = page
            .body
            .query_all(&|el| el.tag == "div" && el.class_contains("group"));
        if !by_group.is_empty() {
            return by_group;
        }

        page.body
            .query_all(&|el| el.tag == "div" && el.class_contains("message"))
    }

    fn find_role<'a>(&self, group: &'a DomElement, role: &str) -> Option<&'a DomElement> {
        if let Some(el) = group.query(&|el| el.attr("data-message-author-role") == Some(role)) {
            return Some(el);
        }
        let class_fallbacks: &[&str] = match role {
            "user" => &["user"],
            _ => &["assistant", "model"],
        };
        for fragment in class_fallbacks {
            if let Some(el) = group.query(&|el| el.tag == "div" && el.class_contains(fragment)) {
                return Some(el);
            }
        }
        None
    }
}

impl PlatformAdapter for ChatGptAdapter {
    fn name(&self) -> &'static str {
        "ChatGPT"
    }

    fn detect(&self, page: &Page) -> bool {
        page.hostname().contains("chat.openai.com")
    }

    fn extract_conversations(&self, page: &Page) -> Vec<ConversationRecord> {
        let mut records = Vec::new();
        let mut seen_ids = HashSet::new();

        for group in self.turn_containers(page) {
            let question_el = match self.find_role(group, "user") {
                Some(el) => el,
                None => continue,
            };
            let answer_el = match self.find_role(group, "assistant") {
                Some(el) => el,
                None => continue,
            };

            let question = question_el.text_content();
            let answer = answer_el.text_content();
            if !passes_length_heuristics(&question, &answer, MIN_ANSWER_LEN) {
                continue;
            }

            let record = build_record(
                self.name(),
                page,
                question,
                answer,
                html_snapshot(question_el),
                html_snapshot(answer_el),
                None,
            );

            if !seen_ids.insert(record.id.clone()) {
                continue;
            }
            records.push(record);
        }

        records
    }

    fn observe_target(&self, page: &Page) -> ObserveTarget {
        let has_main = page
            .body
            .query(&|el| el.tag == "main" || el.attr("role") == Some("main"))
            .is_some();
        if has_main {
            ObserveTarget::Tag("main".to_string())
        } else {
            ObserveTarget::Document
        }
    }

    fn mutation_hints(&self) -> &'static [&'static str] {
        &["message", "conversation"]
    }
}
