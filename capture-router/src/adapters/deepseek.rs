//! DeepSeek adapter.
//!
//! DeepSeek gives almost nothing stable to hold on to: messages are flat
//! `.ds-message` siblings with obfuscated role classes, and the session
//! title sits in the sidebar next to a `.ds-focus-ring` anchor. Pairing is
//! positional (even index question, odd index answer) but each pair is
//! validated against the role class markers before it is trusted; platforms
//! interleave non-message nodes, and a mis-assigned pair is worse than a
//! skipped one.

use super::{build_record, html_snapshot, passes_length_heuristics, ObserveTarget, PlatformAdapter};
use crate::dom::{DomElement, Page};
use crate::types::ConversationRecord;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

const MIN_ANSWER_LEN: usize = 20;

/// Obfuscated class marker present on user messages.
const USER_MARKER: &str = "d29f3d7d";
/// Obfuscated class marker present on both roles; answers carry it without
/// the user marker.
const MESSAGE_MARKER: &str = "_63c77b1";

lazy_static! {
    static ref UUID_PATTERN: Regex = Regex::new(
        r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$"
    )
    .unwrap();
    static ref HEX_HASH_PATTERN: Regex = Regex::new(r"(?i)^[a-f0-9]{16,}$").unwrap();
    static ref WORD_CHAR_PATTERN: Regex = Regex::new(r"[一-龥a-zA-Z]").unwrap();
}

/// Date-bucket labels the sidebar mixes in with session titles.
const DATE_BUCKET_KEYWORDS: &[&str] = &[
    "昨天",
    "今天",
    "明天",
    "7天内",
    "30天内",
    "7天",
    "30天",
    "一周内",
    "一个月内",
    "一年内",
    "yesterday",
    "today",
    "tomorrow",
    "7 days",
    "30 days",
    "week",
    "month",
    "year",
];

pub struct DeepSeekAdapter;

impl DeepSeekAdapter {
    fn scroll_areas<'a>(&self, page: &'a Page) -> Vec<&'a DomElement> {
        page.body.query_all(&|el| el.has_class("ds-scroll-area"))
    }

    /// The scroll area holding the conversation is the one that actually
    /// contains messages; the other one is the sidebar.
    fn message_area<'a>(&self, areas: &[&'a DomElement]) -> Option<&'a DomElement> {
        areas
            .iter()
            .find(|area| area.query(&|el| el.has_class("ds-message")).is_some())
            .copied()
    }

    /// Title strategy 1: walk the sidebar for text sitting right after a
    /// `ds-focus-ring` anchor, skipping date-bucket labels and anything that
    /// looks like an id rather than a human title.
    fn title_near_focus_ring(&self, sidebar: &DomElement) -> Option<String> {
        let mut parents: Vec<&DomElement> = vec![sidebar];
        parents.extend(sidebar.descendants());

        for parent in parents {
            let kids: Vec<&DomElement> = parent.child_elements().collect();
            for (i, kid) in kids.iter().enumerate() {
                if !kid.has_class("ds-focus-ring") {
                    continue;
                }
                // Check at most five following siblings, stopping at the
                // next anchor.
                for candidate in kids.iter().skip(i + 1).take(5) {
                    if candidate.has_class("ds-focus-ring") {
                        break;
                    }
                    if candidate.class_name.split_whitespace().count() < 2 {
                        continue;
                    }
                    let text = candidate.text_content();
                    if text.chars().count() > 3
                        && !is_date_bucket(&text)
                        && is_valid_title(&text)
                    {
                        return Some(text);
                    }
                }
            }
        }
        None
    }

    fn extract_title(&self, page: &Page, areas: &[&DomElement], message_area: &DomElement) -> Option<String> {
        for area in areas {
            if std::ptr::eq(*area, message_area) {
                continue;
            }
            if let Some(title) = self.title_near_focus_ring(area) {
                return Some(title);
            }
        }
        // Last resort: the document title.
        if !page.title.is_empty() && is_valid_title(&page.title) {
            return Some(page.title.clone());
        }
        None
    }

    /// Answer text/html, preferring the markdown paragraphs inside the
    /// message body over the raw message element (which mixes in toolbars).
    fn answer_content(&self, answer_el: &DomElement) -> (String, Option<String>) {
        let markdown = match answer_el.query(&|el| el.has_class("ds-markdown")) {
            Some(md) => md,
            None => return (answer_el.text_content(), html_snapshot(answer_el)),
        };

        let paragraphs = markdown.query_all(&|el| el.has_class("ds-markdown-paragraph"));
        if paragraphs.is_empty() {
            return (markdown.text_content(), html_snapshot(markdown));
        }

        let text = paragraphs
            .iter()
            .map(|p| p.text_content())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        let html = paragraphs
            .iter()
            .filter_map(|p| html_snapshot(p))
            .collect::<Vec<_>>()
            .join("\n\n");
        let html = if html.is_empty() { None } else { Some(html) };
        (text, html)
    }
}

impl PlatformAdapter for DeepSeekAdapter {
    fn name(&self) -> &'static str {
        "DeepSeek"
    }

    fn detect(&self, page: &Page) -> bool {
        page.hostname().contains("deepseek.com")
    }

    fn extract_conversations(&self, page: &Page) -> Vec<ConversationRecord> {
        let mut records = Vec::new();
        let mut seen_ids = HashSet::new();

        let areas = self.scroll_areas(page);
        // Sidebar plus conversation pane; fewer means the layout has not
        // rendered yet.
        if areas.len() < 2 {
            return records;
        }
        let message_area = match self.message_area(&areas) {
            Some(area) => area,
            None => return records,
        };

        let title = self.extract_title(page, &areas, message_area);

        let messages = message_area.query_all(&|el| el.has_class("ds-message"));
        if messages.is_empty() {
            return records;
        }

        let mut i = 0;
        while i + 1 < messages.len() {
            let question_el = messages[i];
            let answer_el = messages[i + 1];
            i += 2;

            let is_user = question_el.class_contains(USER_MARKER)
                && question_el.has_class("ds-message")
                && question_el.class_contains(MESSAGE_MARKER);
            let is_assistant = answer_el.class_contains(MESSAGE_MARKER)
                && answer_el.has_class("ds-message")
                && !answer_el.class_contains(USER_MARKER);
            if !is_user || !is_assistant {
                continue;
            }

            let question = question_el.text_content();
            let (answer, answer_html) = self.answer_content(answer_el);
            if !passes_length_heuristics(&question, &answer, MIN_ANSWER_LEN) {
                continue;
            }

            let record = build_record(
                self.name(),
                page,
                question,
                answer,
                html_snapshot(question_el),
                answer_html,
                title.clone(),
            );

            if !seen_ids.insert(record.id.clone()) {
                continue;
            }
            records.push(record);
        }

        records
    }

    fn observe_target(&self, page: &Page) -> ObserveTarget {
        let areas = self.scroll_areas(page);
        if self.message_area(&areas).is_some() {
            ObserveTarget::ClassContains("ds-scroll-area".to_string())
        } else {
            ObserveTarget::Document
        }
    }

    fn mutation_hints(&self) -> &'static [&'static str] {
        &["ds-message", "ds-markdown", "ds-markdown-paragraph"]
    }
}

fn is_date_bucket(text: &str) -> bool {
    let lower = text.to_lowercase();
    DATE_BUCKET_KEYWORDS
        .iter()
        .any(|kw| lower.contains(&kw.to_lowercase()))
}

/// A plausible session title: longer than three characters, not a UUID or
/// bare hex hash, and containing at least one alphabetic or CJK character.
fn is_valid_title(text: &str) -> bool {
    if text.chars().count() < 3 {
        return false;
    }
    if UUID_PATTERN.is_match(text) || HEX_HASH_PATTERN.is_match(text) {
        return false;
    }
    WORD_CHAR_PATTERN.is_match(text)
}
