//! Export renderers.
//!
//! Turn a set of records into a JSON, Markdown, HTML or CSV document. The
//! HTML snapshots captured from chat pages are sanitized again here, at
//! render time: anything reaching an exported document has scripts, styles
//! and inline handlers stripped regardless of what the capture side kept.
//! Markdown conversion is the simplified tag mapping the use case needs,
//! not a general HTML-to-Markdown converter.

use crate::record::ConversationRecord;
use chrono::{TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Markdown,
    Html,
    Csv,
}

/// Filters applied when exporting the whole archive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite_only: Option<bool>,
}

impl ExportFilters {
    pub fn matches(&self, record: &ConversationRecord) -> bool {
        if let Some(platform) = &self.platform {
            if &record.platform != platform {
                return false;
            }
        }
        if let Some(wanted) = &self.tags {
            if !wanted.is_empty() {
                let has_any = record
                    .tags
                    .as_ref()
                    .map(|tags| tags.iter().any(|t| wanted.contains(t)))
                    .unwrap_or(false);
                if !has_any {
                    return false;
                }
            }
        }
        if let Some(start) = self.start_date {
            if record.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if record.timestamp > end {
                return false;
            }
        }
        if self.favorite_only == Some(true) && record.favorite != Some(true) {
            return false;
        }
        true
    }
}

/// Render records in the requested format.
pub fn render(records: &[ConversationRecord], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        ExportFormat::Markdown => Ok(to_markdown(records)),
        ExportFormat::Html => Ok(to_html(records)),
        ExportFormat::Csv => Ok(to_csv(records)),
    }
}

fn format_date(timestamp_ms: i64) -> String {
    match Utc.timestamp_millis_opt(timestamp_ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => timestamp_ms.to_string(),
    }
}

fn to_markdown(records: &[ConversationRecord]) -> String {
    records
        .iter()
        .map(|record| {
            let date = format_date(record.timestamp);
            let favorite = if record.favorite == Some(true) { " ★" } else { "" };
            let question = html_to_markdown(
                record.question_html.as_deref().unwrap_or(&record.question),
            );
            let answer =
                html_to_markdown(record.answer_html.as_deref().unwrap_or(&record.answer));

            let mut extra = String::new();
            if let Some(tags) = &record.tags {
                if !tags.is_empty() {
                    extra.push_str(&format!("\n**Tags:** {}", tags.join(", ")));
                }
            }
            if let Some(notes) = &record.notes {
                extra.push_str(&format!("\n**Notes:** {}", notes));
            }

            format!(
                "## {} - {}{}\n\n**Question:**\n{}\n\n**Answer:**\n{}\n{}\n\n---\n",
                date, record.platform, favorite, question, answer, extra
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

lazy_static! {
    static ref TAG_HEADING: Regex = Regex::new(r"(?is)<h([1-4])[^>]*>(.*?)</h[1-4]>").unwrap();
    static ref TAG_BOLD: Regex = Regex::new(r"(?is)<(?:strong|b)[^>]*>(.*?)</(?:strong|b)>").unwrap();
    static ref TAG_ITALIC: Regex = Regex::new(r"(?is)<(?:em|i)[^>]*>(.*?)</(?:em|i)>").unwrap();
    static ref TAG_PRE: Regex = Regex::new(r"(?is)<pre[^>]*>(.*?)</pre>").unwrap();
    static ref TAG_CODE: Regex = Regex::new(r"(?is)<code[^>]*>(.*?)</code>").unwrap();
    static ref TAG_LINK: Regex =
        Regex::new(r#"(?is)<a[^>]*href=["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap();
    static ref TAG_LIST_ITEM: Regex = Regex::new(r"(?is)<li[^>]*>(.*?)</li>").unwrap();
    static ref TAG_PARAGRAPH: Regex = Regex::new(r"(?is)<p[^>]*>(.*?)</p>").unwrap();
    static ref TAG_BREAK: Regex = Regex::new(r"(?i)<br[^>]*>").unwrap();
    static ref TAG_ANY: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref EXCESS_BLANK_LINES: Regex = Regex::new(r"\n{3,}").unwrap();
    static ref DANGEROUS_BLOCKS: Regex =
        Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(?:script|style|noscript)>").unwrap();
    static ref EVENT_HANDLER_ATTRS: Regex =
        Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).unwrap();
    static ref JAVASCRIPT_URLS: Regex =
        Regex::new(r#"(?i)(href|src)\s*=\s*["']\s*javascript:[^"']*["']"#).unwrap();
}

/// Simplified HTML-to-Markdown mapping for the tags chat answers actually
/// use. Plain text passes through unchanged.
fn html_to_markdown(html: &str) -> String {
    if !html.contains('<') {
        return html.to_string();
    }

    let mut text = html.to_string();
    text = TAG_HEADING
        .replace_all(&text, |caps: &regex::Captures| {
            let level = caps[1].parse::<usize>().unwrap_or(1);
            format!("{} {}\n\n", "#".repeat(level), &caps[2])
        })
        .into_owned();
    text = TAG_PRE.replace_all(&text, "```\n$1\n```").into_owned();
    text = TAG_CODE.replace_all(&text, "`$1`").into_owned();
    text = TAG_BOLD.replace_all(&text, "**$1**").into_owned();
    text = TAG_ITALIC.replace_all(&text, "*$1*").into_owned();
    text = TAG_LINK.replace_all(&text, "[$2]($1)").into_owned();
    text = TAG_LIST_ITEM.replace_all(&text, "- $1\n").into_owned();
    text = TAG_PARAGRAPH.replace_all(&text, "$1\n\n").into_owned();
    text = TAG_BREAK.replace_all(&text, "\n").into_owned();
    text = TAG_ANY.replace_all(&text, "").into_owned();
    text = EXCESS_BLANK_LINES.replace_all(&text, "\n\n").into_owned();
    text.trim().to_string()
}

/// Render-time sanitation for captured HTML fragments.
fn sanitize_fragment(html: &str) -> String {
    let text = DANGEROUS_BLOCKS.replace_all(html, "").into_owned();
    let text = EVENT_HANDLER_ATTRS.replace_all(&text, "").into_owned();
    JAVASCRIPT_URLS.replace_all(&text, "$1=\"#\"").into_owned()
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn to_html(records: &[ConversationRecord]) -> String {
    let body = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let date = format_date(record.timestamp);
            let favorite = if record.favorite == Some(true) {
                "<span class=\"favorite\">★</span>"
            } else {
                ""
            };
            let question = match &record.question_html {
                Some(html) => sanitize_fragment(html),
                None => escape_html(&record.question),
            };
            let answer = match &record.answer_html {
                Some(html) => sanitize_fragment(html),
                None => escape_html(&record.answer),
            };
            let tags = record
                .tags
                .as_ref()
                .filter(|t| !t.is_empty())
                .map(|tags| {
                    let spans = tags
                        .iter()
                        .map(|t| format!("<span class=\"tag\">{}</span>", escape_html(t)))
                        .collect::<String>();
                    format!("<div class=\"tags\">{}</div>", spans)
                })
                .unwrap_or_default();
            let notes = record
                .notes
                .as_ref()
                .map(|n| format!("<div class=\"notes\"><strong>Notes:</strong> {}</div>", escape_html(n)))
                .unwrap_or_default();

            format!(
                r#"    <div class="conversation">
      <div class="header">#{} · {} · {} {}</div>
      <div class="question"><div class="label">Question</div>{}</div>
      <div class="answer"><div class="label">Answer</div>{}</div>
      {}{}
    </div>"#,
                index + 1,
                escape_html(&date),
                escape_html(&record.platform),
                favorite,
                question,
                answer,
                tags,
                notes
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Conversation export ({} records)</title>
  <style>
    body {{ font-family: -apple-system, "Segoe UI", Roboto, sans-serif; line-height: 1.6; max-width: 900px; margin: 0 auto; padding: 20px; color: #333; }}
    .conversation {{ border: 1px solid #ddd; border-radius: 6px; padding: 16px; margin-bottom: 16px; }}
    .header {{ color: #666; font-size: 0.9em; margin-bottom: 8px; }}
    .label {{ font-weight: bold; margin-top: 8px; }}
    .tag {{ background: #eef; border-radius: 3px; padding: 1px 6px; margin-right: 4px; font-size: 0.85em; }}
    .favorite {{ color: #e6a700; }}
  </style>
</head>
<body>
  <h1>Conversation export</h1>
{}
</body>
</html>
"#,
        records.len(),
        body
    )
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn to_csv(records: &[ConversationRecord]) -> String {
    let mut out = String::from(
        "id,timestamp,platform,domain,title,question,answer,tags,category,notes,favorite\n",
    );
    for record in records {
        let row = [
            record.id.clone(),
            record.timestamp.to_string(),
            record.platform.clone(),
            record.domain.clone(),
            record.title.clone().unwrap_or_default(),
            record.question.clone(),
            record.answer.clone(),
            record.tags.as_ref().map(|t| t.join(";")).unwrap_or_default(),
            record.category.clone().unwrap_or_default(),
            record.notes.clone().unwrap_or_default(),
            (record.favorite == Some(true)).to_string(),
        ];
        let line = row
            .iter()
            .map(|field| csv_field(field))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}
