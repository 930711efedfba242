//! In-memory search engine.
//!
//! Keeps one cache entry per record: the lowercased concatenation of
//! question, answer, tags, category and notes. The cache lives for the
//! process only; it is rebuilt in full at startup and updated synchronously
//! with every add, update and delete, so a query never observes a state
//! behind the latest write visible to the same caller.
//!
//! Matching is plain substring containment against the cached text (a hard
//! filter, not a soft rank). Scoring weights question-field matches about
//! twice as heavily as answer-field matches, and whole-phrase containment
//! about three times a single token hit.

use crate::record::{ConversationRecord, Highlights, SearchOptions, SearchResult, SortBy};
use regex::RegexBuilder;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const DEFAULT_LIMIT: usize = 50;

/// Search engine over the archive's record set.
pub struct SearchEngine {
    /// id → lowercased searchable text.
    index: HashMap<String, String>,
}

impl SearchEngine {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
        }
    }

    /// Rebuild the cache from the full record set.
    pub fn rebuild(&mut self, records: &[ConversationRecord]) {
        self.index.clear();
        for record in records {
            self.index_record(record);
        }
        debug!("search index rebuilt with {} entries", self.index.len());
    }

    /// Add or refresh one record's cache entry.
    pub fn index_record(&mut self, record: &ConversationRecord) {
        self.index
            .insert(record.id.clone(), searchable_text(record));
    }

    /// Evict a deleted record.
    pub fn remove(&mut self, id: &str) {
        self.index.remove(id);
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Execute a query over the given record set.
    pub fn search(
        &self,
        records: &[ConversationRecord],
        query: &str,
        options: &SearchOptions,
    ) -> Vec<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let query_lower = query.to_lowercase();

        let mut results: Vec<SearchResult> = records
            .iter()
            .filter(|record| {
                self.index
                    .get(&record.id)
                    .map(|text| text.contains(&query_lower))
                    .unwrap_or(false)
            })
            .filter(|record| passes_filters(record, options))
            .map(|record| SearchResult {
                score: score(record, &query_lower),
                highlights: highlights(record, query),
                record: record.clone(),
            })
            .collect();

        match options.sort_by {
            SortBy::Time => results.sort_by(|a, b| b.record.timestamp.cmp(&a.record.timestamp)),
            SortBy::Relevance => results.sort_by(|a, b| b.score.cmp(&a.score)),
        }

        let limit = options.limit.unwrap_or(DEFAULT_LIMIT);
        results.truncate(limit);
        results
    }
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn searchable_text(record: &ConversationRecord) -> String {
    let joined_tags = record.tags.as_ref().map(|tags| tags.join(" "));
    let mut parts: Vec<&str> = vec![&record.question, &record.answer];
    if let Some(tags) = &joined_tags {
        parts.push(tags);
    }
    if let Some(category) = &record.category {
        parts.push(category);
    }
    if let Some(notes) = &record.notes {
        parts.push(notes);
    }
    parts.join(" ").to_lowercase()
}

fn passes_filters(record: &ConversationRecord, options: &SearchOptions) -> bool {
    if let Some(platform) = &options.platform {
        if &record.platform != platform {
            return false;
        }
    }
    if let Some(wanted) = &options.tags {
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
    if let Some(start) = options.start_date {
        if record.timestamp < start {
            return false;
        }
    }
    if let Some(end) = options.end_date {
        if record.timestamp > end {
            return false;
        }
    }
    if options.favorite_only == Some(true) && record.favorite != Some(true) {
        return false;
    }
    true
}

/// Relevance score: +10/+5 for whole-query containment in question/answer,
/// +3/+1 per query token present verbatim in the question/answer token set.
fn score(record: &ConversationRecord, query_lower: &str) -> i64 {
    let question_lower = record.question.to_lowercase();
    let answer_lower = record.answer.to_lowercase();

    let mut score = 0;
    if question_lower.contains(query_lower) {
        score += 10;
    }
    if answer_lower.contains(query_lower) {
        score += 5;
    }

    let question_tokens: HashSet<&str> = question_lower.split_whitespace().collect();
    let answer_tokens: HashSet<&str> = answer_lower.split_whitespace().collect();
    for token in query_lower.split_whitespace() {
        if question_tokens.contains(token) {
            score += 3;
        }
        if answer_tokens.contains(token) {
            score += 1;
        }
    }

    score
}

/// Distinct case-insensitive literal occurrences of the whole query, for UI
/// emphasis. Independent of scoring; no token-level highlighting.
fn highlights(record: &ConversationRecord, query: &str) -> Highlights {
    let pattern = match RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
    {
        Ok(p) => p,
        Err(_) => return Highlights::default(),
    };

    let collect = |text: &str| {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for m in pattern.find_iter(text) {
            let matched = m.as_str().to_string();
            if seen.insert(matched.clone()) {
                out.push(matched);
            }
        }
        out
    };

    Highlights {
        question: collect(&record.question),
        answer: collect(&record.answer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::sample_record;

    fn engine_with(records: &[ConversationRecord]) -> SearchEngine {
        let mut engine = SearchEngine::new();
        engine.rebuild(records);
        engine
    }

    #[test]
    fn empty_query_returns_nothing() {
        let records = vec![sample_record("a", "how to sort an array", "use quicksort")];
        let engine = engine_with(&records);
        assert!(engine.search(&records, "", &SearchOptions::default()).is_empty());
        assert!(engine.search(&records, "   ", &SearchOptions::default()).is_empty());
    }

    #[test]
    fn scoring_worked_example() {
        let records = vec![sample_record("a", "how to sort an array", "use quicksort")];
        let engine = engine_with(&records);

        // "sort": question contains it (+10) and holds it as a token (+3);
        // the answer contains it inside "quicksort" (+5) but has no exact
        // token match.
        let results = engine.search(&records, "sort", &SearchOptions::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 18);

        // "quicksort": answer containment (+5) plus an exact answer token (+1).
        let results = engine.search(&records, "quicksort", &SearchOptions::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 6);
    }

    #[test]
    fn non_matching_records_are_excluded_not_zero_scored() {
        let records = vec![
            sample_record("a", "how to sort an array", "use quicksort"),
            sample_record("b", "what is borrowing", "references without ownership"),
        ];
        let engine = engine_with(&records);
        let results = engine.search(&records, "sort", &SearchOptions::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.id, "a");
    }

    #[test]
    fn platform_filter_wins_over_score() {
        let mut a = sample_record("a", "sort sort sort", "sort everywhere");
        a.platform = "A".to_string();
        let mut b = sample_record("b", "one sort mention", "nothing else");
        b.platform = "B".to_string();
        let records = vec![a, b];
        let engine = engine_with(&records);

        let results = engine.search(
            &records,
            "sort",
            &SearchOptions {
                platform: Some("B".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.id, "b");
    }

    #[test]
    fn tag_filter_is_any_of() {
        let mut a = sample_record("a", "sorting question", "sorting answer text");
        a.tags = Some(vec!["rust".to_string()]);
        let mut b = sample_record("b", "sorting question two", "sorting answer text two");
        b.tags = Some(vec!["python".to_string()]);
        let c = sample_record("c", "sorting question three", "sorting answer text three");
        let records = vec![a, b, c];
        let engine = engine_with(&records);

        let results = engine.search(
            &records,
            "sorting",
            &SearchOptions {
                tags: Some(vec!["rust".to_string(), "go".to_string()]),
                ..Default::default()
            },
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.id, "a");
    }

    #[test]
    fn timestamp_range_is_inclusive() {
        let mut a = sample_record("a", "sorting one", "sorting answer text");
        a.timestamp = 100;
        let mut b = sample_record("b", "sorting two", "sorting answer text");
        b.timestamp = 200;
        let mut c = sample_record("c", "sorting three", "sorting answer text");
        c.timestamp = 300;
        let records = vec![a, b, c];
        let engine = engine_with(&records);

        let results = engine.search(
            &records,
            "sorting",
            &SearchOptions {
                start_date: Some(100),
                end_date: Some(200),
                sort_by: SortBy::Time,
                ..Default::default()
            },
        );
        let ids: Vec<&str> = results.iter().map(|r| r.record.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn favorite_only_filter() {
        let mut a = sample_record("a", "sorting one", "sorting answer text");
        a.favorite = Some(true);
        let b = sample_record("b", "sorting two", "sorting answer text");
        let records = vec![a, b];
        let engine = engine_with(&records);

        let results = engine.search(
            &records,
            "sorting",
            &SearchOptions {
                favorite_only: Some(true),
                ..Default::default()
            },
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.id, "a");
    }

    #[test]
    fn sort_by_time_ignores_score() {
        let mut a = sample_record("a", "sort sort sort", "sort sort sort");
        a.timestamp = 100;
        let mut b = sample_record("b", "one sort only", "answer with sort");
        b.timestamp = 200;
        let records = vec![a, b];
        let engine = engine_with(&records);

        let results = engine.search(
            &records,
            "sort",
            &SearchOptions {
                sort_by: SortBy::Time,
                ..Default::default()
            },
        );
        let ids: Vec<&str> = results.iter().map(|r| r.record.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn limit_truncates() {
        let records: Vec<ConversationRecord> = (0..10)
            .map(|i| sample_record(&format!("id-{}", i), "sorting question", "sorting answer text"))
            .collect();
        let engine = engine_with(&records);

        let results = engine.search(
            &records,
            "sorting",
            &SearchOptions {
                limit: Some(3),
                ..Default::default()
            },
        );
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn tags_and_notes_are_searchable() {
        let mut a = sample_record("a", "unrelated question", "unrelated answer");
        a.tags = Some(vec!["quicksort".to_string()]);
        let mut b = sample_record("b", "unrelated question", "unrelated answer");
        b.notes = Some("remember quicksort pivots".to_string());
        let records = vec![a, b];
        let engine = engine_with(&records);

        let results = engine.search(&records, "quicksort", &SearchOptions::default());
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn highlights_are_distinct_case_insensitive_occurrences() {
        let record = sample_record(
            "a",
            "Sort me, sort me again, SORT everything",
            "sorting is fine",
        );
        let records = vec![record];
        let engine = engine_with(&records);

        let results = engine.search(&records, "sort", &SearchOptions::default());
        assert_eq!(
            results[0].highlights.question,
            vec!["Sort".to_string(), "sort".to_string(), "SORT".to_string()]
        );
        assert_eq!(results[0].highlights.answer, vec!["sort".to_string()]);
    }

    #[test]
    fn cache_updates_synchronously() {
        let mut records = vec![sample_record("a", "question about sorting", "sorting answer text")];
        let mut engine = engine_with(&records);

        // Update: new notes become searchable immediately.
        records[0].notes = Some("mentions heapsort".to_string());
        engine.index_record(&records[0]);
        assert_eq!(
            engine.search(&records, "heapsort", &SearchOptions::default()).len(),
            1
        );

        // Delete: entry evicted, record no longer reachable.
        engine.remove("a");
        assert!(engine.search(&records, "sorting", &SearchOptions::default()).is_empty());
    }
}
