//! SQLite-backed conversation store.
//!
//! Records are stored whole, keyed by their content-derived id; saving an
//! id that already exists is reported as a duplicate, never a second row.
//! Every row carries its serialized byte size so capacity accounting is a
//! single SUM, and the capacity policy is enforced before any write: a
//! refused save leaves the stored set untouched.

use crate::record::{ConversationRecord, RecordUpdate, Statistics};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Severity bands for storage usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityCategory {
    Warning,
    Severe,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityWarning {
    pub category: CapacityCategory,
    pub message: String,
}

/// Outcome of a capacity check at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityReport {
    pub can_save: bool,
    pub current_bytes: u64,
    pub max_bytes: u64,
    pub usage_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<CapacityWarning>,
}

/// Three-band capacity policy over total serialized size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityPolicy {
    pub max_bytes: u64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 100 * 1024 * 1024,
            warning_threshold: 0.8,
            critical_threshold: 0.95,
        }
    }
}

impl CapacityPolicy {
    pub fn report(&self, current_bytes: u64) -> CapacityReport {
        let ratio = current_bytes as f64 / self.max_bytes as f64;

        let (can_save, warning) = if ratio >= 1.0 {
            (
                false,
                Some(CapacityWarning {
                    category: CapacityCategory::Full,
                    message: format!(
                        "Storage full ({} / {}). Delete or export conversations before saving more.",
                        format_bytes(current_bytes),
                        format_bytes(self.max_bytes)
                    ),
                }),
            )
        } else if ratio >= self.critical_threshold {
            (
                true,
                Some(CapacityWarning {
                    category: CapacityCategory::Severe,
                    message: format!(
                        "Storage critically low: {:.1}% used. Clean up soon.",
                        ratio * 100.0
                    ),
                }),
            )
        } else if ratio >= self.warning_threshold {
            (
                true,
                Some(CapacityWarning {
                    category: CapacityCategory::Warning,
                    message: format!(
                        "Storage usage high: {:.1}% used. Consider cleaning up old conversations.",
                        ratio * 100.0
                    ),
                }),
            )
        } else {
            (true, None)
        };

        CapacityReport {
            can_save,
            current_bytes,
            max_bytes: self.max_bytes,
            usage_percent: ratio * 100.0,
            warning,
        }
    }
}

/// SQLite record store.
pub struct RecordStore {
    conn: Connection,
    policy: CapacityPolicy,
}

impl RecordStore {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P, policy: CapacityPolicy) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn, policy };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory(policy: CapacityPolicy) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, policy };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                platform TEXT NOT NULL,
                domain TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                question_html TEXT,
                answer_html TEXT,
                title TEXT,
                page_url TEXT NOT NULL DEFAULT '',
                tags TEXT,
                category TEXT,
                notes TEXT,
                favorite INTEGER NOT NULL DEFAULT 0,
                byte_size INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_timestamp ON conversations(timestamp);
            CREATE INDEX IF NOT EXISTS idx_conversations_platform ON conversations(platform);
            "#,
        )?;
        Ok(())
    }

    pub fn capacity_report(&self) -> Result<CapacityReport, StoreError> {
        let total: u64 = self.conn.query_row(
            "SELECT COALESCE(SUM(byte_size), 0) FROM conversations",
            [],
            |row| row.get(0),
        )?;
        Ok(self.policy.report(total))
    }

    pub fn contains(&self, id: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Which of the candidate ids are already present. One query per
    /// candidate under the hood, but a single round trip for the caller.
    pub fn existing_ids(&self, ids: &[String]) -> Result<Vec<String>, StoreError> {
        let mut existing = Vec::new();
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM conversations WHERE id = ?1")?;
        for id in ids {
            let found: Option<i64> = stmt.query_row(params![id], |row| row.get(0)).optional()?;
            if found.is_some() {
                existing.push(id.clone());
            }
        }
        Ok(existing)
    }

    /// Insert a new record. The caller has already established the id is
    /// absent and capacity allows the write.
    pub fn insert(&mut self, record: &ConversationRecord) -> Result<(), StoreError> {
        let tags_json = match &record.tags {
            Some(tags) => Some(serde_json::to_string(tags)?),
            None => None,
        };
        self.conn.execute(
            "INSERT INTO conversations
                (id, timestamp, platform, domain, question, answer, question_html,
                 answer_html, title, page_url, tags, category, notes, favorite, byte_size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                record.id,
                record.timestamp,
                record.platform,
                record.domain,
                record.question,
                record.answer,
                record.question_html,
                record.answer_html,
                record.title,
                record.page_url,
                tags_json,
                record.category,
                record.notes,
                record.favorite.unwrap_or(false) as i64,
                record.byte_size(),
            ],
        )?;
        debug!("stored record {}", record.id);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<ConversationRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, platform, domain, question, answer, question_html,
                    answer_html, title, page_url, tags, category, notes, favorite
             FROM conversations WHERE id = ?1",
        )?;
        let record = stmt
            .query_row(params![id], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Full record set, newest first.
    pub fn get_all(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, platform, domain, question, answer, question_html,
                    answer_html, title, page_url, tags, category, notes, favorite
             FROM conversations ORDER BY timestamp DESC",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Apply a user edit and return the updated record. Capture fields and
    /// the original timestamp are untouched.
    pub fn update(
        &mut self,
        id: &str,
        updates: RecordUpdate,
    ) -> Result<ConversationRecord, StoreError> {
        let mut record = self
            .get(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        updates.apply(&mut record);

        let tags_json = match &record.tags {
            Some(tags) => Some(serde_json::to_string(tags)?),
            None => None,
        };
        self.conn.execute(
            "UPDATE conversations
             SET tags = ?1, category = ?2, notes = ?3, favorite = ?4, byte_size = ?5
             WHERE id = ?6",
            params![
                tags_json,
                record.category,
                record.notes,
                record.favorite.unwrap_or(false) as i64,
                record.byte_size(),
                id,
            ],
        )?;
        Ok(record)
    }

    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Distinct platform labels present in the archive.
    pub fn platforms(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT platform FROM conversations ORDER BY platform")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut platforms = Vec::new();
        for row in rows {
            platforms.push(row?);
        }
        Ok(platforms)
    }

    /// Distinct user tags across all records.
    pub fn tags(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT tags FROM conversations WHERE tags IS NOT NULL")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut seen = std::collections::BTreeSet::new();
        for row in rows {
            let tags: Vec<String> = serde_json::from_str(&row?)?;
            seen.extend(tags);
        }
        Ok(seen.into_iter().collect())
    }

    pub fn statistics(&self) -> Result<Statistics, StoreError> {
        let (total_count, total_bytes, oldest, newest): (u64, u64, Option<i64>, Option<i64>) =
            self.conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(byte_size), 0), MIN(timestamp), MAX(timestamp)
                 FROM conversations",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        let mut platforms = std::collections::BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT platform, COUNT(*) FROM conversations GROUP BY platform")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        for row in rows {
            let (platform, count) = row?;
            platforms.insert(platform, count);
        }

        Ok(Statistics {
            total_count,
            total_bytes,
            size_formatted: format_bytes(total_bytes),
            platforms,
            oldest,
            newest,
        })
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRecord> {
    let tags_json: Option<String> = row.get(10)?;
    let tags = tags_json.and_then(|json| serde_json::from_str(&json).ok());
    let favorite: i64 = row.get(13)?;
    Ok(ConversationRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        platform: row.get(2)?,
        domain: row.get(3)?,
        question: row.get(4)?,
        answer: row.get(5)?,
        question_html: row.get(6)?,
        answer_html: row.get(7)?,
        title: row.get(8)?,
        page_url: row.get(9)?,
        tags,
        category: row.get(11)?,
        notes: row.get(12)?,
        favorite: if favorite != 0 { Some(true) } else { None },
    })
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}
