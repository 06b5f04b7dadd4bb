//! Secondary index maintenance.
//!
//! Each index table maps `(index_value, message_key)` to nothing: the key
//! itself points at the primary record. Entries are written after the primary
//! record, so a crash or fault can leave an index short or stale; the primary
//! record always wins and [`Database::repair_indexes`] reconciles the two.
//! Opening a store runs the repair only when [`Database::indexes_consistent`]
//! finds an index whose size disagrees with the primary table.

use std::collections::{HashMap, HashSet};

use rusqlite::params;
use rusqlite::types::Value;
use tracing::{debug, warn};

use peartalk_shared::Message;

use crate::database::Database;
use crate::error::Result;
use crate::models::RepairReport;

/// The three derived indexes kept for every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    Sender,
    Recipient,
    Timestamp,
}

impl Index {
    pub const ALL: [Index; 3] = [Index::Sender, Index::Recipient, Index::Timestamp];

    pub(crate) fn table(self) -> &'static str {
        match self {
            Index::Sender => "idx_sender",
            Index::Recipient => "idx_recipient",
            Index::Timestamp => "idx_timestamp",
        }
    }

    /// The value this index files `message` under.
    pub(crate) fn value_of(self, message: &Message) -> Value {
        match self {
            Index::Sender => Value::Text(message.sender.as_str().to_string()),
            Index::Recipient => Value::Text(message.recipient.as_str().to_string()),
            Index::Timestamp => Value::Integer(message.timestamp),
        }
    }
}

impl Database {
    pub(crate) fn insert_index_entry(&self, index: Index, message: &Message, key: &str) -> Result<()> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} (index_value, message_key) VALUES (?1, ?2)",
            index.table()
        );
        self.conn()
            .execute(&sql, params![index.value_of(message), key])?;
        Ok(())
    }

    /// Primary keys filed under `value` in `index`, in key order.
    pub(crate) fn scan_index(&self, index: Index, value: Value) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT message_key FROM {} WHERE index_value = ?1 ORDER BY message_key",
            index.table()
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![value], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    fn index_entries(&self, index: Index) -> Result<Vec<(Value, String)>> {
        let sql = format!("SELECT index_value, message_key FROM {}", index.table());
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, Value>(0)?, row.get::<_, String>(1)?)))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Cheap check run on open: every index holds exactly one entry per
    /// primary record. A stale value with the right count goes unnoticed
    /// here; queries skip such entries through the primary record.
    pub fn indexes_consistent(&self) -> Result<bool> {
        let primaries: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;

        for index in Index::ALL {
            let sql = format!("SELECT COUNT(*) FROM {}", index.table());
            let entries: i64 = self.conn().query_row(&sql, [], |row| row.get(0))?;
            if entries != primaries {
                debug!(index = index.table(), entries, primaries, "index out of step with primary records");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Bring every index in line with the primary records: add missing
    /// entries, drop entries whose message is gone or whose indexed value
    /// disagrees with the stored message.
    pub fn repair_indexes(&self) -> Result<RepairReport> {
        let primaries: HashMap<String, Message> = self.all_records()?.into_iter().collect();
        let mut report = RepairReport::default();

        for index in Index::ALL {
            let mut covered = HashSet::new();

            for (value, key) in self.index_entries(index)? {
                match primaries.get(&key) {
                    Some(message) if index.value_of(message) == value => {
                        covered.insert(key);
                    }
                    _ => {
                        let sql = format!(
                            "DELETE FROM {} WHERE index_value = ?1 AND message_key = ?2",
                            index.table()
                        );
                        self.conn().execute(&sql, params![value, key])?;
                        debug!(index = index.table(), key = %key, "removed stale index entry");
                        report.removed += 1;
                    }
                }
            }

            for (key, message) in &primaries {
                if !covered.contains(key) {
                    self.insert_index_entry(index, message, key)?;
                    report.restored += 1;
                }
            }
        }

        if !report.is_clean() {
            warn!(
                restored = report.restored,
                removed = report.removed,
                "secondary indexes repaired"
            );
        }

        Ok(report)
    }
}
