use std::collections::BTreeMap;

use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};

use peartalk_shared::{Message, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::indexes::Index;
use crate::models::PutOutcome;

/// Build a primary key: zero-padded timestamp so keys sort by time, plus a
/// random suffix so same-millisecond messages never collide.
pub fn primary_key(timestamp: i64) -> String {
    let suffix: [u8; 8] = rand::random();
    format!("{:020}-{}", timestamp.max(0), hex::encode(suffix))
}

impl Database {
    /// Append a message.
    ///
    /// The primary record is written first and its failure is returned. Index
    /// writes are attempted independently afterwards; a failed index write is
    /// logged and counted but never undoes or fails the put.
    pub fn put(&self, message: &Message) -> Result<PutOutcome> {
        let key = primary_key(message.timestamp);
        let body = serde_json::to_string(message)?;

        self.conn().execute(
            "INSERT INTO messages (key, body) VALUES (?1, ?2)",
            params![key, body],
        )?;

        let mut index_faults = 0;
        for index in Index::ALL {
            if let Err(e) = self.insert_index_entry(index, message, &key) {
                warn!(
                    index = index.table(),
                    key = %key,
                    error = %e,
                    "index write failed, primary record kept"
                );
                index_faults += 1;
            }
        }

        debug!(key = %key, sender = %message.sender, recipient = %message.recipient, "stored message");

        Ok(PutOutcome { key, index_faults })
    }

    /// Fetch one message by primary key.
    pub fn get(&self, key: &str) -> Result<Message> {
        let body: Option<String> = self
            .conn()
            .query_row(
                "SELECT body FROM messages WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let body = body.ok_or(StoreError::NotFound)?;
        Ok(serde_json::from_str(&body)?)
    }

    /// The last `limit` messages exchanged between `self_id` and `peer_id`,
    /// in ascending timestamp order.
    ///
    /// Scans the recipient index for messages addressed to `self_id` and the
    /// sender index for messages sent by `self_id`, and keeps those whose
    /// stored counterpart is `peer_id`. Cost grows with the number of
    /// messages involving `self_id`, not with the conversation size.
    pub fn query(&self, self_id: &UserId, peer_id: &UserId, limit: usize) -> Result<Vec<Message>> {
        let owner = Value::Text(self_id.as_str().to_string());
        let mut found: BTreeMap<(i64, String), Message> = BTreeMap::new();

        for key in self.scan_index(Index::Recipient, owner.clone())? {
            if let Some(message) = self.resolve_index_hit(&key) {
                if message.recipient == *self_id && message.sender == *peer_id {
                    found.insert((message.timestamp, key), message);
                }
            }
        }

        for key in self.scan_index(Index::Sender, owner)? {
            if let Some(message) = self.resolve_index_hit(&key) {
                if message.sender == *self_id && message.recipient == *peer_id {
                    found.insert((message.timestamp, key), message);
                }
            }
        }

        let skip = found.len().saturating_sub(limit);
        Ok(found.into_values().skip(skip).collect())
    }

    /// Messages with `from_ms <= timestamp < to_ms`, oldest first.
    pub fn range_by_time(&self, from_ms: i64, to_ms: i64) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT message_key FROM idx_timestamp
             WHERE index_value >= ?1 AND index_value < ?2
             ORDER BY index_value, message_key",
        )?;
        let keys = stmt.query_map(params![from_ms, to_ms], |row| row.get::<_, String>(0))?;

        let mut messages = Vec::new();
        for key in keys {
            let key = key?;
            if let Some(message) = self.resolve_index_hit(&key) {
                if message.timestamp >= from_ms && message.timestamp < to_ms {
                    messages.push(message);
                }
            }
        }
        Ok(messages)
    }

    /// Number of primary records.
    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Every decodable primary record with its key, in key order.
    pub(crate) fn all_records(&self) -> Result<Vec<(String, Message)>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT key, body FROM messages ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut records = Vec::new();
        for row in rows {
            let (key, body) = row?;
            match serde_json::from_str::<Message>(&body) {
                Ok(message) => records.push((key, message)),
                Err(e) => warn!(key = %key, error = %e, "skipping undecodable message record"),
            }
        }
        Ok(records)
    }

    // An index entry whose primary record is missing or unreadable is skipped.
    fn resolve_index_hit(&self, key: &str) -> Option<Message> {
        match self.get(key) {
            Ok(message) => Some(message),
            Err(StoreError::NotFound) => {
                debug!(key = %key, "dangling index entry skipped");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "failed to load indexed message");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peartalk_shared::MessageBody;

    fn user(name: &str) -> UserId {
        UserId::parse(name).unwrap()
    }

    fn text(from: &str, to: &str, ts: i64, content: &str) -> Message {
        Message {
            body: MessageBody::text(content),
            sender: user(from),
            recipient: user(to),
            timestamp: ts,
        }
    }

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("messages.db")).unwrap();
        (dir, db)
    }

    fn index_rows(db: &Database, index: Index) -> i64 {
        db.conn()
            .query_row(&format!("SELECT COUNT(*) FROM {}", index.table()), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_primary_key_layout() {
        let key = primary_key(1_700_000_000_000);
        assert_eq!(key.len(), 20 + 1 + 16);
        assert!(key.starts_with("00000001700000000000-"));
        assert!(primary_key(9) < primary_key(10));
    }

    #[test]
    fn test_put_writes_primary_and_indexes() {
        let (_dir, db) = open();
        let msg = text("alice", "bob", 1_000, "hi");

        let outcome = db.put(&msg).unwrap();
        assert_eq!(outcome.index_faults, 0);
        assert_eq!(db.get(&outcome.key).unwrap(), msg);
        assert_eq!(db.count().unwrap(), 1);
        for index in Index::ALL {
            assert_eq!(index_rows(&db, index), 1);
        }
    }

    #[test]
    fn test_get_missing() {
        let (_dir, db) = open();
        assert!(matches!(db.get("nope"), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_same_millisecond_messages_both_kept() {
        let (_dir, db) = open();
        let k1 = db.put(&text("alice", "bob", 42, "one")).unwrap().key;
        let k2 = db.put(&text("alice", "bob", 42, "two")).unwrap().key;

        assert_ne!(k1, k2);
        let history = db.query(&user("alice"), &user("bob"), 50).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_query_both_directions_sorted_and_limited() {
        let (_dir, db) = open();
        db.put(&text("alice", "bob", 30, "a3")).unwrap();
        db.put(&text("bob", "alice", 20, "b2")).unwrap();
        db.put(&text("alice", "carol", 25, "c")).unwrap();
        db.put(&text("alice", "bob", 10, "a1")).unwrap();
        db.put(&text("carol", "alice", 15, "c2")).unwrap();
        db.put(&text("bob", "alice", 40, "b4")).unwrap();

        let all = db.query(&user("alice"), &user("bob"), 50).unwrap();
        let contents: Vec<&str> = all.iter().map(|m| m.body.content()).collect();
        assert_eq!(contents, vec!["a1", "b2", "a3", "b4"]);

        let last_two = db.query(&user("alice"), &user("bob"), 2).unwrap();
        let contents: Vec<&str> = last_two.iter().map(|m| m.body.content()).collect();
        assert_eq!(contents, vec!["a3", "b4"]);

        let from_bob = db.query(&user("bob"), &user("alice"), 50).unwrap();
        assert_eq!(from_bob.len(), 4);

        assert!(db.query(&user("alice"), &user("bob"), 0).unwrap().is_empty());
    }

    #[test]
    fn test_query_self_conversation_not_duplicated() {
        let (_dir, db) = open();
        db.put(&text("alice", "alice", 1, "note to self")).unwrap();

        let notes = db.query(&user("alice"), &user("alice"), 50).unwrap();
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn test_index_fault_keeps_primary() {
        let (_dir, db) = open();
        db.conn().execute_batch("DROP TABLE idx_timestamp").unwrap();

        let msg = text("alice", "bob", 7, "still here");
        let outcome = db.put(&msg).unwrap();

        assert_eq!(outcome.index_faults, 1);
        assert_eq!(db.count().unwrap(), 1);
        assert_eq!(db.query(&user("bob"), &user("alice"), 50).unwrap(), vec![msg]);
    }

    #[test]
    fn test_repair_restores_lost_index_entries() {
        let (_dir, db) = open();
        let msg = text("bob", "alice", 5, "lost");
        db.put(&msg).unwrap();
        db.conn().execute_batch("DELETE FROM idx_recipient").unwrap();

        assert!(db.query(&user("alice"), &user("bob"), 50).unwrap().is_empty());

        let report = db.repair_indexes().unwrap();
        assert_eq!(report.restored, 1);
        assert_eq!(report.removed, 0);
        assert_eq!(db.query(&user("alice"), &user("bob"), 50).unwrap(), vec![msg]);
    }

    #[test]
    fn test_reopen_repairs_only_when_indexes_disagree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.db");
        let msg = text("bob", "alice", 5, "lost then found");

        {
            let db = Database::open_at(&path).unwrap();
            db.put(&msg).unwrap();
            assert!(db.indexes_consistent().unwrap());

            db.conn().execute_batch("DELETE FROM idx_recipient").unwrap();
            assert!(!db.indexes_consistent().unwrap());
        }

        let db = Database::open_at(&path).unwrap();
        assert!(db.indexes_consistent().unwrap());
        assert_eq!(index_rows(&db, Index::Recipient), 1);
        assert_eq!(db.query(&user("alice"), &user("bob"), 50).unwrap(), vec![msg]);
    }

    #[test]
    fn test_primary_wins_over_conflicting_index() {
        let (_dir, db) = open();
        let key = db.put(&text("bob", "carol", 5, "not alice's")).unwrap().key;
        db.conn()
            .execute(
                "INSERT INTO idx_sender (index_value, message_key) VALUES ('alice', ?1)",
                params![key],
            )
            .unwrap();
        db.conn()
            .execute(
                "INSERT INTO idx_recipient (index_value, message_key) VALUES ('alice', 'gone')",
                [],
            )
            .unwrap();

        assert!(db.query(&user("alice"), &user("carol"), 50).unwrap().is_empty());

        let report = db.repair_indexes().unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(report.restored, 0);
        assert_eq!(index_rows(&db, Index::Sender), 1);
        assert_eq!(index_rows(&db, Index::Recipient), 1);
    }

    #[test]
    fn test_range_by_time() {
        let (_dir, db) = open();
        db.put(&text("alice", "bob", 100, "a")).unwrap();
        db.put(&text("bob", "alice", 200, "b")).unwrap();
        db.put(&text("carol", "dave", 300, "c")).unwrap();

        let window = db.range_by_time(150, 301).unwrap();
        let contents: Vec<&str> = window.iter().map(|m| m.body.content()).collect();
        assert_eq!(contents, vec!["b", "c"]);
    }

    #[test]
    fn test_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.db");
        let msg = text("alice", "bob", 9, "durable");

        {
            let db = Database::open_at(&path).unwrap();
            db.put(&msg).unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.query(&user("alice"), &user("bob"), 50).unwrap(), vec![msg]);
    }
}
