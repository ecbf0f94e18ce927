use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Result as SqlResult, Row, params, params_from_iter};
use uuid::Uuid;

use crate::backend::{MessageFilter, SortOrder};
use crate::common::{Message, NewMessage, Profile};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, created_at, read";

/// Local stand-in for the managed `profiles` and `messages` tables.
pub struct MessageDatabase {
    conn: Connection,
}

impl MessageDatabase {
    /// Open (or create) the store at `path`
    pub fn with_path<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> SqlResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> SqlResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let message_db = Self { conn };
        message_db.init_schema()?;
        Ok(message_db)
    }

    fn init_schema(&self) -> SqlResult<()> {
        let conn = &self.conn;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                full_name TEXT,
                bio TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS profile_skills (
                profile_id TEXT NOT NULL,
                skill TEXT NOT NULL,

                PRIMARY KEY (profile_id, skill),
                FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // created_at is microseconds since the epoch
        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,

                CHECK (length(trim(content)) > 0),
                CHECK (read IN (0, 1))
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_sender_receiver
             ON messages(sender_id, receiver_id, created_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_receiver_read
             ON messages(receiver_id, read)",
            [],
        )?;

        conn.execute(
            "CREATE TRIGGER IF NOT EXISTS messages_read_is_monotonic
                BEFORE UPDATE OF read ON messages
                WHEN OLD.read = 1 AND NEW.read = 0
                BEGIN
                    SELECT RAISE(ABORT, 'read flag cannot revert');
                END;",
            [],
        )?;

        Ok(())
    }

    // ========== Profiles ==========

    /// Insert or replace a profile together with its skill set
    pub fn upsert_profile(&mut self, profile: &Profile) -> SqlResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO profiles (id, full_name, bio) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET full_name = excluded.full_name, bio = excluded.bio",
            params![profile.id, profile.display_name, profile.bio],
        )?;
        tx.execute(
            "DELETE FROM profile_skills WHERE profile_id = ?1",
            params![profile.id],
        )?;
        for skill in &profile.skills {
            tx.execute(
                "INSERT INTO profile_skills (profile_id, skill) VALUES (?1, ?2)",
                params![profile.id, skill],
            )?;
        }
        tx.commit()
    }

    pub fn get_profile(&self, id: &str) -> SqlResult<Option<Profile>> {
        let conn = &self.conn;
        let profile = conn
            .query_row(
                "SELECT id, full_name, bio FROM profiles WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Profile {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        bio: row.get(2)?,
                        skills: BTreeSet::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut profile) = profile else {
            return Ok(None);
        };

        let mut stmt =
            conn.prepare("SELECT skill FROM profile_skills WHERE profile_id = ?1 ORDER BY skill")?;
        profile.skills = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))?
            .collect::<SqlResult<BTreeSet<_>>>()?;

        Ok(Some(profile))
    }

    // ========== Messages ==========

    /// Store a new message. The store assigns id, creation time and `read = false`.
    ///
    /// Creation times are strictly increasing within one store so that
    /// insertion order and `created_at` order agree.
    pub fn insert_message(&self, message: &NewMessage) -> SqlResult<Message> {
        let conn = &self.conn;
        let latest: i64 = conn.query_row(
            "SELECT COALESCE(MAX(created_at), 0) FROM messages",
            [],
            |row| row.get(0),
        )?;
        let created_at_us = Utc::now().timestamp_micros().max(latest + 1);

        let stored = Message {
            id: Uuid::new_v4().to_string(),
            sender_id: message.sender_id.clone(),
            receiver_id: message.receiver_id.clone(),
            content: message.content.clone(),
            created_at: micros_to_datetime(created_at_us, 4)?,
            read: false,
        };

        conn.execute(
            "INSERT INTO messages (id, sender_id, receiver_id, content, created_at, read)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![
                stored.id,
                stored.sender_id,
                stored.receiver_id,
                stored.content,
                created_at_us
            ],
        )?;
        Ok(stored)
    }

    pub fn query_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
    ) -> SqlResult<Vec<Message>> {
        let conn = &self.conn;
        let (clause, args) = filter_clause(filter);
        let direction = match order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {clause}
             ORDER BY created_at {direction}, id {direction}"
        );

        let mut stmt = conn.prepare(&sql)?;
        let messages = stmt
            .query_map(params_from_iter(args.iter()), message_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(messages)
    }

    /// Set `read = 1` on every matching row; returns the number of rows touched
    pub fn mark_read(&self, filter: &MessageFilter) -> SqlResult<usize> {
        let conn = &self.conn;
        let (clause, args) = filter_clause(filter);
        let sql = format!("UPDATE messages SET read = 1 WHERE read = 0 AND ({clause})");
        conn.execute(&sql, params_from_iter(args.iter()))
    }
}

fn filter_clause(filter: &MessageFilter) -> (&'static str, Vec<&str>) {
    match filter {
        MessageFilter::Involving { user_id } => (
            "sender_id = ?1 OR receiver_id = ?1",
            vec![user_id.as_str()],
        ),
        MessageFilter::Between { a, b } => (
            "(sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)",
            vec![a.as_str(), b.as_str()],
        ),
        MessageFilter::UnreadFrom {
            sender_id,
            receiver_id,
        } => (
            "sender_id = ?1 AND receiver_id = ?2 AND read = 0",
            vec![sender_id.as_str(), receiver_id.as_str()],
        ),
    }
}

fn message_from_row(row: &Row<'_>) -> SqlResult<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        created_at: micros_to_datetime(row.get(4)?, 4)?,
        read: row.get::<_, i64>(5)? != 0,
    })
}

fn micros_to_datetime(micros: i64, column: usize) -> SqlResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            format!("created_at {micros} out of range").into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_message(sender: &str, receiver: &str, content: &str) -> NewMessage {
        NewMessage {
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn inserted_messages_start_unread_with_increasing_timestamps() {
        let db = MessageDatabase::in_memory().unwrap();
        let first = db.insert_message(&new_message("a", "b", "one")).unwrap();
        let second = db.insert_message(&new_message("b", "a", "two")).unwrap();

        assert!(!first.read);
        assert!(second.created_at > first.created_at);
        let all = db
            .query_messages(
                &MessageFilter::Involving {
                    user_id: "a".to_string(),
                },
                SortOrder::Ascending,
            )
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn query_filters_and_orders() {
        let db = MessageDatabase::in_memory().unwrap();
        db.insert_message(&new_message("a", "b", "1")).unwrap();
        db.insert_message(&new_message("c", "a", "2")).unwrap();
        db.insert_message(&new_message("b", "a", "3")).unwrap();
        db.insert_message(&new_message("b", "c", "4")).unwrap();

        let between = db
            .query_messages(
                &MessageFilter::Between {
                    a: "a".to_string(),
                    b: "b".to_string(),
                },
                SortOrder::Ascending,
            )
            .unwrap();
        let contents: Vec<_> = between.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["1", "3"]);

        let involving = db
            .query_messages(
                &MessageFilter::Involving {
                    user_id: "a".to_string(),
                },
                SortOrder::Descending,
            )
            .unwrap();
        let contents: Vec<_> = involving.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["3", "2", "1"]);
    }

    #[test]
    fn mark_read_touches_only_matching_unread_rows() {
        let db = MessageDatabase::in_memory().unwrap();
        db.insert_message(&new_message("b", "a", "x")).unwrap();
        db.insert_message(&new_message("b", "a", "y")).unwrap();
        db.insert_message(&new_message("a", "b", "z")).unwrap();

        let filter = MessageFilter::UnreadFrom {
            sender_id: "b".to_string(),
            receiver_id: "a".to_string(),
        };
        assert_eq!(db.mark_read(&filter).unwrap(), 2);
        assert_eq!(db.mark_read(&filter).unwrap(), 0);

        let outgoing = db
            .query_messages(
                &MessageFilter::UnreadFrom {
                    sender_id: "a".to_string(),
                    receiver_id: "b".to_string(),
                },
                SortOrder::Ascending,
            )
            .unwrap();
        assert_eq!(outgoing.len(), 1);
    }

    #[test]
    fn read_flag_cannot_be_reverted() {
        let db = MessageDatabase::in_memory().unwrap();
        let stored = db.insert_message(&new_message("b", "a", "x")).unwrap();
        db.mark_read(&MessageFilter::Involving {
            user_id: "a".to_string(),
        })
        .unwrap();

        let revert = db.conn.execute(
            "UPDATE messages SET read = 0 WHERE id = ?1",
            params![stored.id],
        );
        assert!(revert.is_err());
    }

    #[test]
    fn blank_content_is_refused() {
        let db = MessageDatabase::in_memory().unwrap();
        assert!(db.insert_message(&new_message("a", "b", "   ")).is_err());
    }

    #[test]
    fn profile_round_trips_with_skills() {
        let mut db = MessageDatabase::in_memory().unwrap();
        let profile = Profile {
            id: "u1".to_string(),
            display_name: Some("Ada".to_string()),
            bio: Some("maths tutor".to_string()),
            skills: ["calculus".to_string(), "rust".to_string()].into(),
        };
        db.upsert_profile(&profile).unwrap();
        assert_eq!(db.get_profile("u1").unwrap(), Some(profile.clone()));

        let renamed = Profile {
            display_name: Some("Ada L.".to_string()),
            skills: ["rust".to_string()].into(),
            ..profile
        };
        db.upsert_profile(&renamed).unwrap();
        assert_eq!(db.get_profile("u1").unwrap(), Some(renamed));
        assert_eq!(db.get_profile("missing").unwrap(), None);
    }
}
