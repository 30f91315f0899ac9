//! CRUD operations for [`Reaction`] records.
//!
//! At most one active reaction per (message, sender) pair; that pair is the
//! primary key.  An incoming reaction with an empty glyph is a removal and
//! deletes the row rather than storing an empty emoji.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Row};

use crate::database::Database;
use crate::error::Result;
use crate::models::Reaction;

impl Database {
    /// Upsert-or-delete driven by an incoming reaction event.
    /// Returns `true` when a row remains stored afterwards.
    pub fn apply_reaction(&self, reaction: &Reaction) -> Result<bool> {
        if reaction.emoji.is_empty() {
            self.conn().execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND sender_jid = ?2",
                params![reaction.message_id, reaction.sender_jid],
            )?;
            return Ok(false);
        }

        self.conn().execute(
            "INSERT INTO reactions (message_id, chat_jid, sender_jid, sender_name, emoji, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(message_id, sender_jid) DO UPDATE SET
                 emoji = excluded.emoji,
                 sender_name = excluded.sender_name,
                 timestamp = excluded.timestamp",
            params![
                reaction.message_id,
                reaction.chat_jid,
                reaction.sender_jid,
                reaction.sender_name,
                reaction.emoji,
                reaction.timestamp.timestamp(),
            ],
        )?;
        Ok(true)
    }

    /// Reactions on one message, oldest first.
    pub fn reactions_for_message(&self, message_id: &str) -> Result<Vec<Reaction>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT message_id, chat_jid, sender_jid, sender_name, emoji, timestamp
             FROM reactions
             WHERE message_id = ?1
             ORDER BY timestamp ASC",
        )?;

        let rows = stmt.query_map(params![message_id], row_to_reaction)?;
        let mut reactions = Vec::new();
        for row in rows {
            reactions.push(row?);
        }
        Ok(reactions)
    }
}

fn row_to_reaction(row: &Row<'_>) -> rusqlite::Result<Reaction> {
    let ts_secs: i64 = row.get(5)?;
    let timestamp: DateTime<Utc> = Utc
        .timestamp_opt(ts_secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    Ok(Reaction {
        message_id: row.get(0)?,
        chat_jid: row.get(1)?,
        sender_jid: row.get(2)?,
        sender_name: row.get(3)?,
        emoji: row.get(4)?,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn reaction(message_id: &str, sender: &str, emoji: &str) -> Reaction {
        Reaction {
            message_id: message_id.to_string(),
            chat_jid: "222@s.whatsapp.net".to_string(),
            sender_jid: sender.to_string(),
            sender_name: "Bob".to_string(),
            emoji: emoji.to_string(),
            timestamp: Utc.timestamp_opt(1_000, 0).unwrap(),
        }
    }

    #[test]
    fn one_active_reaction_per_sender() {
        let db = db();
        db.apply_reaction(&reaction("M1", "b@s.whatsapp.net", "👍")).unwrap();
        db.apply_reaction(&reaction("M1", "b@s.whatsapp.net", "❤️")).unwrap();
        db.apply_reaction(&reaction("M1", "c@s.whatsapp.net", "👍")).unwrap();

        let stored = db.reactions_for_message("M1").unwrap();
        assert_eq!(stored.len(), 2);
        let bob = stored
            .iter()
            .find(|r| r.sender_jid == "b@s.whatsapp.net")
            .unwrap();
        assert_eq!(bob.emoji, "❤️");
    }

    #[test]
    fn empty_emoji_removes_the_row() {
        let db = db();
        db.apply_reaction(&reaction("M1", "b@s.whatsapp.net", "👍")).unwrap();
        let kept = db.apply_reaction(&reaction("M1", "b@s.whatsapp.net", "")).unwrap();
        assert!(!kept);

        let stored = db.reactions_for_message("M1").unwrap();
        assert!(stored.iter().all(|r| r.sender_jid != "b@s.whatsapp.net"));
        assert!(stored.is_empty());
    }

    #[test]
    fn removal_of_absent_reaction_is_a_noop() {
        let db = db();
        assert!(!db.apply_reaction(&reaction("M1", "b@s.whatsapp.net", "")).unwrap());
    }
}
