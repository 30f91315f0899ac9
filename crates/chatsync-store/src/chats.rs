//! CRUD operations for [`Chat`] records.
//!
//! The unread count is never stored; [`Database::list_chats`] derives it
//! per row.  Display names are preserved across upserts: an upsert only
//! changes the name when it supplies a non-empty one.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Row};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Chat, ChatSummary};

impl Database {
    /// Upsert a chat.  `last_message_time` is combined with `MAX`, so
    /// out-of-order history arrival can never move it backwards.
    pub fn upsert_chat(
        &self,
        jid: &str,
        name: &str,
        is_group: bool,
        last_message_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chats (jid, name, is_group, last_message_time, marked_unread)
             VALUES (?1, ?2, ?3, ?4, 0)
             ON CONFLICT(jid) DO UPDATE SET
                 name = CASE WHEN excluded.name <> '' THEN excluded.name ELSE name END,
                 last_message_time = MAX(last_message_time, excluded.last_message_time)",
            params![
                jid,
                name,
                is_group as i32,
                last_message_time.map(|t| t.timestamp()).unwrap_or(0),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single chat by JID.
    pub fn get_chat(&self, jid: &str) -> Result<Chat> {
        self.conn()
            .query_row(
                "SELECT jid, name, is_group, last_message_time, marked_unread
                 FROM chats
                 WHERE jid = ?1",
                params![jid],
                row_to_chat,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List chats by recency, each with its derived unread count.
    pub fn list_chats(&self, limit: u32) -> Result<Vec<ChatSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT c.jid, c.name, c.is_group, c.last_message_time, c.marked_unread,
                    (SELECT COUNT(*) FROM messages m
                      WHERE m.chat_jid = c.jid AND m.is_read = 0 AND m.is_from_me = 0)
             FROM chats c
             ORDER BY c.last_message_time DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], |row| {
            Ok(ChatSummary {
                chat: row_to_chat(row)?,
                unread_count: row.get::<_, i64>(5)? as u32,
            })
        })?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    /// Set or clear the explicit "marked as unread" override.
    pub fn set_marked_unread(&self, jid: &str, marked: bool) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE chats SET marked_unread = ?2 WHERE jid = ?1",
            params![jid, marked as i32],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Chats whose display name has not been resolved yet, most recent
    /// first (those are the ones a user will actually look at).
    pub fn chats_missing_name(&self, limit: u32) -> Result<Vec<Chat>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT jid, name, is_group, last_message_time, marked_unread
             FROM chats
             WHERE name = ''
             ORDER BY last_message_time DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], row_to_chat)?;
        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    /// Case-insensitive substring search over the names of individual
    /// (non-group) chats.  Used by recipient resolution.
    pub fn search_direct_chats(&self, query: &str) -> Result<Vec<Chat>> {
        self.search_chats_inner(query, true)
    }

    /// Like [`Self::search_direct_chats`] but includes groups.  Used when
    /// resolving a chat for listing rather than for sending.
    pub fn search_chats(&self, query: &str) -> Result<Vec<Chat>> {
        self.search_chats_inner(query, false)
    }

    fn search_chats_inner(&self, query: &str, direct_only: bool) -> Result<Vec<Chat>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT jid, name, is_group, last_message_time, marked_unread
             FROM chats
             WHERE (?2 = 0 OR is_group = 0)
               AND name <> '' AND name LIKE '%' || ?1 || '%'
             ORDER BY name ASC",
        )?;

        let rows = stmt.query_map(params![query, direct_only as i32], row_to_chat)?;
        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }
}

/// Map a `rusqlite::Row` to a [`Chat`].
fn row_to_chat(row: &Row<'_>) -> rusqlite::Result<Chat> {
    let last_secs: i64 = row.get(3)?;
    let last_message_time = if last_secs > 0 {
        Utc.timestamp_opt(last_secs, 0).single()
    } else {
        None
    };

    Ok(Chat {
        jid: row.get(0)?,
        name: row.get(1)?,
        is_group: row.get::<_, i32>(2)? != 0,
        last_message_time,
        marked_unread: row.get::<_, i32>(4)? != 0,
    })
}
