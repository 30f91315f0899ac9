//! CRUD and reconciliation for [`Message`] rows.
//!
//! The upsert distinguishes live saves (may overwrite text/media, which is
//! how protocol edits land) from historical saves (write-once text/media,
//! only null media fields get filled).  The read flag is monotonic under
//! both: every path combines with `MAX`, so no writer can regress a message
//! from read back to unread.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{MediaMeta, Message, ReplyContext};

/// Maximum characters kept of a quoted-text preview.
const QUOTED_PREVIEW_MAX: usize = 120;

/// Where a message save came from.  Live redelivery refreshes text/media
/// (edits); historical redelivery never overwrites present content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Live,
    History,
}

const MESSAGE_COLUMNS: &str = "id, chat_jid, sender_jid, sender_name, timestamp, body, media_type,
     is_from_me, is_read, media_key, file_sha256, file_enc_sha256, file_length,
     remote_path, mime_type, local_path, quoted_id, quoted_sender, quoted_preview";

impl Database {
    /// Idempotent message upsert.  Also advances the owning chat's
    /// `last_message_time` (max-combine, never reduced by out-of-order
    /// history arrival).
    pub fn upsert_message(&self, message: &Message, mode: SaveMode) -> Result<()> {
        let media = message.media.clone().unwrap_or_default();
        let reply = message.reply.clone().unwrap_or_default();
        let has_media = message.media.is_some();
        let has_reply = message.reply.is_some();

        let on_conflict = match mode {
            // An edit replaces text and media wholesale; the already
            // downloaded file path survives unless the edit supplies one.
            SaveMode::Live => {
                "body = excluded.body,
                 media_type = excluded.media_type,
                 media_key = excluded.media_key,
                 file_sha256 = excluded.file_sha256,
                 file_enc_sha256 = excluded.file_enc_sha256,
                 file_length = excluded.file_length,
                 remote_path = excluded.remote_path,
                 mime_type = excluded.mime_type,
                 local_path = COALESCE(excluded.local_path, local_path),
                 quoted_id = COALESCE(excluded.quoted_id, quoted_id),
                 quoted_sender = COALESCE(excluded.quoted_sender, quoted_sender),
                 quoted_preview = COALESCE(excluded.quoted_preview, quoted_preview),
                 sender_name = CASE WHEN excluded.sender_name <> '' THEN excluded.sender_name ELSE sender_name END,
                 is_read = MAX(is_read, excluded.is_read)"
            }
            // History only ever fills holes and advances the read flag.
            SaveMode::History => {
                "body = COALESCE(body, excluded.body),
                 media_type = COALESCE(media_type, excluded.media_type),
                 media_key = COALESCE(media_key, excluded.media_key),
                 file_sha256 = COALESCE(file_sha256, excluded.file_sha256),
                 file_enc_sha256 = COALESCE(file_enc_sha256, excluded.file_enc_sha256),
                 file_length = COALESCE(file_length, excluded.file_length),
                 remote_path = COALESCE(remote_path, excluded.remote_path),
                 mime_type = COALESCE(mime_type, excluded.mime_type),
                 local_path = COALESCE(local_path, excluded.local_path),
                 quoted_id = COALESCE(quoted_id, excluded.quoted_id),
                 quoted_sender = COALESCE(quoted_sender, excluded.quoted_sender),
                 quoted_preview = COALESCE(quoted_preview, excluded.quoted_preview),
                 sender_name = CASE WHEN sender_name = '' THEN excluded.sender_name ELSE sender_name END,
                 is_read = MAX(is_read, excluded.is_read)"
            }
        };

        let sql = format!(
            "INSERT INTO messages ({MESSAGE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
             ON CONFLICT(id) DO UPDATE SET {on_conflict}"
        );

        self.conn().execute(
            &sql,
            params![
                message.id,
                message.chat_jid,
                message.sender_jid,
                message.sender_name,
                message.timestamp.timestamp(),
                message.body,
                message.media_type,
                message.is_from_me as i32,
                message.is_read as i32,
                has_media.then(|| hex::encode(&media.media_key)),
                has_media.then(|| hex::encode(&media.file_sha256)),
                has_media.then(|| hex::encode(&media.file_enc_sha256)),
                has_media.then_some(media.file_length as i64),
                has_media.then_some(media.remote_path.as_str()),
                has_media.then_some(media.mime_type.as_str()),
                media.local_path,
                has_reply.then_some(reply.quoted_id.as_str()),
                has_reply.then_some(reply.quoted_sender.as_str()),
                has_reply.then(|| truncate_chars(&reply.quoted_preview, QUOTED_PREVIEW_MAX)),
            ],
        )?;

        self.upsert_chat(
            &message.chat_jid,
            "",
            message.chat_jid.ends_with("@g.us"),
            Some(message.timestamp),
        )?;

        Ok(())
    }

    /// Apply a protocol-level revoke: rewrite the target message to a
    /// `deleted` tombstone with replacement text and clear its media.
    /// Returns `false` when the target is not stored locally.
    pub fn apply_revoke(&self, message_id: &str, placeholder: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET
                 body = ?2, media_type = 'deleted',
                 media_key = NULL, file_sha256 = NULL, file_enc_sha256 = NULL,
                 file_length = NULL, remote_path = NULL, mime_type = NULL,
                 local_path = NULL
             WHERE id = ?1",
            params![message_id, placeholder],
        )?;
        Ok(affected > 0)
    }

    pub fn get_message(&self, id: &str) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Messages of one chat, newest first.
    pub fn list_messages(&self, chat_jid: &str, limit: u32, offset: u32) -> Result<Vec<Message>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_jid = ?1
             ORDER BY timestamp DESC
             LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(params![chat_jid, limit, offset], row_to_message)?;
        collect(rows)
    }

    /// Unread incoming messages, optionally restricted to one chat.
    pub fn list_unread(&self, chat_jid: Option<&str>, limit: u32) -> Result<Vec<Message>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE is_read = 0 AND is_from_me = 0
               AND (?1 IS NULL OR chat_jid = ?1)
             ORDER BY timestamp DESC
             LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![chat_jid, limit], row_to_message)?;
        collect(rows)
    }

    /// Free-text substring search over message bodies, newest first.
    pub fn search_messages(
        &self,
        query: &str,
        chat_jid: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE body LIKE '%' || ?1 || '%'
               AND (?2 IS NULL OR chat_jid = ?2)
             ORDER BY timestamp DESC
             LIMIT ?3"
        ))?;

        let rows = stmt.query_map(params![query, chat_jid, limit], row_to_message)?;
        collect(rows)
    }

    /// Mark the given message ids read.  Monotonic; already-read rows are
    /// untouched.  Returns the number of rows that changed.
    pub fn mark_messages_read(&self, ids: &[String]) -> Result<usize> {
        let conn = self.conn();
        let mut changed = 0;
        for id in ids {
            changed += conn.execute(
                "UPDATE messages SET is_read = 1 WHERE id = ?1 AND is_read = 0",
                params![id],
            )?;
        }
        Ok(changed)
    }

    /// Mark every message in a chat read and clear the chat-level
    /// "marked as unread" override.
    pub fn mark_chat_read(&self, chat_jid: &str) -> Result<usize> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE messages SET is_read = 1 WHERE chat_jid = ?1 AND is_read = 0",
            params![chat_jid],
        )?;
        conn.execute(
            "UPDATE chats SET marked_unread = 0 WHERE jid = ?1",
            params![chat_jid],
        )?;
        Ok(changed)
    }

    /// Record the on-disk path of a downloaded attachment.
    pub fn set_media_local_path(&self, message_id: &str, local_path: &str) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE messages SET local_path = ?2 WHERE id = ?1",
            params![message_id, local_path],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Whether a message exists locally.
    pub fn has_message(&self, id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM messages WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn collect(
    rows: impl Iterator<Item = rusqlite::Result<Message>>,
) -> Result<Vec<Message>> {
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let ts_secs: i64 = row.get(4)?;
    let timestamp: DateTime<Utc> = Utc
        .timestamp_opt(ts_secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let media_key: Option<String> = row.get(9)?;
    let file_sha256: Option<String> = row.get(10)?;
    let file_enc_sha256: Option<String> = row.get(11)?;
    let file_length: Option<i64> = row.get(12)?;
    let remote_path: Option<String> = row.get(13)?;
    let mime_type: Option<String> = row.get(14)?;
    let local_path: Option<String> = row.get(15)?;

    let decode = |col: usize, value: &Option<String>| -> rusqlite::Result<Vec<u8>> {
        match value {
            Some(s) => hex::decode(s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    col,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            }),
            None => Ok(Vec::new()),
        }
    };

    // A row has media iff any of the key-material columns is populated.
    let media = if file_sha256.is_some() || remote_path.is_some() {
        Some(MediaMeta {
            media_key: decode(9, &media_key)?,
            file_sha256: decode(10, &file_sha256)?,
            file_enc_sha256: decode(11, &file_enc_sha256)?,
            file_length: file_length.unwrap_or(0) as u64,
            remote_path: remote_path.unwrap_or_default(),
            mime_type: mime_type.unwrap_or_default(),
            local_path,
        })
    } else {
        None
    };

    let quoted_id: Option<String> = row.get(16)?;
    let reply = quoted_id.map(|quoted_id| {
        Ok::<_, rusqlite::Error>(ReplyContext {
            quoted_id,
            quoted_sender: row.get::<_, Option<String>>(17)?.unwrap_or_default(),
            quoted_preview: row.get::<_, Option<String>>(18)?.unwrap_or_default(),
        })
    });
    let reply = reply.transpose()?;

    Ok(Message {
        id: row.get(0)?,
        chat_jid: row.get(1)?,
        sender_jid: row.get(2)?,
        sender_name: row.get(3)?,
        timestamp,
        body: row.get(5)?,
        media_type: row.get(6)?,
        is_from_me: row.get::<_, i32>(7)? != 0,
        is_read: row.get::<_, i32>(8)? != 0,
        media,
        reply,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn message(id: &str, ts: i64) -> Message {
        Message {
            id: id.to_string(),
            chat_jid: "222@s.whatsapp.net".to_string(),
            sender_jid: "222@s.whatsapp.net".to_string(),
            sender_name: "Bob".to_string(),
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            body: Some("hello".to_string()),
            media_type: None,
            is_from_me: false,
            is_read: false,
            media: None,
            reply: None,
        }
    }

    fn media_message(id: &str, ts: i64) -> Message {
        let mut m = message(id, ts);
        m.media_type = Some("image".to_string());
        m.media = Some(MediaMeta {
            media_key: vec![7; 32],
            file_sha256: vec![1; 32],
            file_enc_sha256: vec![2; 32],
            file_length: 2048,
            remote_path: "/v/abc".to_string(),
            mime_type: "image/jpeg".to_string(),
            local_path: None,
        });
        m
    }

    #[test]
    fn round_trip_plain_message() {
        let db = db();
        db.upsert_message(&message("M1", 100), SaveMode::Live).unwrap();

        let stored = db.get_message("M1").unwrap();
        assert_eq!(stored.body.as_deref(), Some("hello"));
        assert_eq!(stored.timestamp.timestamp(), 100);
        assert!(stored.media.is_none());
    }

    #[test]
    fn round_trip_media_and_reply() {
        let db = db();
        let mut m = media_message("M1", 100);
        m.reply = Some(ReplyContext {
            quoted_id: "M0".to_string(),
            quoted_sender: "111@s.whatsapp.net".to_string(),
            quoted_preview: "earlier".to_string(),
        });
        db.upsert_message(&m, SaveMode::Live).unwrap();

        let stored = db.get_message("M1").unwrap();
        let media = stored.media.unwrap();
        assert_eq!(media.file_sha256, vec![1; 32]);
        assert_eq!(media.file_length, 2048);
        assert_eq!(stored.reply.unwrap().quoted_id, "M0");
    }

    #[test]
    fn read_flag_never_regresses() {
        let db = db();
        let mut m = message("M1", 100);
        m.is_read = true;
        db.upsert_message(&m, SaveMode::Live).unwrap();

        // Redelivery claiming unread, both live and historical.
        m.is_read = false;
        db.upsert_message(&m, SaveMode::Live).unwrap();
        db.upsert_message(&m, SaveMode::History).unwrap();

        assert!(db.get_message("M1").unwrap().is_read);
    }

    #[test]
    fn live_redelivery_overwrites_text() {
        let db = db();
        db.upsert_message(&message("M1", 100), SaveMode::Live).unwrap();

        let mut edited = message("M1", 100);
        edited.body = Some("hello, edited".to_string());
        db.upsert_message(&edited, SaveMode::Live).unwrap();

        assert_eq!(
            db.get_message("M1").unwrap().body.as_deref(),
            Some("hello, edited")
        );
    }

    #[test]
    fn historical_redelivery_is_write_once() {
        let db = db();
        db.upsert_message(&message("M1", 100), SaveMode::History).unwrap();

        let mut replay = message("M1", 100);
        replay.body = Some("different text".to_string());
        db.upsert_message(&replay, SaveMode::History).unwrap();

        assert_eq!(db.get_message("M1").unwrap().body.as_deref(), Some("hello"));
    }

    #[test]
    fn historical_redelivery_fills_missing_media() {
        let db = db();
        let mut bare = message("M1", 100);
        bare.media_type = Some("image".to_string());
        bare.body = None;
        db.upsert_message(&bare, SaveMode::History).unwrap();
        assert!(db.get_message("M1").unwrap().media.is_none());

        db.upsert_message(&media_message("M1", 100), SaveMode::History)
            .unwrap();
        let media = db.get_message("M1").unwrap().media.unwrap();
        assert_eq!(media.remote_path, "/v/abc");
    }

    #[test]
    fn chat_last_message_time_is_max_over_messages() {
        let db = db();
        db.upsert_message(&message("M2", 200), SaveMode::Live).unwrap();
        // Out-of-order history arrival must not reduce it.
        db.upsert_message(&message("M1", 100), SaveMode::History).unwrap();

        let chat = db.get_chat("222@s.whatsapp.net").unwrap();
        assert_eq!(chat.last_message_time.unwrap().timestamp(), 200);
    }

    #[test]
    fn revoke_rewrites_to_tombstone() {
        let db = db();
        db.upsert_message(&media_message("M1", 100), SaveMode::Live).unwrap();

        assert!(db.apply_revoke("M1", "[Message deleted]").unwrap());

        let stored = db.get_message("M1").unwrap();
        assert_eq!(stored.media_type.as_deref(), Some("deleted"));
        assert_eq!(stored.body.as_deref(), Some("[Message deleted]"));
        assert!(stored.media.is_none());

        // Revoking an unknown message is a no-op.
        assert!(!db.apply_revoke("M9", "[Message deleted]").unwrap());
    }

    #[test]
    fn unread_filter_excludes_own_messages() {
        let db = db();
        db.upsert_message(&message("M1", 100), SaveMode::Live).unwrap();
        let mut own = message("M2", 200);
        own.is_from_me = true;
        db.upsert_message(&own, SaveMode::Live).unwrap();

        let unread = db.list_unread(None, 50).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "M1");
    }

    #[test]
    fn search_matches_substring() {
        let db = db();
        db.upsert_message(&message("M1", 100), SaveMode::Live).unwrap();
        let mut other = message("M2", 200);
        other.body = Some("totally unrelated".to_string());
        db.upsert_message(&other, SaveMode::Live).unwrap();

        let hits = db.search_messages("hell", None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "M1");
    }

    #[test]
    fn mark_chat_read_clears_override() {
        let db = db();
        db.upsert_message(&message("M1", 100), SaveMode::Live).unwrap();
        db.set_marked_unread("222@s.whatsapp.net", true).unwrap();

        let changed = db.mark_chat_read("222@s.whatsapp.net").unwrap();
        assert_eq!(changed, 1);
        assert!(db.get_message("M1").unwrap().is_read);
        assert!(!db.get_chat("222@s.whatsapp.net").unwrap().marked_unread);
    }

    #[test]
    fn quoted_preview_is_length_capped() {
        let db = db();
        let mut m = message("M1", 100);
        m.reply = Some(ReplyContext {
            quoted_id: "M0".to_string(),
            quoted_sender: "111@s.whatsapp.net".to_string(),
            quoted_preview: "x".repeat(500),
        });
        db.upsert_message(&m, SaveMode::Live).unwrap();

        let preview = db.get_message("M1").unwrap().reply.unwrap().quoted_preview;
        assert_eq!(preview.chars().count(), QUOTED_PREVIEW_MAX);
    }
}
