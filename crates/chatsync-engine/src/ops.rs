//! Top-level library operations, one per CLI command.
//!
//! Each operation takes a [`SyncContext`] and returns plain serializable
//! data; rendering belongs to the caller.  Operations that touch the
//! transport fail fast with [`EngineError::NotAuthenticated`] when no
//! paired identity exists.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use chatsync_proto::content::kind;
use chatsync_proto::Jid;
use chatsync_store::{
    ChatSummary, MediaMeta, Message, ReplyContext, SaveMode, StoreError, StoreStats,
};
use chrono::{DateTime, Utc};

use crate::context::SyncContext;
use crate::error::{EngineError, Result};
use crate::media;
use crate::resolver;
use crate::sync::{self, SyncReport};
use crate::transport::{OutgoingMedia, QuoteRef};

/// Acknowledgement returned by the send operations.
#[derive(Debug, Clone, Serialize)]
pub struct SendResult {
    pub message_id: String,
    pub chat_jid: String,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot returned by [`status`].
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub logged_in: bool,
    pub own_jid: Option<String>,
    pub store_path: Option<String>,
    pub store: StoreStats,
}

/// Send a text message.  `recipient` is a contact/chat name or a literal
/// JID; `quote_id` optionally names an earlier message to reply to.
pub async fn send_text(
    ctx: &SyncContext,
    recipient: &str,
    text: &str,
    quote_id: Option<&str>,
) -> Result<SendResult> {
    ctx.require_login()?;
    let to = resolver::resolve_recipient(&ctx.db, recipient)?;
    let quote = quote_id.map(|id| load_quote(ctx, id)).transpose()?;

    let sent = ctx
        .transport
        .send_text(&to, text, quote.as_ref().map(|(q, _)| q))
        .await?;
    info!(to = %to, id = %sent.id, "sent text message");

    let message = own_message(ctx, &sent.id, &to, sent.timestamp)?;
    ctx.db.upsert_message(
        &Message {
            body: Some(text.to_string()),
            reply: quote.map(|(_, reply)| reply),
            ..message
        },
        SaveMode::Live,
    )?;

    Ok(SendResult {
        message_id: sent.id,
        chat_jid: to.to_string(),
        timestamp: sent.timestamp,
    })
}

/// Upload a local file and send it as a media message.  The uploaded bytes
/// are also copied into the media directory under their content hash, so
/// the attachment is immediately resolvable locally.
pub async fn send_file(
    ctx: &SyncContext,
    recipient: &str,
    path: &Path,
    caption: Option<&str>,
) -> Result<SendResult> {
    ctx.require_login()?;
    let to = resolver::resolve_recipient(&ctx.db, recipient)?;

    let bytes = std::fs::read(path)?;
    let (mime_type, media_class) = classify_file(path);
    let uploaded = ctx.transport.upload(&bytes, media_class).await?;

    let outgoing = OutgoingMedia {
        uploaded: uploaded.clone(),
        mime_type: mime_type.to_string(),
        media_class: media_class.to_string(),
        caption: caption.unwrap_or("").to_string(),
    };
    let sent = ctx.transport.send_media(&to, &outgoing, None).await?;
    info!(to = %to, id = %sent.id, class = media_class, "sent media message");

    // Keep a local copy under the content-addressed name.
    std::fs::create_dir_all(&ctx.config.media_dir)?;
    let local = ctx.config.media_dir.join(format!(
        "{}.{}",
        hex::encode(&uploaded.file_sha256),
        media::extension_for(mime_type, media_class)
    ));
    if !local.exists() {
        std::fs::copy(path, &local)?;
    }

    let message = own_message(ctx, &sent.id, &to, sent.timestamp)?;
    ctx.db.upsert_message(
        &Message {
            body: caption.map(str::to_string),
            media_type: Some(media_class.to_string()),
            media: Some(MediaMeta {
                media_key: uploaded.media_key,
                file_sha256: uploaded.file_sha256,
                file_enc_sha256: uploaded.file_enc_sha256,
                file_length: uploaded.file_length,
                remote_path: uploaded.remote_path,
                mime_type: mime_type.to_string(),
                local_path: Some(local.to_string_lossy().into_owned()),
            }),
            ..message
        },
        SaveMode::Live,
    )?;

    Ok(SendResult {
        message_id: sent.id,
        chat_jid: to.to_string(),
        timestamp: sent.timestamp,
    })
}

/// Run one full sync cycle (no external interrupt).
pub async fn sync(ctx: &SyncContext) -> Result<SyncReport> {
    let (_tx, rx) = watch::channel(false);
    sync::run_sync(ctx, rx).await
}

/// Messages of one chat, newest first.  `chat` resolves names and JIDs.
pub fn list_messages(
    ctx: &SyncContext,
    chat: &str,
    limit: u32,
    offset: u32,
) -> Result<Vec<Message>> {
    let jid = resolver::resolve_chat(&ctx.db, chat)?;
    Ok(ctx.db.list_messages(&jid.to_string(), limit, offset)?)
}

/// Chats by recency, each with its derived unread count.
pub fn list_chats(ctx: &SyncContext, limit: u32) -> Result<Vec<ChatSummary>> {
    Ok(ctx.db.list_chats(limit)?)
}

/// Unread incoming messages, optionally restricted to one chat.
pub fn list_unread(ctx: &SyncContext, chat: Option<&str>, limit: u32) -> Result<Vec<Message>> {
    let jid = chat
        .map(|c| resolver::resolve_chat(&ctx.db, c))
        .transpose()?
        .map(|j| j.to_string());
    Ok(ctx.db.list_unread(jid.as_deref(), limit)?)
}

/// Free-text search over message bodies, optionally scoped to one chat.
pub fn search(
    ctx: &SyncContext,
    query: &str,
    chat: Option<&str>,
    limit: u32,
) -> Result<Vec<Message>> {
    let jid = chat
        .map(|c| resolver::resolve_chat(&ctx.db, c))
        .transpose()?
        .map(|j| j.to_string());
    Ok(ctx.db.search_messages(query, jid.as_deref(), limit)?)
}

/// Members of a group chat, queried from the server.
pub async fn list_participants(ctx: &SyncContext, group: &str) -> Result<Vec<Jid>> {
    ctx.require_login()?;
    let jid = resolver::resolve_chat(&ctx.db, group)?;
    if !jid.is_group() {
        return Err(EngineError::NotAGroup(jid.to_string()));
    }
    Ok(ctx.transport.group_participants(&jid).await?)
}

/// Resolve display names for chats still missing one.  Returns how many
/// were resolved.
pub async fn refresh_names(ctx: &SyncContext) -> Result<u32> {
    ctx.require_login()?;
    sync::backfill_names(ctx).await
}

/// Mark messages read.  With explicit ids, only those; otherwise the whole
/// resolved chat.  Returns the number of messages that changed state.
pub fn mark_read(ctx: &SyncContext, chat: &str, ids: &[String]) -> Result<usize> {
    if ids.is_empty() {
        let jid = resolver::resolve_chat(&ctx.db, chat)?;
        Ok(ctx.db.mark_chat_read(&jid.to_string())?)
    } else {
        Ok(ctx.db.mark_messages_read(ids)?)
    }
}

/// Fetch (or reuse) the local file for a message's attachment.
/// `Ok(None)` means the attachment exists but cannot be downloaded.
pub async fn download_media(ctx: &SyncContext, message_id: &str) -> Result<Option<PathBuf>> {
    media::resolve_media(ctx, message_id).await
}

/// Session and store snapshot.  Works without a paired identity.
pub fn status(ctx: &SyncContext) -> Result<StatusReport> {
    Ok(StatusReport {
        logged_in: ctx.transport.is_logged_in(),
        own_jid: ctx.transport.own_jid().map(|j| j.to_string()),
        store_path: ctx
            .db
            .path()
            .map(|p| p.to_string_lossy().into_owned()),
        store: ctx.db.stats()?,
    })
}

/// Invalidate the pairing and wipe the session identity.  The local store
/// is untouched; history remains queryable offline.
pub async fn logout(ctx: &SyncContext) -> Result<()> {
    ctx.require_login()?;
    ctx.transport.logout().await?;
    info!("logged out; local store retained");
    Ok(())
}

/// Skeleton row for a message this account just sent.
fn own_message(
    ctx: &SyncContext,
    id: &str,
    to: &Jid,
    timestamp: DateTime<Utc>,
) -> Result<Message> {
    let own = ctx
        .transport
        .own_jid()
        .ok_or(EngineError::NotAuthenticated)?;
    Ok(Message {
        id: id.to_string(),
        chat_jid: to.to_string(),
        sender_jid: own.bare().to_string(),
        sender_name: String::new(),
        timestamp,
        body: None,
        media_type: None,
        is_from_me: true,
        is_read: true,
        media: None,
        reply: None,
    })
}

/// Quote reference plus the reply context stored on the outgoing row.
fn load_quote(ctx: &SyncContext, quote_id: &str) -> Result<(QuoteRef, ReplyContext)> {
    let quoted = ctx.db.get_message(quote_id).map_err(|e| match e {
        StoreError::NotFound => EngineError::MessageNotFound(quote_id.to_string()),
        other => EngineError::Store(other),
    })?;

    let chat: Jid = quoted
        .chat_jid
        .parse()
        .map_err(|_| EngineError::InvalidJid(quoted.chat_jid.clone()))?;
    let sender: Jid = quoted
        .sender_jid
        .parse()
        .map_err(|_| EngineError::InvalidJid(quoted.sender_jid.clone()))?;

    Ok((
        QuoteRef {
            message_id: quoted.id.clone(),
            chat,
            sender: sender.clone(),
        },
        ReplyContext {
            quoted_id: quoted.id,
            quoted_sender: sender.to_string(),
            quoted_preview: quoted.body.unwrap_or_default(),
        },
    ))
}

/// MIME type and media class inferred from a file extension.
fn classify_file(path: &Path) -> (&'static str, &'static str) {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => ("image/jpeg", kind::IMAGE),
        "png" => ("image/png", kind::IMAGE),
        "gif" => ("image/gif", kind::IMAGE),
        "webp" => ("image/webp", kind::IMAGE),
        "mp4" => ("video/mp4", kind::VIDEO),
        "3gp" => ("video/3gpp", kind::VIDEO),
        "ogg" | "opus" => ("audio/ogg", kind::AUDIO),
        "mp3" => ("audio/mpeg", kind::AUDIO),
        "m4a" => ("audio/mp4", kind::AUDIO),
        "wav" => ("audio/wav", kind::AUDIO),
        "pdf" => ("application/pdf", kind::DOCUMENT),
        "txt" => ("text/plain", kind::DOCUMENT),
        _ => ("application/octet-stream", kind::DOCUMENT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_context, FakeTransport};
    use crate::transport::Transport;
    use chatsync_store::Contact;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn contact(jid: &str, name: &str) -> Contact {
        Contact {
            jid: jid.to_string(),
            full_name: name.to_string(),
            push_name: String::new(),
        }
    }

    #[tokio::test]
    async fn send_text_stores_own_read_message() {
        let transport = Arc::new(FakeTransport::new());
        let (ctx, _dir) = test_context(transport.clone());
        ctx.db.upsert_contact(&contact("222@s.whatsapp.net", "Bob")).unwrap();

        let result = send_text(&ctx, "Bob", "hello there", None).await.unwrap();
        assert_eq!(result.chat_jid, "222@s.whatsapp.net");

        let stored = ctx.db.get_message(&result.message_id).unwrap();
        assert!(stored.is_from_me);
        assert!(stored.is_read);
        assert_eq!(stored.body.as_deref(), Some("hello there"));
        assert_eq!(stored.sender_jid, "111@s.whatsapp.net");

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "hello there");
    }

    #[tokio::test]
    async fn send_text_with_quote_carries_reply_context() {
        let transport = Arc::new(FakeTransport::new());
        let (ctx, _dir) = test_context(transport.clone());
        ctx.db.upsert_contact(&contact("222@s.whatsapp.net", "Bob")).unwrap();

        let mut quoted = crate::testutil::media_message("Q1", "/v/q", vec![5; 32]);
        quoted.media = None;
        quoted.media_type = None;
        quoted.body = Some("dinner at eight?".to_string());
        ctx.db.upsert_message(&quoted, SaveMode::Live).unwrap();

        let result = send_text(&ctx, "Bob", "yes!", Some("Q1")).await.unwrap();

        let stored = ctx.db.get_message(&result.message_id).unwrap();
        let reply = stored.reply.unwrap();
        assert_eq!(reply.quoted_id, "Q1");
        assert_eq!(reply.quoted_preview, "dinner at eight?");
        assert_eq!(
            transport.sent.lock().unwrap()[0].quoted_id.as_deref(),
            Some("Q1")
        );
    }

    #[tokio::test]
    async fn send_text_unknown_quote_fails() {
        let transport = Arc::new(FakeTransport::new());
        let (ctx, _dir) = test_context(transport);
        ctx.db.upsert_contact(&contact("222@s.whatsapp.net", "Bob")).unwrap();

        assert!(matches!(
            send_text(&ctx, "Bob", "x", Some("NOPE")).await,
            Err(EngineError::MessageNotFound(_))
        ));
    }

    #[tokio::test]
    async fn send_file_stores_media_with_local_copy() {
        let transport = Arc::new(FakeTransport::new());
        let (ctx, dir) = test_context(transport.clone());
        ctx.db.upsert_contact(&contact("222@s.whatsapp.net", "Bob")).unwrap();

        let source = dir.path().join("sunset.jpg");
        std::fs::write(&source, b"jpeg-bytes").unwrap();

        let result = send_file(&ctx, "Bob", &source, Some("look"))
            .await
            .unwrap();

        let stored = ctx.db.get_message(&result.message_id).unwrap();
        assert_eq!(stored.media_type.as_deref(), Some("image"));
        assert_eq!(stored.body.as_deref(), Some("look"));
        let media = stored.media.unwrap();
        assert_eq!(media.mime_type, "image/jpeg");
        let local = media.local_path.unwrap();
        assert_eq!(std::fs::read(&local).unwrap(), b"jpeg-bytes");
        assert!(local.ends_with(".jpg"));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].media_class.as_deref(), Some("image"));
        assert_eq!(sent[0].text, "look");
    }

    #[tokio::test]
    async fn sends_require_authentication() {
        let transport = Arc::new(FakeTransport::new());
        transport.logged_in.store(false, Ordering::SeqCst);
        let (ctx, _dir) = test_context(transport);

        assert!(matches!(
            send_text(&ctx, "Bob", "x", None).await,
            Err(EngineError::NotAuthenticated)
        ));
        assert!(matches!(
            refresh_names(&ctx).await,
            Err(EngineError::NotAuthenticated)
        ));
    }

    #[test]
    fn mark_read_whole_chat_by_name() {
        let transport = Arc::new(FakeTransport::new());
        let (ctx, _dir) = test_context(transport);
        ctx.db.upsert_chat("222@s.whatsapp.net", "Bob", false, None).unwrap();

        let mut incoming = crate::testutil::media_message("M1", "/v/a", vec![1; 32]);
        incoming.media = None;
        incoming.media_type = None;
        ctx.db.upsert_message(&incoming, SaveMode::Live).unwrap();

        let changed = mark_read(&ctx, "Bob", &[]).unwrap();
        assert_eq!(changed, 1);
        assert!(ctx.db.get_message("M1").unwrap().is_read);
    }

    #[tokio::test]
    async fn list_participants_rejects_direct_chats() {
        let transport = Arc::new(FakeTransport::new());
        transport.participants.lock().unwrap().insert(
            "g1@g.us".to_string(),
            vec![Jid::user_jid("111"), Jid::user_jid("222")],
        );
        let (ctx, _dir) = test_context(transport);
        ctx.db.upsert_chat("g1@g.us", "Friends", true, None).unwrap();
        ctx.db.upsert_chat("222@s.whatsapp.net", "Bob", false, None).unwrap();

        let members = list_participants(&ctx, "Friends").await.unwrap();
        assert_eq!(members.len(), 2);

        assert!(matches!(
            list_participants(&ctx, "Bob").await,
            Err(EngineError::NotAGroup(_))
        ));
    }

    #[test]
    fn status_reports_counts_without_login() {
        let transport = Arc::new(FakeTransport::new());
        transport.logged_in.store(false, Ordering::SeqCst);
        let (ctx, _dir) = test_context(transport);
        ctx.db.upsert_contact(&contact("222@s.whatsapp.net", "Bob")).unwrap();

        let report = status(&ctx).unwrap();
        assert!(!report.logged_in);
        assert!(report.own_jid.is_none());
        assert_eq!(report.store.contacts, 1);
        assert_eq!(report.store.messages, 0);
    }

    #[tokio::test]
    async fn logout_invalidates_the_session() {
        let transport = Arc::new(FakeTransport::new());
        let (ctx, _dir) = test_context(transport.clone());

        logout(&ctx).await.unwrap();
        assert_eq!(transport.logout_calls.load(Ordering::SeqCst), 1);
        assert!(!transport.is_logged_in());

        // Store data survives a logout.
        assert!(status(&ctx).is_ok());
    }

    #[test]
    fn file_classification_by_extension() {
        assert_eq!(classify_file(Path::new("a.JPG")), ("image/jpeg", "image"));
        assert_eq!(classify_file(Path::new("a.pdf")), ("application/pdf", "document"));
        assert_eq!(
            classify_file(Path::new("mystery")),
            ("application/octet-stream", "document")
        );
    }
}
