//! Domain model structs persisted in the local database.
//!
//! Every struct derives `Serialize` so it can be handed directly to the
//! CLI layer for rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Key material and location of an encrypted attachment, embedded in a
/// message row.  `local_path`, once set, names a file on disk keyed by the
/// plaintext hash so identical attachments converge on one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMeta {
    pub media_key: Vec<u8>,
    /// SHA-256 of the plaintext; the dedup key.
    pub file_sha256: Vec<u8>,
    /// SHA-256 of the ciphertext.
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
    pub remote_path: String,
    pub mime_type: String,
    pub local_path: Option<String>,
}

/// Quoted-message context embedded in a message row.  The quoted id may
/// reference a message that does not exist locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyContext {
    pub quoted_id: String,
    pub quoted_sender: String,
    /// Length-capped preview of the quoted text.
    pub quoted_preview: String,
}

/// One delivered or received message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Protocol-assigned, globally unique id.
    pub id: String,
    /// JID of the owning chat.
    pub chat_jid: String,
    /// JID of the sender (bare, no device suffix).
    pub sender_jid: String,
    /// Sender display-name snapshot at receive time.  May be empty.
    pub sender_name: String,
    pub timestamp: DateTime<Utc>,
    /// Plain-text body or media caption.
    pub body: Option<String>,
    /// Semantic media-type tag (`image`, `viewonce_video`, `deleted`, ...).
    pub media_type: Option<String>,
    pub is_from_me: bool,
    /// Monotonic: once true, no writer may set it back to false.
    pub is_read: bool,
    pub media: Option<MediaMeta>,
    pub reply: Option<ReplyContext>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation (individual or group).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub jid: String,
    /// Display name; empty until resolved.
    pub name: String,
    pub is_group: bool,
    /// Max timestamp over the chat's messages; only ever advanced.
    pub last_message_time: Option<DateTime<Utc>>,
    /// Explicit user "mark as unread" override.  Display-level only;
    /// independent of the derived unread count.
    pub marked_unread: bool,
}

/// A chat plus its derived unread count.  The count is never stored; it is
/// computed as `COUNT(messages WHERE !read AND !from_me)` on every listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    #[serde(flatten)]
    pub chat: Chat,
    pub unread_count: u32,
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// A known identity outside of message context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub jid: String,
    /// Address-book style full name.
    pub full_name: String,
    /// The contact's self-chosen display name.
    pub push_name: String,
}

// ---------------------------------------------------------------------------
// Reaction
// ---------------------------------------------------------------------------

/// An emoji annotation on a message.  At most one active reaction per
/// (message, sender) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: String,
    pub chat_jid: String,
    pub sender_jid: String,
    pub sender_name: String,
    pub emoji: String,
    pub timestamp: DateTime<Utc>,
}
