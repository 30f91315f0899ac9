//! Event shapes delivered by the transport collaborator.
//!
//! The transport pushes these over a bounded channel; the sync orchestrator
//! is the single consumer.  Two of the shapes carry message content (live
//! push and history-sync pages) and are folded into one canonical record by
//! [`crate::normalize`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jid::Jid;
use crate::payload::MessagePayload;

/// A live push message, fully resolved by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMessage {
    /// Protocol-assigned, globally unique message id.
    pub id: String,
    /// The chat the message belongs to.
    pub chat: Jid,
    /// The concrete sender (participant for groups).
    pub sender: Jid,
    /// Sender's self-chosen display name at send time.  May be empty.
    pub push_name: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
    pub is_group: bool,
    pub payload: MessagePayload,
}

/// One message inside a history-sync conversation.  Sender resolution is
/// left to the normalizer; the raw key fields are carried as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    /// `key.participant`: set for group messages.
    pub participant: Option<Jid>,
    /// `key.remoteJid`: the remote party for direct chats.
    pub remote_jid: Option<Jid>,
    pub from_me: bool,
    /// Sender display name, when the sync carried one.
    pub push_name: String,
    /// Unix seconds; zero when the protocol omitted it.
    pub timestamp_secs: i64,
    pub payload: MessagePayload,
}

/// One conversation of a history-sync page: the full message list plus the
/// authoritative unread count (the protocol reports a count, not
/// per-message read flags, for historical data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConversation {
    pub chat: Jid,
    /// Display name, when known to the server.
    pub name: Option<String>,
    pub unread_count: u32,
    pub messages: Vec<HistoryMessage>,
}

/// One page of bulk history delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySyncPage {
    pub conversations: Vec<HistoryConversation>,
    /// Server-reported progress percentage, when present.
    pub progress: Option<u32>,
}

/// A contact display-name observation (push-name change, roster entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactUpdate {
    pub jid: Jid,
    pub full_name: Option<String>,
    pub push_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptKind {
    Delivered,
    Read,
}

/// A live delivery/read receipt for a set of message ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub chat: Jid,
    pub sender: Jid,
    pub message_ids: Vec<String>,
    pub kind: ReceiptKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerAction {
    Read,
    Unread,
}

/// A cross-device "mark chat as read/unread" action, either pushed live or
/// fetched from the server-held marker list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMarker {
    pub chat: Jid,
    pub action: MarkerAction,
}

/// Everything the transport can push at the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Message(Box<LiveMessage>),
    HistorySync(HistorySyncPage),
    Contact(ContactUpdate),
    Receipt(Receipt),
    ChatMarker(ChatMarker),
    /// Session is up and authenticated.
    Connected,
    /// The server invalidated this device's pairing.
    LoggedOut,
}
