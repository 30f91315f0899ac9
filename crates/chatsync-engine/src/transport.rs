//! The transport collaborator boundary.
//!
//! The session/transport library that speaks the wire protocol (handshake,
//! encryption, multi-device pairing) lives outside this crate; the engine
//! consumes it through the [`Transport`] trait.  Events are delivered over
//! a bounded channel returned by [`Transport::connect`]; the sync
//! orchestrator is the single consumer, which is what keeps store writes
//! serial even though the transport's internals may be concurrent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

use chatsync_proto::event::{ChatMarker, Event};
use chatsync_proto::Jid;

/// Errors reported by a transport implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No paired device identity in the session store.
    #[error("not logged in: no paired device identity")]
    NotLoggedIn,

    /// The operation requires an active session.
    #[error("not connected")]
    NotConnected,

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("download failed: {0}")]
    Download(String),

    /// A server query (display name, participants, markers) failed.
    #[error("query failed: {0}")]
    Query(String),
}

/// Result of uploading raw bytes: everything a recipient needs to fetch
/// and decrypt the attachment.
#[derive(Debug, Clone, Default)]
pub struct UploadedMedia {
    pub remote_path: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
}

/// Parameters for a download-and-decrypt call, echoing stored metadata.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub remote_path: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
    /// Base media class (`image`, `video`, ...), some transports route
    /// downloads by it.
    pub media_class: String,
}

/// A prior message being quoted by an outgoing send.
#[derive(Debug, Clone)]
pub struct QuoteRef {
    pub message_id: String,
    pub chat: Jid,
    pub sender: Jid,
}

/// An outgoing attachment, already uploaded.
#[derive(Debug, Clone)]
pub struct OutgoingMedia {
    pub uploaded: UploadedMedia,
    pub mime_type: String,
    pub media_class: String,
    pub caption: String,
}

/// Acknowledgement for a sent message.
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Protocol-assigned id of the new message.
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// The session/transport collaborator.
///
/// Implementations must be safe to call from multiple tasks; the engine
/// itself funnels event handling through one consumer loop.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether a paired device identity exists in the session store.
    fn is_logged_in(&self) -> bool;

    /// The local account's own address, when paired.
    fn own_jid(&self) -> Option<Jid>;

    /// Establish the session and return the event stream.  The transport
    /// pushes every event kind over this one channel.
    async fn connect(&self) -> Result<mpsc::Receiver<Event>, TransportError>;

    /// Tear down the session.  Idempotent.
    async fn disconnect(&self);

    async fn send_text(
        &self,
        to: &Jid,
        text: &str,
        quote: Option<&QuoteRef>,
    ) -> Result<SentMessage, TransportError>;

    async fn send_media(
        &self,
        to: &Jid,
        media: &OutgoingMedia,
        quote: Option<&QuoteRef>,
    ) -> Result<SentMessage, TransportError>;

    /// Upload and encrypt raw bytes; returns the key material a recipient
    /// (or this store) needs to fetch them back.
    async fn upload(&self, bytes: &[u8], media_class: &str)
        -> Result<UploadedMedia, TransportError>;

    /// Download and decrypt an attachment.
    async fn download(&self, request: &DownloadRequest) -> Result<Vec<u8>, TransportError>;

    /// Fetch the display name of a contact or group.  `Ok(None)` when the
    /// server has no name for it.
    async fn display_name(&self, jid: &Jid) -> Result<Option<String>, TransportError>;

    /// List the participants of a group chat.
    async fn group_participants(&self, group: &Jid) -> Result<Vec<Jid>, TransportError>;

    /// Fetch the server-held read/unread markers for chats the user has
    /// explicitly toggled on another device.
    async fn chat_markers(&self) -> Result<Vec<ChatMarker>, TransportError>;

    /// Invalidate the pairing and wipe the session identity.
    async fn logout(&self) -> Result<(), TransportError>;
}
