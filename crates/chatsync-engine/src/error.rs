use thiserror::Error;

use crate::transport::TransportError;
use chatsync_store::StoreError;

/// Errors surfaced by top-level engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// No established identity in the session store.  Fatal for anything
    /// touching the transport; the fix is to (re-)authenticate.
    #[error("Not authenticated: no paired session; pair this device and retry")]
    NotAuthenticated,

    /// A name query matched nothing.
    #[error("No contact or chat matches {0:?}")]
    RecipientNotFound(String),

    /// A name query matched more than one identity.  Never auto-resolved;
    /// the candidate list is part of the error so the caller can pick a
    /// more specific query.
    #[error("Ambiguous recipient {query:?}; matches:\n  {}", candidates.join("\n  "))]
    AmbiguousRecipient {
        query: String,
        candidates: Vec<String>,
    },

    /// A stored JID failed to parse back into an address.
    #[error("Invalid identifier {0:?}")]
    InvalidJid(String),

    #[error("Message {0:?} not found")]
    MessageNotFound(String),

    /// `download-media` was invoked on a message without an attachment.
    #[error("Message {0:?} has no media attachment")]
    NoMedia(String),

    #[error("{0:?} is not a group chat")]
    NotAGroup(String),

    /// Transport failure (connect/send/download).  No automatic retry at
    /// this layer; retrying is a caller decision.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
