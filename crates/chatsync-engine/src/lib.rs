//! # chatsync-engine
//!
//! The stateful half of the sync engine: it owns the connect → drain →
//! idle-confirm → disconnect cycle against the transport collaborator,
//! reconciles read-state from three independent signal sources, resolves
//! media lazily with content-addressed dedup, and exposes the library
//! operations a CLI layer calls.
//!
//! Everything runs against a [`SyncContext`] constructed once per top-level
//! operation; components never reach for globals, so each can be tested
//! with a fake transport and a temp-file store.

pub mod config;
pub mod context;
pub mod error;
pub mod media;
pub mod ops;
pub mod readstate;
pub mod resolver;
pub mod sync;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::EngineConfig;
pub use context::SyncContext;
pub use error::EngineError;
pub use sync::{run_sync, SyncReport};
pub use transport::{Transport, TransportError};
