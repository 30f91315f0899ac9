//! # chatsync-store
//!
//! Durable local cache for a push-based messaging protocol, backed by
//! SQLite.  The protocol never supports "give me messages since X", so this
//! store is the only thing that makes offline queries (chat listings,
//! unread counts, search, media lookup) possible.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection` behind an internal mutex, with typed helpers for
//! every entity.  Schema upgrades are additive and applied on open; a
//! failed migration is fatal and surfaces as an error from the constructor.

pub mod chats;
pub mod contacts;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod reactions;

mod error;

pub use database::{Database, StoreStats};
pub use error::{Result, StoreError};
pub use messages::SaveMode;
pub use models::*;
