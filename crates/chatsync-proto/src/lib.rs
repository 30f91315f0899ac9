//! # chatsync-proto
//!
//! Protocol-side types and pure logic for the sync engine: JID identifiers,
//! the closed tagged-variant message payload, the content extractor, the
//! transport event shapes, and the normalizer that folds the two protocol
//! event shapes (live push, history-sync entry) into one canonical record.
//!
//! Nothing in this crate performs I/O or touches the store, so every piece
//! is unit-testable in isolation.

pub mod content;
pub mod event;
pub mod jid;
pub mod normalize;
pub mod payload;

pub use content::{extract, ExtractedContent};
pub use event::Event;
pub use jid::Jid;
pub use normalize::MessageRecord;
pub use payload::{MediaContent, MessagePayload, ReplyInfo};
