//! Read-state reconciliation.
//!
//! Three independent, sometimes-contradictory signal sources feed the
//! store's read flags:
//!
//! 1. history-sync unread counts (a count per conversation, not
//!    per-message flags, see [`classify_history`]);
//! 2. live read receipts ([`apply_receipt`]);
//! 3. cross-device "mark chat read/unread" actions ([`apply_chat_marker`]).
//!
//! All message-level writes go through the store's max-combine on the read
//! flag, so no path can ever flip a message from read back to unread.  The
//! "unread" marker only sets the chat-level override; messages already
//! start unread by default.

use tracing::debug;

use chatsync_proto::event::{ChatMarker, MarkerAction, Receipt, ReceiptKind};
use chatsync_store::{Database, StoreError};

use crate::error::Result;

/// Classify a history conversation's messages into read flags.
///
/// `from_me_newest_first` is the conversation's messages sorted by
/// timestamp descending.  Self-sent messages are always read; the first
/// `unread_count` *incoming* messages are unread; every later incoming
/// message is read.  The protocol reports only the count, so this
/// ordering-dependent walk is the only way to recover per-message flags.
pub fn classify_history(
    from_me_newest_first: impl Iterator<Item = bool>,
    unread_count: u32,
) -> Vec<bool> {
    let mut remaining = unread_count;
    from_me_newest_first
        .map(|from_me| {
            if from_me {
                true
            } else if remaining > 0 {
                remaining -= 1;
                false
            } else {
                true
            }
        })
        .collect()
}

/// Apply a live receipt.  Only read receipts move state; delivery
/// receipts carry no read information.
pub fn apply_receipt(db: &Database, receipt: &Receipt) -> Result<usize> {
    match receipt.kind {
        ReceiptKind::Read => {
            let changed = db.mark_messages_read(&receipt.message_ids)?;
            debug!(
                chat = %receipt.chat,
                ids = receipt.message_ids.len(),
                changed,
                "applied read receipt"
            );
            Ok(changed)
        }
        ReceiptKind::Delivered => Ok(0),
    }
}

/// Apply a cross-device chat marker.
///
/// "Read" marks every message in the chat read and clears the override.
/// "Unread" does *not* retroactively un-read messages; it only sets the
/// chat-level override used for display when everything happens to be
/// read already.
pub fn apply_chat_marker(db: &Database, marker: &ChatMarker) -> Result<()> {
    let jid = marker.chat.to_string();
    match marker.action {
        MarkerAction::Read => {
            let changed = db.mark_chat_read(&jid)?;
            debug!(chat = %jid, changed, "chat marked read");
        }
        MarkerAction::Unread => {
            match db.set_marked_unread(&jid, true) {
                Ok(()) => {}
                Err(StoreError::NotFound) => {
                    // Marker for a chat we have not stored yet.
                    db.upsert_chat(&jid, "", marker.chat.is_group(), None)?;
                    db.set_marked_unread(&jid, true)?;
                }
                Err(e) => return Err(e.into()),
            }
            debug!(chat = %jid, "chat marked unread (override only)");
        }
    }
    Ok(())
}
