//! Event normalization: fold the two protocol event shapes into one
//! canonical in-memory record.
//!
//! All "which event shape am I looking at" branching lives here so the rest
//! of the pipeline only ever sees a [`MessageRecord`] plus the raw payload.

use chrono::{DateTime, TimeZone, Utc};

use crate::event::{HistoryMessage, LiveMessage};
use crate::jid::Jid;

/// Canonical envelope for one message, independent of how it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub id: String,
    pub chat: Jid,
    pub sender: Jid,
    pub sender_name: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
    pub is_group: bool,
}

/// A live push event maps field-for-field.
pub fn from_live(event: &LiveMessage) -> MessageRecord {
    MessageRecord {
        id: event.id.clone(),
        chat: event.chat.clone(),
        sender: event.sender.bare(),
        sender_name: event.push_name.clone(),
        timestamp: event.timestamp,
        is_from_me: event.is_from_me,
        is_group: event.is_group,
    }
}

/// A history entry needs sender resolution:
/// - group conversations carry an explicit participant field;
/// - a self-sent direct message is from the local account;
/// - an incoming direct message is from the remote party in the key.
///
/// Returns `None` when the entry has no id or no resolvable sender; such
/// entries cannot be keyed and are skipped by the caller.
pub fn from_history(
    chat: &Jid,
    entry: &HistoryMessage,
    own_jid: &Jid,
) -> Option<MessageRecord> {
    if entry.id.is_empty() {
        return None;
    }

    let sender = if chat.is_group() {
        entry.participant.as_ref()?.bare()
    } else if entry.from_me {
        own_jid.bare()
    } else {
        entry
            .remote_jid
            .as_ref()
            .map(|j| j.bare())
            .unwrap_or_else(|| chat.bare())
    };

    let timestamp = if entry.timestamp_secs > 0 {
        Utc.timestamp_opt(entry.timestamp_secs, 0)
            .single()
            .unwrap_or_else(Utc::now)
    } else {
        // The protocol occasionally omits timestamps on old history.
        Utc::now()
    };

    Some(MessageRecord {
        id: entry.id.clone(),
        chat: chat.clone(),
        sender,
        sender_name: entry.push_name.clone(),
        timestamp,
        is_from_me: entry.from_me,
        is_group: chat.is_group(),
    })
}
