//! Name -> address resolution.
//!
//! A free-text query is matched case-insensitively against contacts and
//! chat names, deduplicated by JID.  Resolution never guesses: zero
//! matches and multiple matches are both errors, because silently picking
//! a match risks sending to the wrong recipient.

use std::collections::BTreeMap;

use chatsync_proto::Jid;
use chatsync_store::Database;

use crate::error::{EngineError, Result};

/// Resolve a recipient for sending: contacts plus individual (non-group)
/// chats.  A query containing `@` is taken as a literal JID.
pub fn resolve_recipient(db: &Database, query: &str) -> Result<Jid> {
    resolve(db, query, false)
}

/// Resolve a chat for querying: contacts plus all chats, groups included.
pub fn resolve_chat(db: &Database, query: &str) -> Result<Jid> {
    resolve(db, query, true)
}

fn resolve(db: &Database, query: &str, include_groups: bool) -> Result<Jid> {
    if query.contains('@') {
        return query
            .parse()
            .map_err(|_| EngineError::InvalidJid(query.to_string()));
    }

    // BTreeMap keyed by JID: dedups contact-and-chat double hits and keeps
    // the candidate list deterministically ordered.
    let mut candidates: BTreeMap<String, String> = BTreeMap::new();

    for contact in db.search_contacts(query)? {
        let label = if !contact.full_name.is_empty() {
            contact.full_name.clone()
        } else if !contact.push_name.is_empty() {
            contact.push_name.clone()
        } else {
            // Nameless contact rows still need a readable candidate line.
            contact.jid.clone()
        };
        candidates.entry(contact.jid).or_insert(label);
    }

    let chats = if include_groups {
        db.search_chats(query)?
    } else {
        db.search_direct_chats(query)?
    };
    for chat in chats {
        candidates.entry(chat.jid).or_insert(chat.name);
    }

    match candidates.len() {
        0 => Err(EngineError::RecipientNotFound(query.to_string())),
        1 => {
            let (jid, _) = candidates.into_iter().next().expect("len checked");
            jid.parse()
                .map_err(|_| EngineError::InvalidJid(jid.clone()))
        }
        _ => Err(EngineError::AmbiguousRecipient {
            query: query.to_string(),
            candidates: candidates
                .into_iter()
                .map(|(jid, label)| format!("{label} <{jid}>"))
                .collect(),
        }),
    }
}
