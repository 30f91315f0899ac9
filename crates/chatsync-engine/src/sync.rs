//! The sync orchestrator: connect, drain, idle-confirm, disconnect.
//!
//! The protocol pushes everything (history pages, live messages, receipts)
//! over one event stream and never signals "history complete", so
//! completion is inferred: once no event has arrived for a full idle
//! window the backlog is taken as drained.  A wall-clock ceiling bounds
//! the whole cycle, and a watch channel lets the caller interrupt early.
//!
//! The loop is the single consumer of the event channel, which is what
//! keeps every store write serial without any locking discipline beyond
//! the store's own connection mutex.

use std::ops::ControlFlow;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use chatsync_proto::content::{self, DELETED_PLACEHOLDER};
use chatsync_proto::event::{ContactUpdate, Event, HistoryConversation, LiveMessage};
use chatsync_proto::normalize::{self, MessageRecord};
use chatsync_proto::payload::{MediaContent, ProtocolContent, ReplyInfo};
use chatsync_proto::{Jid, MessagePayload};
use chatsync_store::{
    Contact, MediaMeta, Message, Reaction, ReplyContext, SaveMode, StoreError,
};

use crate::context::SyncContext;
use crate::error::{EngineError, Result};
use crate::readstate;

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub live_messages: u32,
    pub history_messages: u32,
    pub conversations: u32,
    pub reactions: u32,
    pub revokes: u32,
    pub receipts: u32,
    pub contacts: u32,
    pub markers: u32,
    pub names_backfilled: u32,
    pub duration_ms: u64,
    /// The caller interrupted the drain before idle detection fired.
    pub interrupted: bool,
    /// The server invalidated this device's pairing mid-sync.
    pub logged_out: bool,
}

/// Run one full sync cycle: connect, drain until idle (or ceiling, or
/// interrupt), apply server-held chat markers, backfill missing chat
/// names, disconnect.
pub async fn run_sync(
    ctx: &SyncContext,
    mut interrupt: watch::Receiver<bool>,
) -> Result<SyncReport> {
    ctx.require_login()?;
    let own_jid = ctx
        .transport
        .own_jid()
        .ok_or(EngineError::NotAuthenticated)?;

    let started = Instant::now();
    let mut events = ctx.transport.connect().await?;
    info!(own = %own_jid, "connected; draining event backlog");

    let mut report = SyncReport::default();
    let mut last_activity = Instant::now();
    let mut drain_error: Option<EngineError> = None;
    // Cleared once the interrupt sender goes away, so a dead channel does
    // not busy-loop the select.
    let mut interrupt_active = true;

    // Pinned once, outside the loop: the per-iteration poll timer resets
    // whenever an event wins the race, so during a sustained burst it
    // never completes.  The ceiling must fire regardless of activity.
    let ceiling = tokio::time::sleep(ctx.config.sync_ceiling);
    tokio::pin!(ceiling);

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        last_activity = Instant::now();
                        match handle_event(ctx, &own_jid, event, &mut report) {
                            Ok(ControlFlow::Continue(())) => {}
                            Ok(ControlFlow::Break(())) => {
                                report.logged_out = true;
                                break;
                            }
                            Err(e) => {
                                drain_error = Some(e);
                                break;
                            }
                        }
                    }
                    None => {
                        debug!("event channel closed by transport");
                        break;
                    }
                }
            }
            changed = interrupt.changed(), if interrupt_active => {
                match changed {
                    Ok(()) if *interrupt.borrow() => {
                        info!("sync interrupted by caller");
                        report.interrupted = true;
                        break;
                    }
                    Ok(()) => {}
                    Err(_) => interrupt_active = false,
                }
            }
            _ = &mut ceiling => {
                warn!("sync ceiling reached; forcing completion");
                break;
            }
            _ = tokio::time::sleep(ctx.config.poll_interval) => {
                if last_activity.elapsed() >= ctx.config.idle_timeout {
                    debug!(
                        idle_ms = last_activity.elapsed().as_millis() as u64,
                        "idle window elapsed; backlog drained"
                    );
                    break;
                }
            }
        }
    }

    if drain_error.is_none() && !report.logged_out {
        apply_server_markers(ctx, &mut report).await;
        match backfill_names(ctx).await {
            Ok(resolved) => report.names_backfilled = resolved,
            Err(e) => drain_error = Some(e),
        }
    }

    // The session is torn down on every path, including store failures.
    ctx.transport.disconnect().await;
    if let Some(e) = drain_error {
        return Err(e);
    }

    report.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        live = report.live_messages,
        history = report.history_messages,
        conversations = report.conversations,
        duration_ms = report.duration_ms,
        interrupted = report.interrupted,
        "sync complete"
    );
    Ok(report)
}

/// Dispatch one event.  `Break` ends the drain (pairing invalidated).
fn handle_event(
    ctx: &SyncContext,
    own_jid: &Jid,
    event: Event,
    report: &mut SyncReport,
) -> Result<ControlFlow<()>> {
    match event {
        Event::Message(message) => handle_live_message(ctx, &message, report)?,
        Event::HistorySync(page) => {
            if let Some(progress) = page.progress {
                debug!(progress, "history sync page");
            }
            for conversation in &page.conversations {
                handle_history_conversation(ctx, own_jid, conversation, report)?;
                report.conversations += 1;
            }
        }
        Event::Contact(update) => {
            apply_contact_update(ctx, &update)?;
            report.contacts += 1;
        }
        Event::Receipt(receipt) => {
            readstate::apply_receipt(&ctx.db, &receipt)?;
            report.receipts += 1;
        }
        Event::ChatMarker(marker) => {
            readstate::apply_chat_marker(&ctx.db, &marker)?;
            report.markers += 1;
        }
        Event::Connected => debug!("session established"),
        Event::LoggedOut => {
            warn!("server invalidated this device's pairing");
            return Ok(ControlFlow::Break(()));
        }
    }
    Ok(ControlFlow::Continue(()))
}

fn handle_live_message(
    ctx: &SyncContext,
    message: &LiveMessage,
    report: &mut SyncReport,
) -> Result<()> {
    if !message.is_from_me && !message.push_name.is_empty() {
        observe_push_name(ctx, &message.sender.bare(), &message.push_name)?;
    }

    let record = normalize::from_live(message);
    // Own live messages arrive already read.
    let is_read = message.is_from_me;
    apply_message(ctx, record, &message.payload, SaveMode::Live, is_read, report)
}

fn handle_history_conversation(
    ctx: &SyncContext,
    own_jid: &Jid,
    conversation: &HistoryConversation,
    report: &mut SyncReport,
) -> Result<()> {
    let chat_jid = conversation.chat.to_string();
    ctx.db.upsert_chat(
        &chat_jid,
        conversation.name.as_deref().unwrap_or(""),
        conversation.chat.is_group(),
        None,
    )?;

    let mut entries: Vec<(MessageRecord, &MessagePayload)> = Vec::new();
    for entry in &conversation.messages {
        match normalize::from_history(&conversation.chat, entry, own_jid) {
            Some(record) => {
                if !entry.from_me && !entry.push_name.is_empty() {
                    observe_push_name(ctx, &record.sender, &entry.push_name)?;
                }
                entries.push((record, &entry.payload));
            }
            None => debug!(chat = %chat_jid, "skipping unkeyable history entry"),
        }
    }

    // Newest first: the unread count applies to the most recent incoming
    // messages, so classification depends on this ordering.
    entries.sort_by(|a, b| b.0.timestamp.cmp(&a.0.timestamp));
    let flags = readstate::classify_history(
        entries.iter().map(|(record, _)| record.is_from_me),
        conversation.unread_count,
    );

    for ((record, payload), is_read) in entries.into_iter().zip(flags) {
        apply_message(ctx, record, payload, SaveMode::History, is_read, report)?;
    }
    Ok(())
}

/// Persist one normalized message, routing the payload kinds that do not
/// land as ordinary rows (reactions, revokes, edits).
fn apply_message(
    ctx: &SyncContext,
    record: MessageRecord,
    payload: &MessagePayload,
    mode: SaveMode,
    is_read: bool,
    report: &mut SyncReport,
) -> Result<()> {
    if let MessagePayload::Reaction(reaction) = payload {
        ctx.db.apply_reaction(&Reaction {
            message_id: reaction.target_id.clone(),
            chat_jid: record.chat.to_string(),
            sender_jid: record.sender.to_string(),
            sender_name: record.sender_name,
            emoji: reaction.emoji.clone(),
            timestamp: record.timestamp,
        })?;
        report.reactions += 1;
        return Ok(());
    }

    if let MessagePayload::Protocol(ProtocolContent::Revoke { target_id }) = payload {
        if ctx.db.apply_revoke(target_id, DELETED_PLACEHOLDER)? {
            report.revokes += 1;
        } else {
            debug!(target = %target_id, "revoke target not stored locally");
        }
        return Ok(());
    }

    let content = content::extract(payload);
    if !content.is_storable() {
        return Ok(());
    }

    // Edits land under the id of the message they replace.
    let id = edit_target(payload)
        .unwrap_or(&record.id)
        .to_string();

    let message = Message {
        id,
        chat_jid: record.chat.to_string(),
        sender_jid: record.sender.to_string(),
        sender_name: record.sender_name,
        timestamp: record.timestamp,
        body: (!content.text.is_empty()).then_some(content.text),
        media_type: content.media_type,
        is_from_me: record.is_from_me,
        is_read,
        media: content.media.map(media_meta),
        reply: content.reply.map(reply_context),
    };
    ctx.db.upsert_message(&message, mode)?;

    match mode {
        SaveMode::Live => report.live_messages += 1,
        SaveMode::History => report.history_messages += 1,
    }
    Ok(())
}

/// The id an edit payload replaces.  The protocol delivers edits either
/// bare or behind the ephemeral and top-level edit wrappers; all of them
/// must land on the target row.
fn edit_target(payload: &MessagePayload) -> Option<&str> {
    match payload {
        MessagePayload::Protocol(ProtocolContent::Edit { target_id, .. }) => {
            Some(target_id.as_str())
        }
        MessagePayload::Ephemeral(inner) | MessagePayload::Edit(inner) => edit_target(inner),
        _ => None,
    }
}

fn media_meta(content: MediaContent) -> MediaMeta {
    MediaMeta {
        media_key: content.media_key,
        file_sha256: content.file_sha256,
        file_enc_sha256: content.file_enc_sha256,
        file_length: content.file_length,
        remote_path: content.remote_path,
        mime_type: content.mime_type,
        local_path: None,
    }
}

fn reply_context(reply: ReplyInfo) -> ReplyContext {
    ReplyContext {
        quoted_id: reply.quoted_id,
        quoted_sender: reply.quoted_sender,
        quoted_preview: reply.quoted_text,
    }
}

/// Merge a contact observation, preserving any field the update omits.
fn apply_contact_update(ctx: &SyncContext, update: &ContactUpdate) -> Result<()> {
    let jid = update.jid.bare().to_string();
    let existing = match ctx.db.get_contact(&jid) {
        Ok(contact) => contact,
        Err(StoreError::NotFound) => Contact {
            jid: jid.clone(),
            full_name: String::new(),
            push_name: String::new(),
        },
        Err(e) => return Err(e.into()),
    };

    ctx.db.upsert_contact(&Contact {
        jid,
        full_name: update.full_name.clone().unwrap_or(existing.full_name),
        push_name: update.push_name.clone().unwrap_or(existing.push_name),
    })?;
    Ok(())
}

/// A sender's self-chosen display name seen on a message.
fn observe_push_name(ctx: &SyncContext, sender: &Jid, push_name: &str) -> Result<()> {
    apply_contact_update(
        ctx,
        &ContactUpdate {
            jid: sender.clone(),
            full_name: None,
            push_name: Some(push_name.to_string()),
        },
    )
}

/// Apply the server-held read/unread markers.  Failures here degrade the
/// displayed read state but never fail the sync.
async fn apply_server_markers(ctx: &SyncContext, report: &mut SyncReport) {
    match ctx.transport.chat_markers().await {
        Ok(markers) => {
            for marker in &markers {
                match readstate::apply_chat_marker(&ctx.db, marker) {
                    Ok(()) => report.markers += 1,
                    Err(e) => warn!(chat = %marker.chat, error = %e, "chat marker not applied"),
                }
            }
        }
        Err(e) => warn!(error = %e, "chat marker fetch failed; skipping"),
    }
}

/// Resolve display names for chats still missing one.  Per-chat failures
/// are logged and skipped; the pass is throttled to one lookup per
/// configured delay.
pub(crate) async fn backfill_names(ctx: &SyncContext) -> Result<u32> {
    let missing = ctx.db.chats_missing_name(ctx.config.name_backfill_limit)?;
    if missing.is_empty() {
        return Ok(0);
    }
    debug!(count = missing.len(), "backfilling chat names");

    let mut resolved = 0;
    for chat in missing {
        let jid: Jid = match chat.jid.parse() {
            Ok(jid) => jid,
            Err(_) => {
                warn!(chat = %chat.jid, "stored chat JID does not parse; skipping");
                continue;
            }
        };
        match ctx.transport.display_name(&jid).await {
            Ok(Some(name)) if !name.is_empty() => {
                ctx.db.upsert_chat(&chat.jid, &name, chat.is_group, None)?;
                resolved += 1;
            }
            Ok(_) => debug!(chat = %chat.jid, "server has no name for chat"),
            Err(e) => warn!(chat = %chat.jid, error = %e, "name lookup failed; skipping"),
        }
        tokio::time::sleep(ctx.config.name_backfill_delay).await;
    }
    Ok(resolved)
}
