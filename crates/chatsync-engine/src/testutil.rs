//! Shared test fixtures: a scriptable fake transport plus context builders.
//!
//! [`FakeTransport`] replays a scripted event stream with per-event delays,
//! which is what lets the idle-detection tests exercise real timing instead
//! of mocking the clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;

use chatsync_proto::event::{ChatMarker, Event, LiveMessage};
use chatsync_proto::{Jid, MessagePayload};
use chatsync_store::{Database, MediaMeta, Message};

use crate::config::EngineConfig;
use crate::context::SyncContext;
use crate::transport::{
    DownloadRequest, OutgoingMedia, QuoteRef, SentMessage, Transport, TransportError,
    UploadedMedia,
};

/// One outgoing send captured for assertions.
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub to: Jid,
    pub text: String,
    pub media_class: Option<String>,
    pub quoted_id: Option<String>,
}

/// Scriptable in-process transport.
pub struct FakeTransport {
    pub logged_in: AtomicBool,
    pub own: Jid,
    /// `(delay, event)` pairs replayed in order after `connect`.
    pub script: Mutex<Vec<(Duration, Event)>>,
    /// When set, `connect` parks a sender clone so the event channel stays
    /// open after the script ends and only idle detection can end a sync.
    pub hold_open: AtomicBool,
    held: Mutex<Option<mpsc::Sender<Event>>>,
    /// Downloadable bytes keyed by remote path.
    pub downloads: Mutex<HashMap<String, Vec<u8>>>,
    pub download_calls: AtomicUsize,
    /// Server-side display names keyed by JID string.
    pub names: Mutex<HashMap<String, String>>,
    pub name_calls: AtomicUsize,
    /// Group membership keyed by group JID string.
    pub participants: Mutex<HashMap<String, Vec<Jid>>>,
    /// Server-held chat markers returned by `chat_markers`.
    pub markers: Mutex<Vec<ChatMarker>>,
    pub sent: Mutex<Vec<SentRecord>>,
    next_id: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            logged_in: AtomicBool::new(true),
            own: Jid::user_jid("111"),
            script: Mutex::new(Vec::new()),
            hold_open: AtomicBool::new(false),
            held: Mutex::new(None),
            downloads: Mutex::new(HashMap::new()),
            download_calls: AtomicUsize::new(0),
            names: Mutex::new(HashMap::new()),
            name_calls: AtomicUsize::new(0),
            participants: Mutex::new(HashMap::new()),
            markers: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            logout_calls: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Queue an event delivered `delay` after the previous one.
    pub fn push_event(&self, delay: Duration, event: Event) {
        self.script.lock().unwrap().push((delay, event));
    }

    fn next_sent(&self) -> SentMessage {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        SentMessage {
            id: format!("SENT-{n}"),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn own_jid(&self) -> Option<Jid> {
        self.is_logged_in().then(|| self.own.clone())
    }

    async fn connect(&self) -> Result<mpsc::Receiver<Event>, TransportError> {
        let (tx, rx) = mpsc::channel(64);
        if self.hold_open.load(Ordering::SeqCst) {
            *self.held.lock().unwrap() = Some(tx.clone());
        }
        let script: Vec<(Duration, Event)> = self.script.lock().unwrap().drain(..).collect();
        tokio::spawn(async move {
            for (delay, event) in script {
                tokio::time::sleep(delay).await;
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        *self.held.lock().unwrap() = None;
    }

    async fn send_text(
        &self,
        to: &Jid,
        text: &str,
        quote: Option<&QuoteRef>,
    ) -> Result<SentMessage, TransportError> {
        self.sent.lock().unwrap().push(SentRecord {
            to: to.clone(),
            text: text.to_string(),
            media_class: None,
            quoted_id: quote.map(|q| q.message_id.clone()),
        });
        Ok(self.next_sent())
    }

    async fn send_media(
        &self,
        to: &Jid,
        media: &OutgoingMedia,
        quote: Option<&QuoteRef>,
    ) -> Result<SentMessage, TransportError> {
        self.sent.lock().unwrap().push(SentRecord {
            to: to.clone(),
            text: media.caption.clone(),
            media_class: Some(media.media_class.clone()),
            quoted_id: quote.map(|q| q.message_id.clone()),
        });
        Ok(self.next_sent())
    }

    async fn upload(
        &self,
        bytes: &[u8],
        _media_class: &str,
    ) -> Result<UploadedMedia, TransportError> {
        Ok(UploadedMedia {
            remote_path: format!("/v/fake-{}", bytes.len()),
            media_key: vec![7; 32],
            file_sha256: fake_digest(bytes, 0x51),
            file_enc_sha256: fake_digest(bytes, 0xa3),
            file_length: bytes.len() as u64,
        })
    }

    async fn download(&self, request: &DownloadRequest) -> Result<Vec<u8>, TransportError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.downloads
            .lock()
            .unwrap()
            .get(&request.remote_path)
            .cloned()
            .ok_or_else(|| TransportError::Download(format!("no blob at {}", request.remote_path)))
    }

    async fn display_name(&self, jid: &Jid) -> Result<Option<String>, TransportError> {
        self.name_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.names.lock().unwrap().get(&jid.to_string()).cloned())
    }

    async fn group_participants(&self, group: &Jid) -> Result<Vec<Jid>, TransportError> {
        self.participants
            .lock()
            .unwrap()
            .get(&group.to_string())
            .cloned()
            .ok_or_else(|| TransportError::Query(format!("unknown group {group}")))
    }

    async fn chat_markers(&self) -> Result<Vec<ChatMarker>, TransportError> {
        Ok(self.markers.lock().unwrap().clone())
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.logged_in.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Deterministic stand-in for a 32-byte digest; not a real hash.
fn fake_digest(bytes: &[u8], salt: u8) -> Vec<u8> {
    let mut out = vec![salt; 32];
    for (i, b) in bytes.iter().enumerate() {
        out[i % 32] = out[i % 32].wrapping_mul(31).wrapping_add(*b);
    }
    out
}

/// In-memory context with fast sync timings.  The returned `TempDir` owns
/// the media directory and must be kept alive for the test's duration.
pub fn test_context(transport: Arc<FakeTransport>) -> (SyncContext, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        media_dir: dir.path().join("media"),
        idle_timeout: Duration::from_millis(120),
        poll_interval: Duration::from_millis(10),
        sync_ceiling: Duration::from_secs(5),
        name_backfill_delay: Duration::from_millis(1),
        name_backfill_limit: 50,
    };
    let db = Database::open_in_memory().unwrap();
    (SyncContext::new(db, transport, config), dir)
}

/// A stored message carrying an image attachment.
pub fn media_message(id: &str, remote_path: &str, file_sha256: Vec<u8>) -> Message {
    Message {
        id: id.to_string(),
        chat_jid: "222@s.whatsapp.net".to_string(),
        sender_jid: "222@s.whatsapp.net".to_string(),
        sender_name: String::new(),
        timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        body: Some("photo".to_string()),
        media_type: Some("image".to_string()),
        is_from_me: false,
        is_read: false,
        media: Some(MediaMeta {
            media_key: vec![9; 32],
            file_sha256,
            file_enc_sha256: vec![8; 32],
            file_length: 11,
            remote_path: remote_path.to_string(),
            mime_type: "image/jpeg".to_string(),
            local_path: None,
        }),
        reply: None,
    }
}

/// A live text-message event from `sender_user` in that user's direct chat.
pub fn live_text(id: &str, sender_user: &str, text: &str, ts: i64) -> Event {
    Event::Message(Box::new(LiveMessage {
        id: id.to_string(),
        chat: Jid::user_jid(sender_user),
        sender: Jid::user_jid(sender_user),
        push_name: String::new(),
        timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
        is_from_me: false,
        is_group: false,
        payload: MessagePayload::Text(text.to_string()),
    }))
}
