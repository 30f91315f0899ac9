//! Lazy, content-addressed media resolution.
//!
//! Attachments are stored on disk named by their plaintext SHA-256, so two
//! messages carrying byte-identical media converge on one file and a disk
//! hit never touches the network.  Missing key material is a non-fatal
//! "cannot download" condition; the caller proceeds without a local file.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use chatsync_proto::content::kind;

use crate::context::SyncContext;
use crate::error::{EngineError, Result};
use crate::transport::DownloadRequest;
use chatsync_store::StoreError;

/// Extension lookup for common MIME types; anything else falls back to a
/// generic per-media-class extension.
const EXT_BY_MIME: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("video/mp4", "mp4"),
    ("video/3gpp", "3gp"),
    ("audio/ogg; codecs=opus", "ogg"),
    ("audio/ogg", "ogg"),
    ("audio/mpeg", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/aac", "aac"),
    ("audio/wav", "wav"),
    ("application/pdf", "pdf"),
    ("text/plain", "txt"),
];

/// File extension for a MIME type, with a per-media-class fallback.
pub fn extension_for(mime_type: &str, media_class: &str) -> &'static str {
    if let Some(&(_, ext)) = EXT_BY_MIME.iter().find(|(m, _)| *m == mime_type) {
        return ext;
    }
    match media_class {
        kind::IMAGE => "jpg",
        kind::VIDEO => "mp4",
        kind::AUDIO => "ogg",
        kind::STICKER => "webp",
        _ => "bin",
    }
}

/// Produce a local file path for a message's attachment, downloading and
/// decrypting only if necessary.
///
/// Returns `Ok(None)` when the attachment cannot be fetched (missing key
/// material or remote path); that is a skip, not an error.  Downloading
/// requires an active transport session.
pub async fn resolve_media(ctx: &SyncContext, message_id: &str) -> Result<Option<PathBuf>> {
    let message = ctx.db.get_message(message_id).map_err(|e| match e {
        StoreError::NotFound => EngineError::MessageNotFound(message_id.to_string()),
        other => EngineError::Store(other),
    })?;

    let media = message
        .media
        .ok_or_else(|| EngineError::NoMedia(message_id.to_string()))?;

    // Already resolved and still on disk?
    if let Some(path) = media.local_path.as_deref() {
        if Path::new(path).exists() {
            return Ok(Some(PathBuf::from(path)));
        }
        debug!(message = message_id, path, "recorded media file is gone; re-resolving");
    }

    if media.file_sha256.is_empty() {
        warn!(message = message_id, "no plaintext hash recorded; cannot address media");
        return Ok(None);
    }

    let media_class = message
        .media_type
        .as_deref()
        .map(kind::media_class)
        .unwrap_or(kind::DOCUMENT);
    let file_name = format!(
        "{}.{}",
        hex::encode(&media.file_sha256),
        extension_for(&media.mime_type, media_class)
    );

    std::fs::create_dir_all(&ctx.config.media_dir)?;
    let path = ctx.config.media_dir.join(file_name);

    // Cross-message dedup: another message already fetched these bytes.
    if path.exists() {
        debug!(message = message_id, path = %path.display(), "media already on disk");
        ctx.db
            .set_media_local_path(message_id, &path.to_string_lossy())?;
        return Ok(Some(path));
    }

    if media.media_key.is_empty() || media.remote_path.is_empty() {
        warn!(
            message = message_id,
            "missing media key material or remote path; skipping download"
        );
        return Ok(None);
    }

    let bytes = ctx
        .transport
        .download(&DownloadRequest {
            remote_path: media.remote_path.clone(),
            media_key: media.media_key.clone(),
            file_sha256: media.file_sha256.clone(),
            file_enc_sha256: media.file_enc_sha256.clone(),
            file_length: media.file_length,
            media_class: media_class.to_string(),
        })
        .await?;

    std::fs::write(&path, &bytes)?;
    ctx.db
        .set_media_local_path(message_id, &path.to_string_lossy())?;

    info!(
        message = message_id,
        bytes = bytes.len(),
        path = %path.display(),
        "downloaded media"
    );
    Ok(Some(path))
}
