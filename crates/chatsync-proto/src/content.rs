//! Content extraction: payload -> normalized `{text, media type, media, reply}`.
//!
//! This is a pure function of the payload.  Wrapper kinds (ephemeral,
//! view-once, document-with-caption, edit) are unwrapped recursively, with
//! a small depth cap since wrappers do not nest indefinitely in practice.

use crate::payload::{MediaContent, MessagePayload, ProtocolContent, ReplyInfo};

/// Semantic media-type tags.  Stored as TEXT; the view-once marker composes
/// over the base tag (`viewonce_image`), which is why these are string
/// constants rather than enum variants.
pub mod kind {
    pub const IMAGE: &str = "image";
    pub const VIDEO: &str = "video";
    pub const AUDIO: &str = "audio";
    pub const DOCUMENT: &str = "document";
    pub const STICKER: &str = "sticker";
    pub const CONTACT: &str = "contact";
    pub const LOCATION: &str = "location";
    pub const LIVE_LOCATION: &str = "live_location";
    pub const REACTION: &str = "reaction";
    pub const GROUP_INVITE: &str = "group_invite";
    pub const POLL: &str = "poll";
    pub const POLL_UPDATE: &str = "poll_update";
    /// Tombstone left behind by a protocol-level revoke.
    pub const DELETED: &str = "deleted";
    /// Content-free system/protocol payloads.  Messages classified as this
    /// are dropped upstream, never persisted.
    pub const PROTOCOL: &str = "protocol";
    /// Prefix applied to the inner tag of view-once wrapped content.
    pub const VIEW_ONCE_PREFIX: &str = "viewonce_";

    /// The base media class of a tag, with any view-once prefix removed.
    /// `viewonce_image` -> `image`.
    pub fn media_class(tag: &str) -> &str {
        tag.strip_prefix(VIEW_ONCE_PREFIX).unwrap_or(tag)
    }
}

/// Replacement body written for revoked messages.
pub const DELETED_PLACEHOLDER: &str = "[Message deleted]";

/// Wrappers never nest beyond two levels in practice; cap recursion anyway.
const MAX_WRAPPER_DEPTH: usize = 6;

/// Normalized content pulled out of one payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedContent {
    /// Plain-text body, or caption for media.  Empty when content-free.
    pub text: String,
    /// Semantic media-type tag from [`kind`], if any.
    pub media_type: Option<String>,
    /// Attachment key material, for media kinds.
    pub media: Option<MediaContent>,
    /// Quoted-message context, when the payload carries one.
    pub reply: Option<ReplyInfo>,
}

impl ExtractedContent {
    fn media(tag: &str, content: &MediaContent) -> Self {
        Self {
            text: content.caption.clone().unwrap_or_default(),
            media_type: Some(tag.to_string()),
            media: Some(content.clone()),
            reply: None,
        }
    }

    fn tagged(tag: &str, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media_type: Some(tag.to_string()),
            media: None,
            reply: None,
        }
    }

    /// Whether this content is worth persisting as a message row.
    /// Content-free protocol payloads and unrecognized variants are not.
    pub fn is_storable(&self) -> bool {
        match self.media_type.as_deref() {
            Some(kind::PROTOCOL) => false,
            Some(_) => true,
            None => !self.text.is_empty(),
        }
    }
}

/// Extract normalized content from one protocol payload.
///
/// Pure and side-effect free apart from a warning log for unrecognized
/// variants, so it can be unit-tested without any collaborators.
pub fn extract(payload: &MessagePayload) -> ExtractedContent {
    extract_at(payload, 0)
}

fn extract_at(payload: &MessagePayload, depth: usize) -> ExtractedContent {
    if depth > MAX_WRAPPER_DEPTH {
        tracing::warn!(depth, "wrapper nesting exceeded cap; treating as empty");
        return ExtractedContent::default();
    }

    match payload {
        MessagePayload::Text(text) => ExtractedContent {
            text: text.clone(),
            ..Default::default()
        },
        MessagePayload::ExtendedText { text, reply } => ExtractedContent {
            text: text.clone(),
            reply: reply.clone(),
            ..Default::default()
        },

        MessagePayload::Image(m) => ExtractedContent::media(kind::IMAGE, m),
        MessagePayload::Video(m) => ExtractedContent::media(kind::VIDEO, m),
        MessagePayload::Audio(m) => ExtractedContent::media(kind::AUDIO, m),
        MessagePayload::Document(m) => ExtractedContent::media(kind::DOCUMENT, m),
        MessagePayload::Sticker(m) => ExtractedContent::media(kind::STICKER, m),

        MessagePayload::ContactCard { display_name, .. } => {
            ExtractedContent::tagged(kind::CONTACT, display_name.clone())
        }
        MessagePayload::Location {
            latitude,
            longitude,
            name,
        } => {
            let text = match name {
                Some(name) => format!("{name} ({latitude}, {longitude})"),
                None => format!("({latitude}, {longitude})"),
            };
            ExtractedContent::tagged(kind::LOCATION, text)
        }
        MessagePayload::LiveLocation { caption, .. } => {
            ExtractedContent::tagged(kind::LIVE_LOCATION, caption.clone().unwrap_or_default())
        }

        MessagePayload::Reaction(reaction) => {
            ExtractedContent::tagged(kind::REACTION, reaction.emoji.clone())
        }

        MessagePayload::GroupInvite {
            group_name,
            caption,
            ..
        } => {
            let text = caption.clone().unwrap_or_else(|| group_name.clone());
            ExtractedContent::tagged(kind::GROUP_INVITE, text)
        }
        MessagePayload::PollCreate { name, .. } => {
            ExtractedContent::tagged(kind::POLL, name.clone())
        }
        MessagePayload::PollUpdate { .. } => ExtractedContent::tagged(kind::POLL_UPDATE, ""),

        MessagePayload::Protocol(protocol) => match protocol {
            ProtocolContent::Revoke { .. } => {
                ExtractedContent::tagged(kind::DELETED, DELETED_PLACEHOLDER)
            }
            ProtocolContent::Edit { edited, .. } => extract_at(edited, depth + 1),
            ProtocolContent::Other { type_hint } => {
                tracing::debug!(type_hint = ?type_hint, "content-free protocol payload");
                ExtractedContent::tagged(kind::PROTOCOL, "")
            }
        },

        MessagePayload::KeyDistribution | MessagePayload::ContextOnly => {
            ExtractedContent::tagged(kind::PROTOCOL, "")
        }

        MessagePayload::Ephemeral(inner)
        | MessagePayload::DocumentWithCaption(inner)
        | MessagePayload::Edit(inner) => extract_at(inner, depth + 1),

        MessagePayload::ViewOnce(inner)
        | MessagePayload::ViewOnceV2(inner)
        | MessagePayload::ViewOnceV2Extension(inner) => {
            let mut content = extract_at(inner, depth + 1);
            if let Some(tag) = content.media_type.take() {
                content.media_type = Some(mark_view_once(&tag));
            }
            content
        }

        MessagePayload::Unknown { type_hint } => {
            tracing::warn!(type_hint = ?type_hint, "unhandled message payload variant");
            ExtractedContent::default()
        }
    }
}

fn mark_view_once(tag: &str) -> String {
    if tag.starts_with(kind::VIEW_ONCE_PREFIX) {
        tag.to_string()
    } else {
        format!("{}{}", kind::VIEW_ONCE_PREFIX, tag)
    }
}
