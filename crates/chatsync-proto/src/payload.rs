//! The closed tagged-variant type for protocol message content.
//!
//! The wire protocol delivers a message payload as one of roughly twenty
//! mutually exclusive content kinds.  Modelling them as a single enum keeps
//! all "what kind of message is this" dispatch in exhaustive matches; the
//! [`Unknown`](MessagePayload::Unknown) fallback carries whatever type tag
//! could be recovered structurally so unhandled kinds can be logged.

use serde::{Deserialize, Serialize};

/// Key material and addressing for an encrypted attachment.
///
/// The transport hands these fields over verbatim; the engine only ever
/// stores them and echoes them back into download requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaContent {
    /// Full MIME type as reported by the sender, e.g. `image/jpeg`.
    pub mime_type: String,
    /// Server-side path the ciphertext can be fetched from.
    pub remote_path: String,
    /// Symmetric key used to decrypt the ciphertext.
    #[serde(with = "base64_bytes")]
    pub media_key: Vec<u8>,
    /// SHA-256 of the plaintext.  Used for content-addressed dedup.
    #[serde(with = "base64_bytes")]
    pub file_sha256: Vec<u8>,
    /// SHA-256 of the ciphertext.
    #[serde(with = "base64_bytes")]
    pub file_enc_sha256: Vec<u8>,
    /// Plaintext length in bytes.
    pub file_length: u64,
    /// Optional caption attached to the media.
    pub caption: Option<String>,
}

/// Context carried by a message that quotes an earlier one.
///
/// The quoted message id may never exist locally (quoting something from
/// before the account was paired); that is expected, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyInfo {
    pub quoted_id: String,
    pub quoted_sender: String,
    pub quoted_text: String,
}

/// An emoji annotation targeting an earlier message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionContent {
    /// Id of the message being reacted to.
    pub target_id: String,
    /// The emoji glyph.  Empty means "remove my reaction".
    pub emoji: String,
}

/// System/protocol messages that manipulate earlier content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProtocolContent {
    /// The sender revoked an earlier message ("delete for everyone").
    Revoke { target_id: String },
    /// The sender edited an earlier message; `edited` is the replacement
    /// payload and `target_id` the message it replaces.
    Edit {
        target_id: String,
        edited: Box<MessagePayload>,
    },
    /// Any other protocol action (session setup, ephemeral settings, ...).
    Other { type_hint: Option<String> },
}

/// One protocol message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessagePayload {
    /// Plain text body.
    Text(String),
    /// Text with context info (reply quotes, link previews).
    ExtendedText {
        text: String,
        reply: Option<ReplyInfo>,
    },
    Image(MediaContent),
    Video(MediaContent),
    Audio(MediaContent),
    Document(MediaContent),
    Sticker(MediaContent),
    /// A shared contact card.
    ContactCard { display_name: String, vcard: String },
    /// A static location pin.
    Location {
        latitude: f64,
        longitude: f64,
        name: Option<String>,
    },
    /// A live location share.
    LiveLocation {
        latitude: f64,
        longitude: f64,
        caption: Option<String>,
    },
    /// A reaction delivered as message content (history sync embeds
    /// reactions this way; live reactions arrive the same shape).
    Reaction(ReactionContent),
    /// An invitation link to a group chat.
    GroupInvite {
        group_name: String,
        code: String,
        caption: Option<String>,
    },
    /// A newly created poll.
    PollCreate { name: String, options: Vec<String> },
    /// An (encrypted) poll vote update.
    PollUpdate { target_id: String },
    /// Protocol/system actions; see [`ProtocolContent`].
    Protocol(ProtocolContent),
    /// Sender-key distribution for group encryption.  Content-free.
    KeyDistribution,
    /// An envelope that carries only context info and no content.
    ContextOnly,
    /// Disappearing-message wrapper around the real payload.
    Ephemeral(Box<MessagePayload>),
    /// View-once wrapper (original variant).
    ViewOnce(Box<MessagePayload>),
    /// View-once wrapper (second historical variant).
    ViewOnceV2(Box<MessagePayload>),
    /// View-once wrapper (extension variant).
    ViewOnceV2Extension(Box<MessagePayload>),
    /// Document plus caption wrapper.
    DocumentWithCaption(Box<MessagePayload>),
    /// Top-level edit wrapper around the replacement payload.
    Edit(Box<MessagePayload>),
    /// Anything the decoder did not recognize.  `type_hint` is the field
    /// tag recovered by structural introspection, when one was available.
    Unknown { type_hint: Option<String> },
}

impl MessagePayload {
    /// Whether this payload is one of the recursive wrapper kinds.
    pub fn is_wrapper(&self) -> bool {
        matches!(
            self,
            MessagePayload::Ephemeral(_)
                | MessagePayload::ViewOnce(_)
                | MessagePayload::ViewOnceV2(_)
                | MessagePayload::ViewOnceV2Extension(_)
                | MessagePayload::DocumentWithCaption(_)
                | MessagePayload::Edit(_)
        )
    }
}

mod base64_bytes {
    //! Serialize binary key material as standard base64, the encoding the
    //! protocol itself uses for media keys in JSON contexts.

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_key_serializes_as_base64() {
        let media = MediaContent {
            mime_type: "image/jpeg".into(),
            media_key: vec![1, 2, 3, 4],
            ..Default::default()
        };
        let json = serde_json::to_value(&media).unwrap();
        assert_eq!(json["media_key"], "AQIDBA==");
        let back: MediaContent = serde_json::from_value(json).unwrap();
        assert_eq!(back.media_key, vec![1, 2, 3, 4]);
    }

    #[test]
    fn wrapper_detection() {
        let inner = MessagePayload::Text("hi".into());
        assert!(MessagePayload::Ephemeral(Box::new(inner.clone())).is_wrapper());
        assert!(!inner.is_wrapper());
    }
}
