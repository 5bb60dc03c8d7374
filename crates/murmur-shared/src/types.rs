use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MurmurError, Result};

/// Opaque user identifier assigned by the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| MurmurError::Validation(format!("invalid user id '{s}': {e}")))
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider-assigned message identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| MurmurError::Validation(format!("invalid message id '{s}': {e}")))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A user profile as loaded from the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    /// Unique handle.
    pub username: String,
    pub avatar_url: Option<String>,
}

impl Identity {
    /// "First Last", falling back to the handle when both parts are blank.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Document,
    Audio,
}

/// File extensions accepted for document attachments.
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "xls", "xlsx", "txt", "zip", "rar"];

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
            Self::Audio => "audio",
        }
    }

    /// Whether a file with this MIME type and extension may be sent as `self`.
    pub fn accepts(&self, mime: &str, extension: Option<&str>) -> bool {
        match self {
            Self::Image => mime.starts_with("image/"),
            Self::Video => mime.starts_with("video/"),
            Self::Audio => mime.starts_with("audio/"),
            Self::Document => extension
                .map(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachmentKind {
    type Err = MurmurError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "document" => Ok(Self::Document),
            "audio" => Ok(Self::Audio),
            other => Err(MurmurError::Validation(format!(
                "unknown attachment kind '{other}'"
            ))),
        }
    }
}

/// Attachment carried by a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    /// Either an embedded `data:` URI or a `blob:` reference.
    pub url: String,
    pub kind: AttachmentKind,
    /// Display name (original file name).
    pub name: String,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// May be empty for attachment-only messages.
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub attachment: Option<Attachment>,
}

impl Message {
    pub fn conversation_key(&self) -> Result<ConversationKey> {
        ConversationKey::new(self.sender_id, self.receiver_id)
    }
}

/// A message as submitted by the sender, before the provider assigns an id,
/// a timestamp and the read flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageDraft {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub attachment: Option<Attachment>,
}

impl MessageDraft {
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty() && self.attachment.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePatch {
    pub read: Option<bool>,
}

impl MessagePatch {
    pub fn mark_read() -> Self {
        Self { read: Some(true) }
    }
}

// ---------------------------------------------------------------------------
// Conversation pair
// ---------------------------------------------------------------------------

/// Unordered pair of participants, stored sorted so that both sides of a
/// conversation derive the same key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    low: UserId,
    high: UserId,
}

impl ConversationKey {
    pub fn new(a: UserId, b: UserId) -> Result<Self> {
        if a == b {
            return Err(MurmurError::Validation(
                "a conversation needs two distinct participants".into(),
            ));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { low, high })
    }

    pub fn participants(&self) -> (UserId, UserId) {
        (self.low, self.high)
    }

    pub fn includes(&self, user: &UserId) -> bool {
        self.low == *user || self.high == *user
    }

    /// The other participant, if `user` belongs to this pair.
    pub fn peer_of(&self, user: &UserId) -> Option<UserId> {
        if self.low == *user {
            Some(self.high)
        } else if self.high == *user {
            Some(self.low)
        } else {
            None
        }
    }

    /// True when the message travels between the two participants.
    pub fn contains(&self, message: &Message) -> bool {
        message.sender_id != message.receiver_id
            && self.includes(&message.sender_id)
            && self.includes(&message.receiver_id)
    }

    /// Realtime channel name shared by both participants.
    pub fn scope_key(&self) -> String {
        format!("chat:{}:{}", self.low, self.high)
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scope_key())
    }
}

/// Deterministic realtime scope for a pair of users.
pub fn scope_key(a: UserId, b: UserId) -> Result<String> {
    ConversationKey::new(a, b).map(|k| k.scope_key())
}
