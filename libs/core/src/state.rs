use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    #[default]
    Closed,
    Open,
    Minimized,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    #[default]
    Active,
    WaitingForHuman,
    WithHuman,
    Closed,
}

/// One active chat, identified by the opaque id the backend assigned on init.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub session_id: String,
    pub studio_id: String,
    pub status: SessionStatus,
}

impl ConversationSession {
    pub fn new(session_id: impl Into<String>, studio_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            studio_id: studio_id.into(),
            status: SessionStatus::Active,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingState {
    pub is_typing: bool,
    pub typing_user: Option<String>,
}

impl TypingState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn typing(name: impl Into<String>) -> Self {
        Self {
            is_typing: true,
            typing_user: Some(name.into()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(String);

impl AttachmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AttachmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for AttachmentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A file selected for upload, mutated in place while the upload progresses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: AttachmentId,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub uploading: bool,
    /// Last reported upload progress, 0 to 100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Attachment {
    pub fn pending(file: &FileUpload) -> Self {
        Self {
            id: AttachmentId::new(),
            filename: file.filename.clone(),
            mime_type: file.mime_type.clone(),
            size: file.bytes.len() as u64,
            url: None,
            uploading: true,
            progress: 0,
            error: None,
        }
    }
}

/// Raw file handed to the upload operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileUpload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}
