use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Request body for `POST /conversations/`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    pub title: String,
}

/// Response body for `POST /conversations/`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateConversationResponse {
    pub id: String,
}

/// The user message sent with a turn request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub content: String,
}

/// Optional turn parameters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TurnOptions {
    /// Stable attachment keys resolved by the upload coordinator.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentRef>,
}

/// Request body for `POST /conversations/{id}/turns/`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnRequest {
    pub message: OutgoingMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<TurnOptions>,
}

/// Request body for `POST /conversations/{id}/attachments/`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateAttachmentRequest {
    pub content_type: String,
    pub file_name: String,
    pub size: u64,
}

/// A pre-authorized direct-write target returned by attachment creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadPolicy {
    /// Absolute URL the file bytes are written to.
    pub url: String,
    /// Headers the write request must carry verbatim.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

/// Response body for `POST /conversations/{id}/attachments/`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateAttachmentResponse {
    pub id: String,
    /// Present when the server wants the client to write the bytes directly.
    #[serde(default)]
    pub policy: Option<UploadPolicy>,
}

/// Stable reference to an uploaded attachment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub key: String,
}

impl AttachmentRef {
    /// Path the attachment is referenced by downstream.
    pub fn media_path(&self) -> String {
        format!("/media-key/{}", self.key)
    }
}

/// An in-memory file handed to the upload endpoints.
#[derive(Clone, Debug)]
pub struct FilePayload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl FilePayload {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
