//! Client library for the Parley conversation server.
//!
//! Covers the full server boundary used by the session core: conversation
//! creation, streaming turns (both negotiated framing protocols), the
//! stop-generation call, and the two attachment upload paths.

mod client;
mod error;
mod framing;
mod types;

use std::sync::Arc;

pub use client::ApiClient;
pub use error::{ApiError, UNSUPPORTED_FEATURE_CODE};
pub use framing::{StreamChunk, StreamFormat, TurnStream, decode_stream};
pub use types::{
    AttachmentRef, CreateAttachmentRequest, CreateAttachmentResponse, CreateConversationRequest,
    CreateConversationResponse, FilePayload, OutgoingMessage, TurnOptions, TurnRequest,
    UploadPolicy,
};

/// Callback invoked with upload progress percentages (0..=100).
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;
