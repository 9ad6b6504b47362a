//! Object-safe seams over the conversation server.
//!
//! The session controller and upload coordinator talk to these traits, not
//! to the HTTP client directly, so tests drive the orchestration with
//! hand-written fakes and no network.

use std::future::Future;
use std::pin::Pin;

use parley_api::{
    ApiClient, ApiError, AttachmentRef, CreateAttachmentRequest, CreateAttachmentResponse,
    FilePayload, ProgressFn, TurnRequest, TurnStream, UploadPolicy,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Conversation lifecycle and turn streaming.
pub trait ConversationApi: Send + Sync + 'static {
    /// Create a conversation, returning its server-issued id.
    fn create_conversation(&self, title: String) -> BoxFuture<'static, Result<String, ApiError>>;

    /// Open a streaming turn scoped to an existing conversation.
    fn stream_turn(
        &self,
        conversation_id: String,
        request: TurnRequest,
    ) -> BoxFuture<'static, Result<TurnStream, ApiError>>;

    /// Ask the server to stop generating. Best-effort.
    fn stop_streaming(&self, conversation_id: String) -> BoxFuture<'static, Result<(), ApiError>>;
}

/// Attachment registration and the two upload paths.
pub trait AttachmentApi: Send + Sync + 'static {
    fn create_attachment(
        &self,
        conversation_id: String,
        request: CreateAttachmentRequest,
    ) -> BoxFuture<'static, Result<CreateAttachmentResponse, ApiError>>;

    fn write_to_policy(
        &self,
        policy: UploadPolicy,
        file: FilePayload,
        progress: ProgressFn,
    ) -> BoxFuture<'static, Result<(), ApiError>>;

    fn finalize_attachment(
        &self,
        conversation_id: String,
        attachment_id: String,
    ) -> BoxFuture<'static, Result<(), ApiError>>;

    fn backend_upload(
        &self,
        conversation_id: String,
        file: FilePayload,
        progress: ProgressFn,
    ) -> BoxFuture<'static, Result<AttachmentRef, ApiError>>;
}

impl ConversationApi for ApiClient {
    fn create_conversation(&self, title: String) -> BoxFuture<'static, Result<String, ApiError>> {
        let client = self.clone();
        Box::pin(async move { client.create_conversation(&title).await })
    }

    fn stream_turn(
        &self,
        conversation_id: String,
        request: TurnRequest,
    ) -> BoxFuture<'static, Result<TurnStream, ApiError>> {
        let client = self.clone();
        Box::pin(async move { client.stream_turn(&conversation_id, &request).await })
    }

    fn stop_streaming(&self, conversation_id: String) -> BoxFuture<'static, Result<(), ApiError>> {
        let client = self.clone();
        Box::pin(async move { client.stop_streaming(&conversation_id).await })
    }
}

impl AttachmentApi for ApiClient {
    fn create_attachment(
        &self,
        conversation_id: String,
        request: CreateAttachmentRequest,
    ) -> BoxFuture<'static, Result<CreateAttachmentResponse, ApiError>> {
        let client = self.clone();
        Box::pin(async move { client.create_attachment(&conversation_id, &request).await })
    }

    fn write_to_policy(
        &self,
        policy: UploadPolicy,
        file: FilePayload,
        progress: ProgressFn,
    ) -> BoxFuture<'static, Result<(), ApiError>> {
        let client = self.clone();
        Box::pin(async move { client.write_to_policy(&policy, &file, progress).await })
    }

    fn finalize_attachment(
        &self,
        conversation_id: String,
        attachment_id: String,
    ) -> BoxFuture<'static, Result<(), ApiError>> {
        let client = self.clone();
        Box::pin(async move {
            client
                .finalize_attachment(&conversation_id, &attachment_id)
                .await
        })
    }

    fn backend_upload(
        &self,
        conversation_id: String,
        file: FilePayload,
        progress: ProgressFn,
    ) -> BoxFuture<'static, Result<AttachmentRef, ApiError>> {
        let client = self.clone();
        Box::pin(async move { client.backend_upload(&conversation_id, &file, progress).await })
    }
}
