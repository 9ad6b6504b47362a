use bytes::Bytes;
use tracing::{debug, warn};

use crate::ProgressFn;
use crate::error::ApiError;
use crate::framing::{StreamFormat, TurnStream, decode_stream};
use crate::types::{
    AttachmentRef, CreateAttachmentRequest, CreateAttachmentResponse, CreateConversationRequest,
    CreateConversationResponse, FilePayload, TurnRequest, UploadPolicy,
};

/// Response header carrying the negotiated stream framing mode.
const STREAM_FORMAT_HEADER: &str = "x-stream-format";

/// Upload body chunk size; small enough for useful progress granularity.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// HTTP client for the Parley conversation server.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Create a client for the given base URL (no trailing slash).
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Pass a successful response through, translating failure statuses.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "server request failed");
        Err(ApiError::from_status(status.as_u16(), body))
    }

    /// `POST /conversations/`: create a conversation, returning its id.
    pub async fn create_conversation(&self, title: &str) -> Result<String, ApiError> {
        let url = self.url("/conversations/");
        debug!(url = %url, "creating conversation");
        let response = self
            .http
            .post(&url)
            .json(&CreateConversationRequest {
                title: title.to_string(),
            })
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let parsed: CreateConversationResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(parsed.id)
    }

    /// `POST /conversations/{id}/turns/`: open a streaming turn.
    ///
    /// The response body is decoded with the framing mode the server
    /// announces in the `x-stream-format` header.
    pub async fn stream_turn(
        &self,
        conversation_id: &str,
        request: &TurnRequest,
    ) -> Result<TurnStream, ApiError> {
        let url = self.url(&format!("/conversations/{conversation_id}/turns/"));
        debug!(url = %url, "opening turn stream");
        let response = self.http.post(&url).json(request).send().await?;
        let response = Self::check_status(response).await?;
        let format = StreamFormat::from_header(
            response
                .headers()
                .get(STREAM_FORMAT_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
        debug!(?format, "negotiated stream framing");
        Ok(decode_stream(format, response.bytes_stream()))
    }

    /// `POST /conversations/{id}/stop-streaming/`: ask the server to stop
    /// generating. Callers treat failure as non-fatal.
    pub async fn stop_streaming(&self, conversation_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("/conversations/{conversation_id}/stop-streaming/"));
        let response = self.http.post(&url).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// `POST /conversations/{id}/attachments/`: register an attachment and
    /// receive an optional pre-authorized write target.
    pub async fn create_attachment(
        &self,
        conversation_id: &str,
        request: &CreateAttachmentRequest,
    ) -> Result<CreateAttachmentResponse, ApiError> {
        let url = self.url(&format!("/conversations/{conversation_id}/attachments/"));
        debug!(url = %url, file_name = %request.file_name, "creating attachment");
        let response = self.http.post(&url).json(request).send().await?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Write file bytes directly to a pre-authorized target.
    pub async fn write_to_policy(
        &self,
        policy: &UploadPolicy,
        file: &FilePayload,
        progress: ProgressFn,
    ) -> Result<(), ApiError> {
        let mut request = self
            .http
            .put(&policy.url)
            .header(reqwest::header::CONTENT_TYPE, &file.content_type)
            .header(reqwest::header::CONTENT_LENGTH, file.size());
        for (name, value) in &policy.headers {
            request = request.header(name, value);
        }
        let response = request
            .body(progress_body(file.data.clone(), progress))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// `POST /conversations/{id}/attachments/{attachment_id}/upload-ended/`:
    /// tell the server the direct write finished.
    pub async fn finalize_attachment(
        &self,
        conversation_id: &str,
        attachment_id: &str,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!(
            "/conversations/{conversation_id}/attachments/{attachment_id}/upload-ended/"
        ));
        let response = self.http.post(&url).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// `POST /conversations/{id}/attachments/backend-upload/`: send the
    /// file through the server in one multipart call.
    pub async fn backend_upload(
        &self,
        conversation_id: &str,
        file: &FilePayload,
        progress: ProgressFn,
    ) -> Result<AttachmentRef, ApiError> {
        let url = self.url(&format!(
            "/conversations/{conversation_id}/attachments/backend-upload/"
        ));
        debug!(url = %url, file_name = %file.file_name, "uploading via backend");
        let part = reqwest::multipart::Part::stream_with_length(
            progress_body(file.data.clone(), progress),
            file.size(),
        )
        .file_name(file.file_name.clone())
        .mime_str(&file.content_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self.http.post(&url).multipart(form).send().await?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Wrap file bytes in a chunked body that reports cumulative progress as
/// each chunk is handed to the transport. A zero-byte file produces an
/// empty body and no progress events; callers emit the terminal 100.
fn progress_body(data: Bytes, progress: ProgressFn) -> reqwest::Body {
    let total = data.len();
    let stream = async_stream::stream! {
        let mut offset = 0usize;
        while offset < total {
            let end = (offset + UPLOAD_CHUNK_SIZE).min(total);
            let chunk = data.slice(offset..end);
            offset = end;
            progress(((offset * 100) / total) as u8);
            yield Ok::<Bytes, std::io::Error>(chunk);
        }
    };
    reqwest::Body::wrap_stream(stream)
}
