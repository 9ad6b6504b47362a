//! Upload coordination for message attachments.
//!
//! One upload per selected file, fanned out by the session controller.
//! Both server strategies resolve to the same stable `AttachmentRef`;
//! progress reaches the caller as monotonically non-decreasing integer
//! percentages with a guaranteed terminal 100 on success. Failures reject
//! without retry; re-invoking `upload` is the caller's retry.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use parley_api::{
    ApiError, AttachmentRef, CreateAttachmentRequest, FilePayload, ProgressFn,
};

use super::backend::AttachmentApi;

/// Which server strategy resolves an upload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// Ask for a pre-authorized write target, write the bytes directly,
    /// then notify the server the write finished.
    #[default]
    Policy,
    /// Send the file through the server in one multipart call.
    Direct,
}

/// A file the user selected, held in memory until the submission resolves.
#[derive(Clone, Debug)]
pub struct LocalFile {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
    /// Client-side preview URL shown before the upload resolves.
    pub preview_url: String,
}

impl LocalFile {
    pub fn new(name: &str, content_type: &str, data: Bytes) -> Self {
        Self {
            name: name.to_string(),
            content_type: content_type.to_string(),
            data,
            preview_url: format!("local-preview://{name}"),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn payload(&self) -> FilePayload {
        FilePayload {
            file_name: self.name.clone(),
            content_type: self.content_type.clone(),
            data: self.data.clone(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UploadError {
    #[error("upload failed: {0}")]
    Api(#[from] ApiError),
}

/// Guard that keeps caller-visible progress monotonic and terminal.
///
/// Transport-level callbacks can repeat or regress when a body is retried;
/// none of that may leak to the UI contract (0..=100, non-decreasing,
/// final 100 on success even for zero-byte files).
struct ProgressReporter {
    callback: Option<ProgressFn>,
    last: Mutex<Option<u8>>,
}

impl ProgressReporter {
    fn new(callback: Option<ProgressFn>) -> Arc<Self> {
        Arc::new(Self {
            callback,
            last: Mutex::new(None),
        })
    }

    fn report(&self, percent: u8) {
        let Some(callback) = &self.callback else {
            return;
        };
        let percent = percent.min(100);
        let mut last = self.last.lock();
        if last.is_some_and(|prev| percent <= prev) {
            return;
        }
        *last = Some(percent);
        callback(percent);
    }

    /// Terminal progress event; idempotent.
    fn finish(&self) {
        self.report(100);
    }

    fn progress_fn(reporter: &Arc<Self>) -> ProgressFn {
        let reporter = reporter.clone();
        Arc::new(move |percent| reporter.report(percent))
    }
}

/// Drives one upload per selected file and resolves it to a stable key.
pub struct UploadCoordinator {
    api: Arc<dyn AttachmentApi>,
    mode: UploadMode,
}

impl UploadCoordinator {
    pub fn new(api: Arc<dyn AttachmentApi>, mode: UploadMode) -> Self {
        Self { api, mode }
    }

    /// Upload one file and resolve its stable reference.
    pub async fn upload(
        &self,
        conversation_id: &str,
        file: &LocalFile,
        progress: Option<ProgressFn>,
    ) -> Result<AttachmentRef, UploadError> {
        let reporter = ProgressReporter::new(progress);
        debug!(file_name = %file.name, size = file.size(), mode = ?self.mode, "starting upload");

        let resolved = match self.mode {
            UploadMode::Policy => self.upload_via_policy(conversation_id, file, &reporter).await?,
            UploadMode::Direct => {
                self.api
                    .backend_upload(
                        conversation_id.to_string(),
                        file.payload(),
                        ProgressReporter::progress_fn(&reporter),
                    )
                    .await?
            }
        };

        reporter.finish();
        debug!(file_name = %file.name, key = %resolved.key, "upload resolved");
        Ok(resolved)
    }

    async fn upload_via_policy(
        &self,
        conversation_id: &str,
        file: &LocalFile,
        reporter: &Arc<ProgressReporter>,
    ) -> Result<AttachmentRef, UploadError> {
        let created = self
            .api
            .create_attachment(
                conversation_id.to_string(),
                CreateAttachmentRequest {
                    content_type: file.content_type.clone(),
                    file_name: file.name.clone(),
                    size: file.size(),
                },
            )
            .await?;

        let Some(policy) = created.policy else {
            // The server decides per attachment; no policy means it wants
            // the bytes routed through it.
            warn!(file_name = %file.name, "no upload policy returned, falling back to backend upload");
            return Ok(self
                .api
                .backend_upload(
                    conversation_id.to_string(),
                    file.payload(),
                    ProgressReporter::progress_fn(reporter),
                )
                .await?);
        };

        self.api
            .write_to_policy(policy, file.payload(), ProgressReporter::progress_fn(reporter))
            .await?;
        self.api
            .finalize_attachment(conversation_id.to_string(), created.id.clone())
            .await?;

        Ok(AttachmentRef { key: created.id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::backend::BoxFuture;
    use parley_api::{CreateAttachmentResponse, UploadPolicy};

    /// Scripted fake for the attachment endpoints; records the call order.
    struct FakeAttachmentApi {
        policy: Option<UploadPolicy>,
        fail_write: bool,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl FakeAttachmentApi {
        fn new(policy: Option<UploadPolicy>) -> Self {
            Self {
                policy,
                fail_write: false,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn with_policy() -> Self {
            Self::new(Some(UploadPolicy {
                url: "https://store/att-1".to_string(),
                headers: Vec::new(),
            }))
        }
    }

    impl AttachmentApi for FakeAttachmentApi {
        fn create_attachment(
            &self,
            _conversation_id: String,
            _request: CreateAttachmentRequest,
        ) -> BoxFuture<'static, Result<CreateAttachmentResponse, ApiError>> {
            self.calls.lock().push("create");
            let policy = self.policy.clone();
            Box::pin(async move {
                Ok(CreateAttachmentResponse {
                    id: "att-1".to_string(),
                    policy,
                })
            })
        }

        fn write_to_policy(
            &self,
            _policy: UploadPolicy,
            file: FilePayload,
            progress: ProgressFn,
        ) -> BoxFuture<'static, Result<(), ApiError>> {
            self.calls.lock().push("write");
            let fail = self.fail_write;
            Box::pin(async move {
                if fail {
                    return Err(ApiError::Http("connection reset".to_string()));
                }
                // Mimic the chunked transport: possibly repeated and
                // unordered percentages.
                if !file.data.is_empty() {
                    progress(40);
                    progress(40);
                    progress(30);
                    progress(80);
                }
                Ok(())
            })
        }

        fn finalize_attachment(
            &self,
            _conversation_id: String,
            _attachment_id: String,
        ) -> BoxFuture<'static, Result<(), ApiError>> {
            self.calls.lock().push("finalize");
            Box::pin(async move { Ok(()) })
        }

        fn backend_upload(
            &self,
            _conversation_id: String,
            _file: FilePayload,
            _progress: ProgressFn,
        ) -> BoxFuture<'static, Result<AttachmentRef, ApiError>> {
            self.calls.lock().push("backend");
            Box::pin(async move {
                Ok(AttachmentRef {
                    key: "media-1".to_string(),
                })
            })
        }
    }

    fn collecting_progress() -> (ProgressFn, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let f: ProgressFn = Arc::new(move |pct| seen_clone.lock().push(pct));
        (f, seen)
    }

    #[tokio::test]
    async fn test_policy_flow_call_order() {
        let api = FakeAttachmentApi::with_policy();
        let calls = api.calls.clone();
        let coordinator = UploadCoordinator::new(Arc::new(api), UploadMode::Policy);

        let file = LocalFile::new("a.png", "image/png", Bytes::from_static(b"data"));
        let resolved = coordinator.upload("conv-1", &file, None).await.unwrap();

        assert_eq!(resolved.key, "att-1");
        assert_eq!(*calls.lock(), vec!["create", "write", "finalize"]);
    }

    #[tokio::test]
    async fn test_missing_policy_falls_back_to_backend() {
        let api = FakeAttachmentApi::new(None);
        let calls = api.calls.clone();
        let coordinator = UploadCoordinator::new(Arc::new(api), UploadMode::Policy);

        let file = LocalFile::new("a.png", "image/png", Bytes::from_static(b"data"));
        let resolved = coordinator.upload("conv-1", &file, None).await.unwrap();

        assert_eq!(resolved.key, "media-1");
        assert_eq!(*calls.lock(), vec!["create", "backend"]);
    }

    #[tokio::test]
    async fn test_direct_mode_skips_registration() {
        let api = FakeAttachmentApi::with_policy();
        let calls = api.calls.clone();
        let coordinator = UploadCoordinator::new(Arc::new(api), UploadMode::Direct);

        let file = LocalFile::new("a.png", "image/png", Bytes::from_static(b"data"));
        coordinator.upload("conv-1", &file, None).await.unwrap();

        assert_eq!(*calls.lock(), vec!["backend"]);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_terminal() {
        let api = FakeAttachmentApi::with_policy();
        let coordinator = UploadCoordinator::new(Arc::new(api), UploadMode::Policy);
        let (progress, seen) = collecting_progress();

        let file = LocalFile::new("a.png", "image/png", Bytes::from_static(b"data"));
        coordinator
            .upload("conv-1", &file, Some(progress))
            .await
            .unwrap();

        // The fake reported 40, 40, 30, 80; regressions and repeats are
        // filtered and the terminal 100 is appended.
        assert_eq!(*seen.lock(), vec![40, 80, 100]);
    }

    #[tokio::test]
    async fn test_zero_byte_file_still_reaches_100() {
        let api = FakeAttachmentApi::with_policy();
        let coordinator = UploadCoordinator::new(Arc::new(api), UploadMode::Policy);
        let (progress, seen) = collecting_progress();

        let file = LocalFile::new("empty.png", "image/png", Bytes::new());
        coordinator
            .upload("conv-1", &file, Some(progress))
            .await
            .unwrap();

        assert_eq!(*seen.lock(), vec![100]);
    }

    #[tokio::test]
    async fn test_failure_rejects_without_finalize() {
        let mut api = FakeAttachmentApi::with_policy();
        api.fail_write = true;
        let calls = api.calls.clone();
        let coordinator = UploadCoordinator::new(Arc::new(api), UploadMode::Policy);

        let file = LocalFile::new("a.png", "image/png", Bytes::from_static(b"data"));
        let err = coordinator.upload("conv-1", &file, None).await.unwrap_err();

        assert!(matches!(err, UploadError::Api(_)));
        assert_eq!(*calls.lock(), vec!["create", "write"]);
    }
}
