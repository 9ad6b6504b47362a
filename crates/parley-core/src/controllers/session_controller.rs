//! Orchestration of one conversation session.
//!
//! `ChatSession` reconciles the three racing processes around a submission
//! (conversation creation, file upload, response streaming) into one
//! consistent message list, with retry and cancellation. All shared state
//! lives behind a single mutex owned here; collaborators only observe it
//! through events and read-only accessors. No lock is held across an await
//! point or an event emission.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures::StreamExt;
use futures::future;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use parley_api::{
    ApiError, AttachmentRef, OutgoingMessage, ProgressFn, StreamChunk, TurnOptions, TurnRequest,
    TurnStream, UNSUPPORTED_FEATURE_CODE,
};

use crate::models::conversation::Conversation;
use crate::models::message::{Attachment, Message, Part, Role};
use crate::models::session_state::{SessionStatus, StatusEvent, next_status};
use crate::models::stream_manager::StreamManager;
use crate::services::attachment_validation::validate_candidate;
use crate::services::backend::ConversationApi;
use crate::services::upload_service::{LocalFile, UploadCoordinator};
use crate::settings::model::SettingsModel;
use crate::utils::observers::{ObserverRegistry, Subscription};

/// Fallback title when the first message is blank (files only).
const DEFAULT_TITLE: &str = "New conversation";

/// A file as it comes out of the picker, before validation.
#[derive(Clone, Debug)]
pub struct FileCandidate {
    pub name: String,
    pub data: Bytes,
}

/// What the user hands to `submit`.
#[derive(Clone, Debug, Default)]
pub struct SubmitInput {
    pub text: String,
    pub files: Vec<LocalFile>,
}

/// A submission captured before a conversation id exists; replayed exactly
/// once when the id resolves.
#[derive(Clone, Debug)]
struct PendingSubmission {
    text: String,
    files: Vec<LocalFile>,
}

/// The last submission actually sent, kept verbatim for retry.
#[derive(Clone, Debug)]
struct SubmissionRecord {
    text: String,
    files: Vec<LocalFile>,
}

/// User-visible conditions that are not status changes.
#[derive(Clone, Debug)]
pub enum SessionNotice {
    /// A selected file failed validation and was not attached.
    AttachmentRejected { name: String, reason: String },
    /// An upload failed, aborting the submission before any message was
    /// created.
    UploadFailed { name: String, reason: String },
    /// The server declined the request for a capability it lacks;
    /// presented as a modal, decoupled from the error status.
    UnsupportedFeature { message: String },
    ConversationCreateFailed { reason: String },
    StreamFailed { reason: String },
}

/// How a stream settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Cancelled,
    Failed,
    /// Declined by the server for a capability gap.
    Rejected,
}

/// Everything observers can react to.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    StatusChanged { status: SessionStatus },
    ConversationCreated { conversation_id: String },
    MessageAppended,
    MessageRemoved,
    TextDelta { text: String },
    PartAppended,
    AttachmentProgress { name: String, percent: u8 },
    StreamEnded { outcome: StreamOutcome },
    Notice(SessionNotice),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("message text or at least one attachment is required")]
    EmptySubmission,
}

enum SendMode {
    /// A new submission: upload files and append the user message.
    Fresh,
    /// A retry: reuse the existing user message and its resolved
    /// attachments instead of re-pushing and re-uploading.
    Resend,
}

struct SessionInner {
    conversation: Conversation,
    status: SessionStatus,
    pending: Option<PendingSubmission>,
    creating_conversation: bool,
    last_submission: Option<SubmissionRecord>,
    max_attachment_bytes: u64,
}

/// The session state machine's side-effecting half.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ChatSession {
    api: Arc<dyn ConversationApi>,
    uploads: Arc<UploadCoordinator>,
    inner: Arc<Mutex<SessionInner>>,
    streams: Arc<Mutex<StreamManager>>,
    observers: ObserverRegistry<SessionEvent>,
}

impl ChatSession {
    /// Build a session wired to the HTTP backend described by `settings`.
    pub fn connect(settings: &SettingsModel) -> anyhow::Result<Self> {
        use anyhow::Context;
        let client = parley_api::ApiClient::new(&settings.base_url)
            .context("failed to construct API client")?;
        let uploads = Arc::new(UploadCoordinator::new(
            Arc::new(client.clone()),
            settings.upload_mode,
        ));
        Ok(Self::new(Arc::new(client), uploads, settings))
    }

    pub fn new(
        api: Arc<dyn ConversationApi>,
        uploads: Arc<UploadCoordinator>,
        settings: &SettingsModel,
    ) -> Self {
        Self {
            api,
            uploads,
            inner: Arc::new(Mutex::new(SessionInner {
                conversation: Conversation::new(),
                status: SessionStatus::Ready,
                pending: None,
                creating_conversation: false,
                last_submission: None,
                max_attachment_bytes: settings.max_attachment_bytes,
            })),
            streams: Arc::new(Mutex::new(StreamManager::new())),
            observers: ObserverRegistry::new(),
        }
    }

    /// Register an observer for session events. Dropping the returned
    /// subscription deregisters it.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().status
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.inner.lock().conversation.id().cloned()
    }

    /// Snapshot of the current message list.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().conversation.messages().to_vec()
    }

    pub fn is_streaming(&self) -> bool {
        self.streams.lock().is_streaming()
    }

    pub fn has_last_submission(&self) -> bool {
        self.inner.lock().last_submission.is_some()
    }

    /// Validate picked files. Rejected candidates produce a notice and are
    /// excluded; accepted ones carry a local preview URL until their
    /// upload resolves. Selection never sends anything.
    pub fn select_files(&self, candidates: Vec<FileCandidate>) -> Vec<LocalFile> {
        let max_bytes = self.inner.lock().max_attachment_bytes;
        let mut accepted = Vec::new();
        for candidate in candidates {
            match validate_candidate(&candidate.name, candidate.data.len() as u64, max_bytes) {
                Ok(content_type) => {
                    accepted.push(LocalFile::new(&candidate.name, content_type, candidate.data));
                }
                Err(e) => {
                    warn!(file_name = %candidate.name, error = %e, "attachment rejected");
                    self.emit(SessionEvent::Notice(SessionNotice::AttachmentRejected {
                        name: candidate.name,
                        reason: e.to_string(),
                    }));
                }
            }
        }
        accepted
    }

    /// Submit a message.
    ///
    /// With no conversation id yet, the submission is captured and the
    /// creation call triggered; the capture replays through this same path
    /// once the id is assigned. A second submit before that overwrites the
    /// capture but never triggers a second creation call.
    pub async fn submit(&self, input: SubmitInput) -> Result<(), SessionError> {
        if input.text.trim().is_empty() && input.files.is_empty() {
            return Err(SessionError::EmptySubmission);
        }

        let (to_send, start_creation) = {
            let mut inner = self.inner.lock();
            if inner.conversation.id().is_some() {
                (Some(input), false)
            } else {
                if inner.pending.is_some() {
                    debug!("new submit replaces the captured pending submission");
                }
                inner.pending = Some(PendingSubmission {
                    text: input.text,
                    files: input.files,
                });
                if inner.creating_conversation {
                    (None, false)
                } else {
                    inner.creating_conversation = true;
                    (None, true)
                }
            }
        };

        if let Some(input) = to_send {
            self.send(input.text, input.files, SendMode::Fresh).await;
        } else if start_creation {
            self.create_conversation_and_replay().await;
        } else {
            debug!("conversation creation already in flight; submission captured");
        }
        Ok(())
    }

    /// Retry the last submission after a failure. Removes exactly the most
    /// recent assistant message (the failed attempt) and resends the
    /// recorded input verbatim. No-op without a prior submission.
    pub async fn retry(&self) {
        let record = self.inner.lock().last_submission.clone();
        let Some(record) = record else {
            debug!("retry requested with no prior submission");
            return;
        };

        let removed = self.inner.lock().conversation.remove_last_assistant();
        if removed.is_some() {
            self.emit(SessionEvent::MessageRemoved);
        }

        self.send(record.text, record.files, SendMode::Resend).await;
    }

    /// Cancel the active stream. Local consumption stops immediately
    /// (status returns to ready); the companion stop-generation request is
    /// fire-and-forget with its failure logged only. Idempotent, and safe
    /// when no stream is active.
    pub fn stop(&self) {
        let stopped = self.streams.lock().stop();
        if !stopped {
            debug!("stop requested with no active stream");
            return;
        }

        self.apply_status(StatusEvent::Stopped);
        self.emit(SessionEvent::StreamEnded {
            outcome: StreamOutcome::Cancelled,
        });

        if let Some(conversation_id) = self.conversation_id() {
            let api = self.api.clone();
            tokio::spawn(async move {
                if let Err(e) = api.stop_streaming(conversation_id.clone()).await {
                    warn!(conversation_id = %conversation_id, error = %e, "stop-generation request failed");
                }
            });
        }
    }

    async fn create_conversation_and_replay(&self) {
        let title = {
            let inner = self.inner.lock();
            inner
                .pending
                .as_ref()
                .map(|p| draft_title(&p.text))
                .unwrap_or_else(|| DEFAULT_TITLE.to_string())
        };
        info!(title = %title, "creating conversation");

        match self.api.create_conversation(title).await {
            Ok(id) => {
                // The id must be assigned (and the stream scope promoted)
                // before the captured submission is taken for replay.
                let replay = {
                    let mut inner = self.inner.lock();
                    inner.creating_conversation = false;
                    inner.conversation.assign_id(id.clone());
                    inner.pending.take()
                };
                self.streams.lock().promote(&id);
                self.emit(SessionEvent::ConversationCreated {
                    conversation_id: id,
                });

                if let Some(pending) = replay {
                    self.send(pending.text, pending.files, SendMode::Fresh).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "conversation creation failed");
                {
                    let mut inner = self.inner.lock();
                    inner.creating_conversation = false;
                    // A stale capture must not replay against a later
                    // conversation; the user resubmits.
                    inner.pending = None;
                }
                self.emit(SessionEvent::Notice(SessionNotice::ConversationCreateFailed {
                    reason: e.to_string(),
                }));
            }
        }
    }

    async fn send(&self, text: String, files: Vec<LocalFile>, mode: SendMode) {
        let Some(conversation_id) = self.conversation_id() else {
            warn!("send reached without a conversation id");
            return;
        };

        let attachments = match mode {
            SendMode::Fresh => {
                match self.resolve_attachments(&conversation_id, &files).await {
                    Some(attachments) => attachments,
                    // Upload failure: notices are out, nothing was sent,
                    // and the session stays ready.
                    None => return,
                }
            }
            SendMode::Resend => self.last_user_attachments(),
        };

        {
            let mut inner = self.inner.lock();
            inner.last_submission = Some(SubmissionRecord {
                text: text.clone(),
                files,
            });
            if matches!(mode, SendMode::Fresh) {
                inner
                    .conversation
                    .push_message(Message::user(text.clone(), attachments.clone()));
            }
        }
        if matches!(mode, SendMode::Fresh) {
            self.emit(SessionEvent::MessageAppended);
        }
        self.apply_status(StatusEvent::SubmitSent);

        let attachment_refs: Vec<AttachmentRef> = attachments
            .iter()
            // A resolved attachment's URL is always the stable media path.
            .filter_map(|a| a.url.strip_prefix("/media-key/"))
            .map(|key| AttachmentRef {
                key: key.to_string(),
            })
            .collect();
        let request = TurnRequest {
            message: OutgoingMessage { content: text },
            options: if attachment_refs.is_empty() {
                None
            } else {
                Some(TurnOptions {
                    attachments: attachment_refs,
                })
            },
        };

        match self.api.stream_turn(conversation_id.clone(), request).await {
            Ok(stream) => {
                self.inner
                    .lock()
                    .conversation
                    .push_message(Message::assistant_placeholder());
                self.emit(SessionEvent::MessageAppended);

                let cancel_flag = Arc::new(AtomicBool::new(false));
                // Register under the streams lock so the consume task
                // cannot observe the manager before its own registration.
                let mut streams = self.streams.lock();
                let session = self.clone();
                let flag = cancel_flag.clone();
                let task = tokio::spawn(async move {
                    session.consume_stream(stream, flag).await;
                });
                streams.register(Some(conversation_id), cancel_flag, task);
            }
            Err(ApiError::UnsupportedFeature(message)) => {
                info!(message = %message, "server declined the request");
                self.apply_status(StatusEvent::StreamRejected);
                self.emit(SessionEvent::Notice(SessionNotice::UnsupportedFeature {
                    message,
                }));
            }
            Err(e) => {
                error!(error = %e, "failed to open turn stream");
                self.apply_status(StatusEvent::StreamFailed);
                self.emit(SessionEvent::Notice(SessionNotice::StreamFailed {
                    reason: e.to_string(),
                }));
                self.emit(SessionEvent::StreamEnded {
                    outcome: StreamOutcome::Failed,
                });
            }
        }
    }

    /// Upload every file in parallel and wait for all of them to settle;
    /// any failure aborts the whole submission so a partial upload never
    /// silently omits an attachment. Returns None on failure.
    async fn resolve_attachments(
        &self,
        conversation_id: &str,
        files: &[LocalFile],
    ) -> Option<Vec<Attachment>> {
        if files.is_empty() {
            return Some(Vec::new());
        }

        let uploads = files.iter().map(|file| {
            let name = file.name.clone();
            let observers = self.observers.clone();
            let progress: ProgressFn = Arc::new(move |percent| {
                observers.emit(&SessionEvent::AttachmentProgress {
                    name: name.clone(),
                    percent,
                });
            });
            self.uploads.upload(conversation_id, file, Some(progress))
        });
        let results = future::join_all(uploads).await;

        let mut attachments = Vec::with_capacity(files.len());
        let mut failed = false;
        for (file, result) in files.iter().zip(results) {
            match result {
                Ok(resolved) => attachments.push(Attachment {
                    name: file.name.clone(),
                    content_type: file.content_type.clone(),
                    url: resolved.media_path(),
                    upload_progress: 100,
                }),
                Err(e) => {
                    warn!(file_name = %file.name, error = %e, "attachment upload failed");
                    self.emit(SessionEvent::Notice(SessionNotice::UploadFailed {
                        name: file.name.clone(),
                        reason: e.to_string(),
                    }));
                    failed = true;
                }
            }
        }
        (!failed).then_some(attachments)
    }

    /// Drain the response stream into the conversation. Runs as a spawned
    /// task owned by the stream manager; the cancel flag makes it exit
    /// silently after `stop()` has already settled the session.
    async fn consume_stream(self, mut stream: TurnStream, cancel_flag: Arc<AtomicBool>) {
        let mut saw_first_chunk = false;
        while let Some(item) = stream.next().await {
            if cancel_flag.load(Ordering::Relaxed) {
                debug!("stream consumption cancelled");
                return;
            }

            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => StreamChunk::Error(e.to_string()),
            };

            if !saw_first_chunk
                && !matches!(chunk, StreamChunk::Done { .. } | StreamChunk::Error(_))
            {
                saw_first_chunk = true;
                self.apply_status(StatusEvent::FirstChunk);
            }

            match chunk {
                StreamChunk::Text(delta) => {
                    self.inner.lock().conversation.append_streaming_text(&delta);
                    self.emit(SessionEvent::TextDelta { text: delta });
                }
                StreamChunk::Reasoning(delta) => {
                    self.inner
                        .lock()
                        .conversation
                        .append_streaming_part(Part::Reasoning { text: delta });
                    self.emit(SessionEvent::PartAppended);
                }
                StreamChunk::ToolInvocation {
                    tool_name,
                    arguments,
                } => {
                    self.inner
                        .lock()
                        .conversation
                        .append_streaming_part(Part::ToolInvocation {
                            tool_name,
                            arguments,
                            result: None,
                        });
                    self.emit(SessionEvent::PartAppended);
                }
                StreamChunk::Source { url, title } => {
                    self.inner
                        .lock()
                        .conversation
                        .append_streaming_part(Part::Source { url, title });
                    self.emit(SessionEvent::PartAppended);
                }
                StreamChunk::Done { finish_reason } => {
                    debug!(?finish_reason, "stream completed");
                    self.streams.lock().finish(&cancel_flag);
                    self.apply_status(StatusEvent::StreamCompleted);
                    self.emit(SessionEvent::StreamEnded {
                        outcome: StreamOutcome::Completed,
                    });
                    return;
                }
                StreamChunk::Error(message) => {
                    self.streams.lock().finish(&cancel_flag);
                    self.settle_stream_error(message);
                    return;
                }
            }
        }

        // Decoded streams always end with Done or Error; settle anyway if
        // a transport closes without either.
        self.streams.lock().finish(&cancel_flag);
        self.apply_status(StatusEvent::StreamCompleted);
        self.emit(SessionEvent::StreamEnded {
            outcome: StreamOutcome::Completed,
        });
    }

    fn settle_stream_error(&self, message: String) {
        if message.contains(UNSUPPORTED_FEATURE_CODE) {
            // Capability gap, not a failure: drop the placeholder if it
            // never received content, notify, and go back to ready.
            {
                let mut inner = self.inner.lock();
                let placeholder_empty = inner
                    .conversation
                    .streaming_message_mut()
                    .is_some_and(|m| m.content.is_empty() && m.parts.is_empty());
                if placeholder_empty {
                    inner.conversation.remove_last_assistant();
                }
            }
            info!(message = %message, "server declined mid-stream");
            self.apply_status(StatusEvent::StreamRejected);
            self.emit(SessionEvent::Notice(SessionNotice::UnsupportedFeature {
                message,
            }));
            self.emit(SessionEvent::StreamEnded {
                outcome: StreamOutcome::Rejected,
            });
        } else {
            error!(error = %message, "stream failed");
            self.apply_status(StatusEvent::StreamFailed);
            self.emit(SessionEvent::Notice(SessionNotice::StreamFailed {
                reason: message,
            }));
            self.emit(SessionEvent::StreamEnded {
                outcome: StreamOutcome::Failed,
            });
        }
    }

    fn last_user_attachments(&self) -> Vec<Attachment> {
        self.inner
            .lock()
            .conversation
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.attachments.clone())
            .unwrap_or_default()
    }

    fn apply_status(&self, event: StatusEvent) {
        let changed = {
            let mut inner = self.inner.lock();
            let next = next_status(inner.status, event);
            if next == inner.status {
                None
            } else {
                inner.status = next;
                Some(next)
            }
        };
        if let Some(status) = changed {
            self.emit(SessionEvent::StatusChanged { status });
        }
    }

    fn emit(&self, event: SessionEvent) {
        self.observers.emit(&event);
    }
}

fn draft_title(text: &str) -> String {
    const MAX_TITLE_CHARS: usize = 40;
    let line = text.trim().lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if line.chars().count() <= MAX_TITLE_CHARS {
        line.to_string()
    } else {
        let truncated: String = line.chars().take(MAX_TITLE_CHARS).collect();
        format!("{truncated}…")
    }
}
