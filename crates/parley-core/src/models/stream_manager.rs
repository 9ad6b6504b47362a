use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::debug;

/// State for the single stream a session may have in flight.
struct ActiveStream {
    /// None until the conversation id resolves (first-message race).
    conversation_id: Option<String>,
    cancel_flag: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

/// Stream lifecycle owner.
///
/// Does NOT accumulate response text; that is the conversation's job.
/// Owns only the cancellation token and the consume-task handle for the
/// at-most-one active stream, including the window where the stream
/// started before the conversation id existed.
#[derive(Default)]
pub struct StreamManager {
    active: Option<ActiveStream>,
}

impl StreamManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new stream, cancelling any existing one first.
    pub fn register(
        &mut self,
        conversation_id: Option<String>,
        cancel_flag: Arc<AtomicBool>,
        task: JoinHandle<()>,
    ) {
        if let Some(existing) = self.active.take() {
            existing.cancel_flag.store(true, Ordering::Relaxed);
            if let Some(task) = existing.task {
                task.abort();
            }
            debug!("cancelled existing stream before registering new one");
        }
        self.active = Some(ActiveStream {
            conversation_id,
            cancel_flag,
            task: Some(task),
        });
    }

    /// Attach the conversation id once creation resolves.
    pub fn promote(&mut self, conversation_id: &str) {
        if let Some(active) = &mut self.active
            && active.conversation_id.is_none()
        {
            debug!(conversation_id, "promoting pending stream");
            active.conversation_id = Some(conversation_id.to_string());
        }
    }

    /// Cancel the active stream. Idempotent: returns false when nothing
    /// was streaming, which is also safe after natural completion.
    pub fn stop(&mut self) -> bool {
        let Some(mut active) = self.active.take() else {
            return false;
        };
        active.cancel_flag.store(true, Ordering::Relaxed);
        // Abort is a backstop; the flag makes the consume loop exit at the
        // next chunk boundary.
        if let Some(task) = active.task.take() {
            task.abort();
        }
        debug!("stream stopped");
        true
    }

    /// Clear the slot when the consume loop ends on its own. Must not
    /// cancel anything: a newer stream may already occupy the slot.
    pub fn finish(&mut self, cancel_flag: &Arc<AtomicBool>) {
        if let Some(active) = &self.active
            && Arc::ptr_eq(&active.cancel_flag, cancel_flag)
        {
            self.active = None;
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    /// Whether the active stream belongs to the given conversation,
    /// counting a still-unpromoted stream as a match for no id.
    pub fn is_conversation_streaming(&self, conversation_id: &str) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.conversation_id.as_deref() == Some(conversation_id))
    }
}
