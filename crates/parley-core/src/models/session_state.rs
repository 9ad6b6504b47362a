//! Pure status transitions for one conversation turn.
//!
//! The controller performs the side effects; this table is the single
//! place the ordering rules live, so the id-assignment-before-replay and
//! stop/retry races are checked by data, not by timing.

use serde::{Deserialize, Serialize};

/// Where the session currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Idle; a new submission is accepted.
    Ready,
    /// A submission was handed to the network; no chunk seen yet.
    Submitted,
    /// The first response chunk has arrived.
    Streaming,
    /// The last stream failed; the submission record is kept for retry.
    Error,
}

impl SessionStatus {
    /// True while a turn is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionStatus::Submitted | SessionStatus::Streaming)
    }
}

/// Inputs that can move the status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusEvent {
    /// A validated submission was handed to the network.
    SubmitSent,
    /// The first chunk of the response arrived.
    FirstChunk,
    /// The stream finished normally.
    StreamCompleted,
    /// The stream failed; retry stays available.
    StreamFailed,
    /// The server declined the request for a capability it lacks; this is
    /// not a retryable error.
    StreamRejected,
    /// The user cancelled the stream locally.
    Stopped,
}

/// The transition table. Events that do not apply to the current status
/// leave it unchanged (e.g. a late `FirstChunk` after `Stopped`).
pub fn next_status(current: SessionStatus, event: StatusEvent) -> SessionStatus {
    use SessionStatus::*;
    use StatusEvent::*;
    match (current, event) {
        (Ready | Error, SubmitSent) => Submitted,
        (Submitted, FirstChunk) => Streaming,
        (Submitted | Streaming, StreamCompleted) => Ready,
        (Submitted | Streaming, StreamFailed) => Error,
        (Submitted | Streaming, StreamRejected) => Ready,
        (_, Stopped) => Ready,
        (current, _) => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionStatus::*;
    use StatusEvent::*;

    #[test]
    fn test_happy_path() {
        let mut status = Ready;
        status = next_status(status, SubmitSent);
        assert_eq!(status, Submitted);
        status = next_status(status, FirstChunk);
        assert_eq!(status, Streaming);
        status = next_status(status, StreamCompleted);
        assert_eq!(status, Ready);
    }

    #[test]
    fn test_failure_and_retry() {
        let mut status = next_status(Streaming, StreamFailed);
        assert_eq!(status, Error);
        // Retry goes back through the normal submit path.
        status = next_status(status, SubmitSent);
        assert_eq!(status, Submitted);
    }

    #[test]
    fn test_stop_from_any_state() {
        for current in [Ready, Submitted, Streaming, Error] {
            assert_eq!(next_status(current, Stopped), Ready);
        }
    }

    #[test]
    fn test_rejection_is_not_an_error() {
        assert_eq!(next_status(Submitted, StreamRejected), Ready);
        assert_eq!(next_status(Streaming, StreamRejected), Ready);
    }

    #[test]
    fn test_inapplicable_events_keep_status() {
        // A chunk that races in after the stream settled must not revive it.
        assert_eq!(next_status(Ready, FirstChunk), Ready);
        assert_eq!(next_status(Error, FirstChunk), Error);
        assert_eq!(next_status(Ready, StreamCompleted), Ready);
        // Submitting is only legal from an idle or failed session.
        assert_eq!(next_status(Submitted, SubmitSent), Submitted);
        assert_eq!(next_status(Streaming, SubmitSent), Streaming);
    }

    #[test]
    fn test_is_busy() {
        assert!(!Ready.is_busy());
        assert!(Submitted.is_busy());
        assert!(Streaming.is_busy());
        assert!(!Error.is_busy());
    }
}
