//! Session core for the Parley conversation client.
//!
//! Owns the client-side logic of one conversation: segmenting a streaming
//! response into renderer-stable blocks, and reconciling conversation
//! creation, file uploads, and response streaming into a single consistent
//! submission with retry and cancellation.

pub mod content;
pub mod controllers;
pub mod models;
pub mod services;
pub mod settings;
pub mod utils;

pub use controllers::session_controller::{
    ChatSession, FileCandidate, SessionError, SessionEvent, SessionNotice, StreamOutcome,
    SubmitInput,
};
pub use models::session_state::SessionStatus;
