pub mod conversation;
pub mod error_store;
pub mod message;
pub mod session_state;
pub mod stream_manager;

pub use conversation::Conversation;
pub use error_store::{ErrorEntry, ErrorLevel, ErrorStore};
pub use message::{Attachment, Message, Part, Role};
pub use session_state::{SessionStatus, StatusEvent, next_status};
pub use stream_manager::StreamManager;
