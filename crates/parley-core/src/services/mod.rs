pub mod attachment_validation;
pub mod backend;
pub mod error_collector_layer;
pub mod upload_service;

pub use backend::{AttachmentApi, BoxFuture, ConversationApi};
pub use error_collector_layer::ErrorCollectorLayer;
pub use upload_service::{LocalFile, UploadCoordinator, UploadError, UploadMode};
