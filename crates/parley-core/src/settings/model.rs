use serde::{Deserialize, Serialize};

use crate::services::attachment_validation::DEFAULT_MAX_FILE_SIZE;
use crate::services::upload_service::UploadMode;

/// User-facing client configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsModel {
    /// Base URL of the conversation server.
    pub base_url: String,
    /// Which upload strategy resolves attachments.
    pub upload_mode: UploadMode,
    /// Per-file attachment size cap in bytes.
    pub max_attachment_bytes: u64,
}

impl Default for SettingsModel {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            upload_mode: UploadMode::default(),
            max_attachment_bytes: DEFAULT_MAX_FILE_SIZE,
        }
    }
}
