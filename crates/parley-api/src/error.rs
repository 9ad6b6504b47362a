use serde::Deserialize;

/// Error code the server uses to signal a capability gap (e.g. attachments
/// on a model that does not accept them). Surfaced to users as a dedicated
/// condition rather than a generic failure.
pub const UNSUPPORTED_FEATURE_CODE: &str = "unsupported_feature";

/// Error type for conversation server operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("{0}")]
    UnsupportedFeature(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Http(e.to_string())
    }
}

/// Error body shape the server uses for structured failures.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl ApiError {
    /// Build an error from a non-success status and its body, mapping the
    /// unsupported-feature code to its dedicated variant.
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        if let Ok(parsed) = serde_json::from_str::<ErrorBody>(&body)
            && parsed.code.as_deref() == Some(UNSUPPORTED_FEATURE_CODE)
        {
            return ApiError::UnsupportedFeature(
                parsed
                    .message
                    .unwrap_or_else(|| "feature not supported".to_string()),
            );
        }
        ApiError::Status { status, body }
    }
}
