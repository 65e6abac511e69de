use thiserror::Error;

/// Capability code the backend returns when its merge tool is missing.
pub const FFMPEG_NOT_AVAILABLE: &str = "ffmpeg_not_available";

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or transport failure before a response arrived
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response, message taken from the JSON `error` field when present
    #[error("backend returned {status}: {message}")]
    Http { status: u16, message: String },

    /// Body could not be parsed into the expected shape
    #[error("malformed response: {0}")]
    Decode(String),

    #[error("{0}")]
    Validation(String),

    #[error("cancelled")]
    Cancelled,

    /// A backend capability flag rather than a failure of the request itself
    #[error("feature unavailable ({code}): {message}")]
    FeatureUnavailable { code: String, message: String },

    #[error("task list fetch failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ClientError>,
    },

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for the merge-tool capability flag.
    pub fn is_merge_unavailable(&self) -> bool {
        matches!(self, Self::FeatureUnavailable { code, .. } if code == FFMPEG_NOT_AVAILABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_unavailable_flag() {
        let err = ClientError::FeatureUnavailable {
            code: FFMPEG_NOT_AVAILABLE.to_string(),
            message: "ffmpeg missing".to_string(),
        };
        assert!(err.is_merge_unavailable());
        assert!(!ClientError::Cancelled.is_merge_unavailable());
    }

    #[test]
    fn test_retries_exhausted_display() {
        let err = ClientError::RetriesExhausted {
            attempts: 4,
            last: Box::new(ClientError::Http {
                status: 500,
                message: "db locked".to_string(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "task list fetch failed after 4 attempts: backend returned 500: db locked"
        );
    }
}
