use rmcp::ErrorData;

/// Failures that can surface while mediating a tool call.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    #[error("Missing required environment variable {key}. {hint}")]
    Configuration { key: String, hint: String },

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response payload: {0}")]
    Payload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CloudError {
    pub fn configuration(key: &str, hint: &str) -> Self {
        Self::Configuration {
            key: key.to_string(),
            hint: hint.to_string(),
        }
    }
}

// Configuration problems are reported through the protocol as execution
// failures; the process itself keeps serving unaffected tools.
impl From<CloudError> for ErrorData {
    fn from(err: CloudError) -> Self {
        ErrorData::internal_error(err.to_string(), None)
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
