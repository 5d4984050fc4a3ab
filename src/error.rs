use thiserror::Error;

/// Errors produced anywhere between the front door and the synthesis backend.
///
/// Payloads are plain strings so the same failure can be handed to every
/// caller waiting on one in-flight computation.
#[derive(Debug, Clone, Error)]
pub enum GenError {
    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    /// The backend answered, but its output was unusable: a malformed body,
    /// no outputs, or an output path that cannot be read.
    #[error("Invalid backend output: {0}")]
    InvalidOutput(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Tool invocation error: {0}")]
    ToolInvocation(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("All {attempts} attempts failed, last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Request timed out after {0}ms")]
    Timeout(u64),
}

impl GenError {
    /// Whether the retry controller should perturb the seed and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenError::Backend { .. } | GenError::InvalidOutput(_) | GenError::Network(_)
        )
    }
}

impl From<std::io::Error> for GenError {
    fn from(e: std::io::Error) -> Self {
        GenError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for GenError {
    fn from(e: serde_json::Error) -> Self {
        GenError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for GenError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => GenError::Backend {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => GenError::Network(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GenError>;
