use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The addressed resource does not exist. Callers branch on this variant,
    /// never on message text.
    #[error("{resource} not found: {message}")]
    NotFound { resource: String, message: String },

    #[error("provider API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("operation {operation} failed: {message}")]
    OperationFailed { operation: String, message: String },

    #[error("provider authentication failed: {0}")]
    Auth(String),

    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }
}
