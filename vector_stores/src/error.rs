use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown vector store type: {store_type}")]
    UnknownBackendType { store_type: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("Collection/index not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal backend error: {0}")]
    Internal(String)
}

impl StoreError {
    pub fn unknown_backend(store_type: impl Into<String>) -> Self {
        StoreError::UnknownBackendType {
            store_type: store_type.into()
        }
    }

    /// Whether the failure is transient. The registry never retries; this is
    /// for callers that wrap stores with their own policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::BackendUnavailable(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            StoreError::BackendUnavailable(e.to_string())
        } else if e.is_decode() {
            StoreError::Serialization(e.to_string())
        } else {
            StoreError::Internal(e.to_string())
        }
    }
}
