//! Error types for Marquee Core

use thiserror::Error;

/// Result type alias for player operations
pub type Result<T> = std::result::Result<T, Error>;

/// Player error types
#[derive(Error, Debug)]
pub enum Error {
    // Storage errors
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Failed to read {key}: {reason}")]
    StorageRead { key: String, reason: String },

    #[error("Failed to write {key}: {reason}")]
    StorageWrite { key: String, reason: String },

    #[error("Storage quota exceeded writing {key}")]
    QuotaExceeded { key: String },

    // Rendition errors
    #[error("Invalid rendition selector: {0}")]
    InvalidSelector(String),

    #[error("Rendition not available in current manifest: {0}")]
    RenditionUnavailable(String),

    // Engine errors
    #[error("No adaptive engine attached")]
    EngineUnavailable,

    #[error("Failed to create adaptive engine: {0}")]
    EngineCreate(String),

    // Playback errors
    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Player runtime stopped")]
    RuntimeStopped,

    // Source errors
    #[error("Invalid media URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Media base URL cannot carry path segments: {0}")]
    InvalidBaseUrl(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a storage write error
    pub fn storage_write(key: impl Into<String>, reason: impl ToString) -> Self {
        Error::StorageWrite {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if playback can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::StorageUnavailable(_)
                | Error::StorageRead { .. }
                | Error::StorageWrite { .. }
                | Error::QuotaExceeded { .. }
                | Error::InvalidSelector(_)
                | Error::RenditionUnavailable(_)
                | Error::EngineUnavailable
                | Error::EngineCreate(_)
        )
    }

    /// Returns the error code for logs and host bindings
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Error::StorageRead { .. } => "STORAGE_READ",
            Error::StorageWrite { .. } => "STORAGE_WRITE",
            Error::QuotaExceeded { .. } => "STORAGE_QUOTA",
            Error::InvalidSelector(_) => "INVALID_SELECTOR",
            Error::RenditionUnavailable(_) => "NO_RENDITION",
            Error::EngineUnavailable => "NO_ENGINE",
            Error::EngineCreate(_) => "ENGINE_CREATE",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::RuntimeStopped => "RUNTIME_STOPPED",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::InvalidBaseUrl(_) => "INVALID_BASE_URL",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Json(_) => "JSON",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_are_recoverable() {
        assert!(Error::QuotaExceeded { key: "movie_1_time".into() }.is_recoverable());
        assert!(Error::storage_write("movie_1_quality", "denied").is_recoverable());
        assert!(!Error::InvalidConfig("bad".into()).is_recoverable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::EngineUnavailable.error_code(), "NO_ENGINE");
        assert_eq!(
            Error::InvalidStateTransition {
                from: "loading".into(),
                to: "native".into()
            }
            .error_code(),
            "INVALID_STATE"
        );
    }
}
