//! Error types for fetching, caching and parsing benchmark results.

/// Errors produced by the library layer.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Resource does not exist on the CI provider.
    #[error("not found: {url}")]
    NotFound { url: String },

    /// Missing, invalid or under-privileged token.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Any other non-success response from the API.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Network error.
    #[error("network error: {message}")]
    Network { message: String },

    /// Cache error.
    #[error("cache error: {message}")]
    Cache { message: String },

    /// Artifact archive is malformed or lacks the report file.
    #[error("artifact error: {message}")]
    Artifact { message: String },

    /// Invalid JSON, XML, CSV or timestamp.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Git operation on the results repository failed.
    #[error("git error: {message}")]
    Git { message: String },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl From<reqwest::Error> for BenchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for BenchError {
    fn from(err: csv::Error) -> Self {
        Self::Parse {
            message: err.to_string(),
        }
    }
}

impl From<git2::Error> for BenchError {
    fn from(err: git2::Error) -> Self {
        Self::Git {
            message: err.message().to_string(),
        }
    }
}

impl From<zip::result::ZipError> for BenchError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Artifact {
            message: err.to_string(),
        }
    }
}

/// Result type for library operations.
pub type BenchResult<T> = Result<T, BenchError>;
