//! Error types for the Lotline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all Lotline operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Dataset errors ---
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    // --- Context assembly errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Gateway errors ---
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures while locating, parsing, or validating the production dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The source file could not be read at all. Callers surface this
    /// without attempting a partial load.
    #[error("Dataset not available at {}: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    /// The table parsed but its header row is unusable.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Required columns are absent from the header row.
    #[error("Schema error: missing required columns: {}", missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    /// A cell failed to parse. `row` is the 1-based line number in the
    /// source file, counting the header line.
    #[error("Row {row}: cannot parse {column} value '{value}': {reason}")]
    Parse {
        row: usize,
        column: String,
        value: String,
        reason: String,
    },

    /// The parsed-row cache could not be written. Never fatal to a load;
    /// callers log it and move on.
    #[error("Cache error: {0}")]
    Cache(String),
}

/// Failures while assembling a conversation context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A required input (instruction text or data payload) is missing or
    /// empty. The builder never proceeds with a hollow system message.
    #[error("Required data unavailable: {0}")]
    DataUnavailable(String),
}

/// Failures returned by a chat backend.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed backend response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether a retry has any chance of succeeding. Authentication and
    /// client errors are permanent; everything transport-shaped is not.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Network(_) | GatewayError::Timeout(_) | GatewayError::RateLimited { .. } => true,
            GatewayError::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_error_displays_correctly() {
        let err = Error::Dataset(DatasetError::Parse {
            row: 7,
            column: "volumen_final".into(),
            value: "n/a".into(),
            reason: "invalid float literal".into(),
        });
        assert!(err.to_string().contains("Row 7"));
        assert!(err.to_string().contains("volumen_final"));
        assert!(err.to_string().contains("n/a"));
    }

    #[test]
    fn missing_columns_lists_every_name() {
        let err = DatasetError::MissingColumns {
            missing: vec!["order_process_start_dt".into(), "volumen_final".into()],
        };
        let text = err.to_string();
        assert!(text.contains("order_process_start_dt"));
        assert!(text.contains("volumen_final"));
    }

    #[test]
    fn transient_classification() {
        assert!(GatewayError::Network("reset".into()).is_transient());
        assert!(GatewayError::Timeout("60s".into()).is_transient());
        assert!(GatewayError::RateLimited { retry_after_secs: 5 }.is_transient());
        assert!(
            GatewayError::Api {
                status_code: 503,
                message: "overloaded".into()
            }
            .is_transient()
        );
        assert!(
            !GatewayError::Api {
                status_code: 400,
                message: "bad request".into()
            }
            .is_transient()
        );
        assert!(!GatewayError::AuthFailed("bad key".into()).is_transient());
    }
}
