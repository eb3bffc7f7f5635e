//! Error taxonomy shared across crates.

/// Errors from the persistence layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// Unique constraint violated (expected under idempotent re-ingestion)
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    /// Referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend failure
    #[error("Database error: {0}")]
    Database(String),

    /// Document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised by external provider clients.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectorError {
    /// Provider throttled the request
    #[error("Rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Token expired or revoked
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Token lacks a required OAuth scope
    #[error("Insufficient authentication scopes: {0}")]
    InsufficientScope(String),

    /// Record already exists on the provider side
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Record does not exist on the provider side
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport failure (DNS, TLS, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Provider answered with something we could not interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Any other non-success answer
    #[error("Provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },
}

impl ConnectorError {
    /// Whether retrying later could succeed without user intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::RateLimited { .. } | ConnectorError::Network(_)
        ) || matches!(self, ConnectorError::Provider { status, .. } if *status >= 500)
    }

    /// Whether the user has to re-authenticate.
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self,
            ConnectorError::Unauthorized(_) | ConnectorError::InsufficientScope(_)
        )
    }
}

/// Errors from an embedding provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmbedError {
    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Embedding provider rate limited")]
    RateLimited,

    #[error("Malformed embedding: {0}")]
    Malformed(String),

    #[error("Nothing to embed")]
    EmptyInput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_error_classification() {
        assert!(ConnectorError::RateLimited { retry_after_secs: None }.is_transient());
        assert!(ConnectorError::Provider { status: 503, message: String::new() }.is_transient());
        assert!(!ConnectorError::Provider { status: 400, message: String::new() }.is_transient());
        assert!(ConnectorError::InsufficientScope("calendar".into()).needs_reauth());
        assert!(!ConnectorError::Conflict("x".into()).needs_reauth());
    }
}
