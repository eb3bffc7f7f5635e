//! Sync pipeline errors.

use advisor_core::{ConnectorError, CredentialError, Source, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("No connector registered for {0}")]
    NotConfigured(Source),

    #[error("Credentials unavailable: {0}")]
    Credential(#[from] CredentialError),

    #[error("Connector failed: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Store failed: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Whether the user has to reconnect the provider before the next sync can succeed.
    pub fn needs_reauth(&self) -> bool {
        match self {
            SyncError::Connector(e) => e.needs_reauth(),
            SyncError::Credential(CredentialError::Connector(e)) => e.needs_reauth(),
            SyncError::Credential(CredentialError::NoRefreshToken(_))
            | SyncError::Credential(CredentialError::NotConnected(_)) => true,
            _ => false,
        }
    }
}
