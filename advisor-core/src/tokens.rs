//! Access-token freshness.

use chrono::Utc;
use tracing::{debug, info};

use crate::connector::TokenRefresh;
use crate::error::{ConnectorError, StoreError};
use crate::store::UserStore;
use crate::types::{OAuthTokens, Provider, UserId};

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("User has not connected {0}")]
    NotConnected(Provider),

    #[error("{0} token expired and no refresh token is stored")]
    NoRefreshToken(Provider),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

/// Return a usable access token for `provider`, refreshing and persisting
/// it first when the stored one has expired.
pub async fn fresh_access_token<R: TokenRefresh + ?Sized>(
    users: &dyn UserStore,
    user_id: &UserId,
    provider: Provider,
    refresher: &R,
) -> Result<String, CredentialError> {
    let user = users
        .get(user_id)
        .await?
        .ok_or_else(|| CredentialError::UserNotFound(user_id.clone()))?;
    let tokens = user
        .tokens(provider)
        .ok_or(CredentialError::NotConnected(provider))?;

    if !tokens.is_expired(Utc::now()) {
        return Ok(tokens.access_token.clone());
    }

    let refresh_token = tokens
        .refresh_token
        .clone()
        .ok_or(CredentialError::NoRefreshToken(provider))?;

    debug!(user_id = %user_id, provider = %provider, "Access token expired, refreshing");
    let refreshed = refresher.refresh(&refresh_token).await?;

    let mut updated = OAuthTokens::new(refreshed.access_token.clone())
        .with_refresh_token(refresh_token);
    updated.expires_at = refreshed.expires_at;
    users.set_tokens(user_id, provider, updated).await?;

    info!(user_id = %user_id, provider = %provider, "Access token refreshed");
    Ok(refreshed.access_token)
}

/// Store CRM credentials obtained by the outer authentication flow.
pub async fn connect_crm(
    users: &dyn UserStore,
    user_id: &UserId,
    tokens: OAuthTokens,
) -> Result<(), CredentialError> {
    if users.get(user_id).await?.is_none() {
        return Err(CredentialError::UserNotFound(user_id.clone()));
    }
    users.set_tokens(user_id, Provider::Hubspot, tokens).await?;
    info!(user_id = %user_id, "CRM connected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::RefreshedToken;
    use crate::memory::MemoryStore;
    use crate::types::User;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingRefresher {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TokenRefresh for CountingRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedToken, ConnectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RefreshedToken {
                access_token: "new-token".into(),
                expires_at: Some(Utc::now() + Duration::hours(1)),
            })
        }
    }

    fn store_with(tokens: OAuthTokens) -> (MemoryStore, UserId) {
        let store = MemoryStore::new();
        let mut user = User::new(UserId::new("u1"), "a@example.com");
        user.hubspot = Some(tokens);
        store.put_user(user);
        (store, UserId::new("u1"))
    }

    #[tokio::test]
    async fn test_valid_token_not_refreshed() {
        let (store, id) = store_with(
            OAuthTokens::new("old").with_expiry(Utc::now() + Duration::hours(1)),
        );
        let refresher = CountingRefresher { calls: AtomicU32::new(0) };

        let token = fresh_access_token(&store, &id, Provider::Hubspot, &refresher)
            .await
            .unwrap();
        assert_eq!(token, "old");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_and_persisted() {
        let (store, id) = store_with(
            OAuthTokens::new("old")
                .with_refresh_token("r")
                .with_expiry(Utc::now() - Duration::minutes(5)),
        );
        let refresher = CountingRefresher { calls: AtomicU32::new(0) };

        let token = fresh_access_token(&store, &id, Provider::Hubspot, &refresher)
            .await
            .unwrap();
        assert_eq!(token, "new-token");

        let stored = store.get(&id).await.unwrap().unwrap().hubspot.unwrap();
        assert_eq!(stored.access_token, "new-token");
        assert_eq!(stored.refresh_token.as_deref(), Some("r"));
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let (store, id) = store_with(OAuthTokens::new("t"));
        let refresher = CountingRefresher { calls: AtomicU32::new(0) };

        let err = fresh_access_token(&store, &id, Provider::Google, &refresher)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::NotConnected(Provider::Google)));

        let err = fresh_access_token(&store, &"ghost".into(), Provider::Google, &refresher)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_connect_crm() {
        let store = MemoryStore::new();
        let user = store
            .upsert_google("a@example.com", OAuthTokens::new("g"))
            .await
            .unwrap();

        connect_crm(&store, &user.id, OAuthTokens::new("h")).await.unwrap();
        let reloaded = store.get(&user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.hubspot.unwrap().access_token, "h");

        let err = connect_crm(&store, &"ghost".into(), OAuthTokens::new("h"))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::UserNotFound(_)));
    }
}
