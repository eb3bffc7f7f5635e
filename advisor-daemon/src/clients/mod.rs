//! Thin HTTP clients for the provider APIs.
//!
//! Each client implements the connector contracts from `advisor-core`;
//! normalization into chunk text happens in `advisor-sync`.

pub mod google;
pub mod hubspot;

pub use google::{GoogleClient, GoogleEndpoints};
pub use hubspot::HubspotClient;

use advisor_core::{ConnectorError, RefreshedToken};
use chrono::{Duration, Utc};
use reqwest::{header, Response, StatusCode};
use serde::Deserialize;

/// Google and HubSpot both answer refreshes in the OAuth2 shape.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

impl From<TokenResponse> for RefreshedToken {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            expires_at: response
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }
}

pub(crate) fn network_error(e: reqwest::Error) -> ConnectorError {
    ConnectorError::Network(e.to_string())
}

pub(crate) fn invalid_response(e: reqwest::Error) -> ConnectorError {
    ConnectorError::InvalidResponse(e.to_string())
}

/// Map a non-success status to the connector error taxonomy.
pub(crate) fn status_error(status: StatusCode, retry_after: Option<u64>, body: String) -> ConnectorError {
    let lowered = body.to_ascii_lowercase();
    match status {
        StatusCode::TOO_MANY_REQUESTS => ConnectorError::RateLimited {
            retry_after_secs: retry_after,
        },
        StatusCode::UNAUTHORIZED => ConnectorError::Unauthorized(body),
        StatusCode::FORBIDDEN
            if lowered.contains("insufficient authentication scopes")
                || lowered.contains("insufficientpermissions")
                || lowered.contains("missing_scopes") =>
        {
            ConnectorError::InsufficientScope(body)
        }
        StatusCode::NOT_FOUND => ConnectorError::NotFound(body),
        StatusCode::CONFLICT => ConnectorError::Conflict(body),
        status => ConnectorError::Provider {
            status: status.as_u16(),
            message: body,
        },
    }
}

/// Pass a successful response through, or turn it into a [`ConnectorError`].
pub(crate) async fn check(response: Response) -> Result<Response, ConnectorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, retry_after, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, Some(3), String::new()),
            ConnectorError::RateLimited { retry_after_secs: Some(3) }
        );
        assert!(matches!(
            status_error(
                StatusCode::FORBIDDEN,
                None,
                "Request had insufficient authentication scopes.".into()
            ),
            ConnectorError::InsufficientScope(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, None, "quota".into()),
            ConnectorError::Provider { status: 403, .. }
        ));
        assert!(matches!(
            status_error(StatusCode::CONFLICT, None, "exists".into()),
            ConnectorError::Conflict(_)
        ));
    }
}
