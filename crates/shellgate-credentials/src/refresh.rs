//! OAuth `refresh_token` grant against the identity provider.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shellgate_core::CredentialError;

/// Token lifetime assumed when the provider does not state one.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(8 * 60 * 60);

#[derive(Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
    refresh_token: &'a str,
}

/// Raw provider response. GitHub reports failures with a 200 status and an
/// `error` field, so both shapes share one struct.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
    pub expires_in: Duration,
}

/// POST the refresh grant to `token_url`.
///
/// # Errors
/// Returns `RefreshFailed` when the provider answers with an `error` field
/// and `Request` when the call or the response body fails.
pub async fn request_refresh(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenGrant, CredentialError> {
    let request = RefreshRequest {
        client_id,
        client_secret,
        grant_type: "refresh_token",
        refresh_token,
    };

    let response = client
        .post(token_url)
        .header("Accept", "application/json")
        .json(&request)
        .send()
        .await
        .map_err(|e| CredentialError::Request(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| CredentialError::Request(e.to_string()))?;

    let parsed: RefreshResponse = match serde_json::from_str(&body) {
        Ok(parsed) => parsed,
        Err(e) if status.is_success() => {
            return Err(CredentialError::Request(format!(
                "invalid token response: {e}"
            )));
        }
        Err(_) => {
            return Err(CredentialError::Request(format!(
                "token endpoint returned {status}"
            )));
        }
    };

    if let Some(code) = parsed.error {
        return Err(CredentialError::RefreshFailed {
            code,
            description: parsed.error_description,
        });
    }

    let access_token = parsed
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            CredentialError::Request(format!(
                "token endpoint returned {status} without an access token"
            ))
        })?;

    Ok(TokenGrant {
        access_token,
        refresh_token: parsed.refresh_token.filter(|t| !t.is_empty()),
        expires_in: parsed
            .expires_in
            .map_or(DEFAULT_EXPIRES_IN, Duration::from_secs),
    })
}
