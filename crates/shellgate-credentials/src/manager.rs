//! Credential lifecycle manager.

use std::{
    fmt,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use shellgate_core::{CredentialError, TokenSource};
use tokio::sync::{Mutex, RwLock};

use crate::refresh::{DEFAULT_EXPIRES_IN, request_refresh};

/// Tokens expiring within this window are refreshed before use.
pub const REFRESH_AHEAD: Duration = Duration::from_secs(5 * 60);

/// GitHub OAuth token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";

/// Deadline for one refresh round trip.
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(60);

/// OAuth application settings used for refresh.
#[derive(Clone)]
pub struct CredentialConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub refresh_timeout: Duration,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            refresh_timeout: REFRESH_TIMEOUT,
        }
    }
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url)
            .field("refresh_timeout", &self.refresh_timeout)
            .finish()
    }
}

/// Access/refresh token pair and its expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub access_token: String,
    /// `None` when no refresh token was configured.
    pub refresh_token: Option<String>,
    /// Best-effort upper bound on the access token's validity.
    pub expires_at: SystemTime,
}

impl CredentialRecord {
    /// Record whose expiry is `lifetime` from now.
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        lifetime: Duration,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            expires_at: expiry_after(SystemTime::now(), lifetime),
        }
    }

    /// Record with the lifetime assumed for a freshly issued token.
    #[must_use]
    pub fn initial(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self::new(access_token, refresh_token, DEFAULT_EXPIRES_IN)
    }

    /// Time left before expiry; zero once expired.
    #[must_use]
    pub fn remaining(&self, now: SystemTime) -> Duration {
        self.expires_at.duration_since(now).unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn needs_refresh(&self, now: SystemTime) -> bool {
        self.remaining(now) < REFRESH_AHEAD
    }

    #[must_use]
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }
}

/// `now + lifetime`, or [`DEFAULT_EXPIRES_IN`] from now when that overflows.
fn expiry_after(now: SystemTime, lifetime: Duration) -> SystemTime {
    now.checked_add(lifetime).unwrap_or_else(|| {
        tracing::warn!(
            lifetime_secs = lifetime.as_secs(),
            "Token lifetime out of range, assuming the default"
        );
        now + DEFAULT_EXPIRES_IN
    })
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Owns the process-wide credential record.
///
/// Readers share the record through an `RwLock`; refreshes are serialized
/// by `refresh_gate` and replace the whole record in one write.
pub struct CredentialManager {
    config: CredentialConfig,
    client: reqwest::Client,
    record: RwLock<CredentialRecord>,
    refresh_gate: Mutex<()>,
}

impl CredentialManager {
    /// Create a manager with a default HTTP client.
    #[must_use]
    pub fn new(config: CredentialConfig, record: CredentialRecord) -> Self {
        Self::with_client(config, record, reqwest::Client::new())
    }

    #[must_use]
    pub fn with_client(
        config: CredentialConfig,
        record: CredentialRecord,
        client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            client,
            record: RwLock::new(record),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Snapshot of the current record.
    pub async fn record(&self) -> CredentialRecord {
        self.record.read().await.clone()
    }

    /// Return an access token valid for at least [`REFRESH_AHEAD`],
    /// refreshing first when the current one is inside the window.
    ///
    /// # Errors
    /// Returns `Unavailable` if the token has expired and there is no
    /// refresh token, or the refresh error. A failed refresh leaves the
    /// previous record in place.
    pub async fn get_valid_token(&self) -> Result<String, CredentialError> {
        {
            let record = self.record.read().await;
            if !record.needs_refresh(SystemTime::now()) {
                return Ok(record.access_token.clone());
            }
        }

        let _gate = self.refresh_gate.lock().await;

        // A refresh may have completed while this caller waited on the gate.
        let current = self.record().await;
        let now = SystemTime::now();
        if !current.needs_refresh(now) {
            return Ok(current.access_token);
        }

        let Some(refresh_token) = current.refresh_token.clone() else {
            if current.is_expired(now) {
                tracing::error!("Access token expired and no refresh token is configured");
                return Err(CredentialError::Unavailable);
            }
            tracing::warn!(
                remaining_secs = current.remaining(now).as_secs(),
                "Access token near expiry and no refresh token is configured"
            );
            return Ok(current.access_token);
        };

        let grant = tokio::time::timeout(
            self.config.refresh_timeout,
            request_refresh(
                &self.client,
                &self.config.token_url,
                &self.config.client_id,
                &self.config.client_secret,
                &refresh_token,
            ),
        )
        .await
        .map_err(|_| {
            CredentialError::Request(format!(
                "timed out after {:?} while refreshing the access token",
                self.config.refresh_timeout
            ))
        })
        .and_then(|result| result)
        .inspect_err(|e| tracing::error!("Token refresh failed: {e}"))?;

        let updated = CredentialRecord {
            access_token: grant.access_token,
            refresh_token: Some(grant.refresh_token.unwrap_or(refresh_token)),
            expires_at: expiry_after(SystemTime::now(), grant.expires_in),
        };
        let token = updated.access_token.clone();
        *self.record.write().await = updated;

        tracing::info!(
            expires_in_secs = grant.expires_in.as_secs(),
            "Token refreshed successfully"
        );
        Ok(token)
    }
}

#[async_trait]
impl TokenSource for CredentialManager {
    async fn valid_token(&self) -> Result<String, CredentialError> {
        self.get_valid_token().await
    }
}
