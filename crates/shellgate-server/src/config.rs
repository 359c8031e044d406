//! Gateway configuration from environment variables.

use std::{
    env::VarError,
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use shellgate_credentials::{CredentialConfig, CredentialRecord, DEFAULT_TOKEN_URL};
use shellgate_executor::{DEFAULT_SANDBOX_ROOT, DEFAULT_TIMEOUT, ExecutorConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Startup configuration. Read once.
#[derive(Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub bind_addr: IpAddr,
    /// Path secret. `None` leaves the gateway open.
    pub secret_token: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub sandbox_root: PathBuf,
    pub sandbox_home: PathBuf,
    pub command_timeout: Duration,
}

impl GatewayConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    /// Returns `InvalidValue` for non-unicode or unparsable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key))
    }

    /// Load through `lookup`, which behaves like [`std::env::var`].
    ///
    /// # Errors
    /// Returns `InvalidValue` for non-unicode or unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let env = Env(lookup);
        let sandbox_root = env
            .optional("SANDBOX_ROOT")?
            .map_or_else(|| PathBuf::from(DEFAULT_SANDBOX_ROOT), PathBuf::from);
        let sandbox_home = env
            .optional("SANDBOX_HOME")?
            .map_or_else(|| sandbox_root.clone(), PathBuf::from);

        Ok(Self {
            port: env.parse_or("PORT", 3000)?,
            bind_addr: env.parse_or("BIND_ADDR", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?,
            secret_token: env.optional("SECRET_TOKEN")?,
            access_token: env.optional("GITHUB_ACCESS_TOKEN")?.unwrap_or_default(),
            refresh_token: env.optional("GITHUB_REFRESH_TOKEN")?,
            client_id: env.optional("GITHUB_CLIENT_ID")?.unwrap_or_default(),
            client_secret: env.optional("GITHUB_CLIENT_SECRET")?.unwrap_or_default(),
            token_url: env
                .optional("GITHUB_TOKEN_URL")?
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            sandbox_root,
            sandbox_home,
            command_timeout: Duration::from_secs(
                env.parse_nonzero_or("COMMAND_TIMEOUT_SECS", DEFAULT_TIMEOUT.as_secs())?,
            ),
        })
    }

    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    #[must_use]
    pub fn credential_config(&self) -> CredentialConfig {
        CredentialConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            token_url: self.token_url.clone(),
            ..CredentialConfig::default()
        }
    }

    /// Credential record seeded from the configured tokens.
    #[must_use]
    pub fn initial_record(&self) -> CredentialRecord {
        CredentialRecord::initial(self.access_token.clone(), self.refresh_token.clone())
    }

    #[must_use]
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            sandbox_root: self.sandbox_root.clone(),
            home_dir: self.sandbox_home.clone(),
            timeout: self.command_timeout,
            ..ExecutorConfig::default()
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |set: bool| if set { "<redacted>" } else { "<unset>" };
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("bind_addr", &self.bind_addr)
            .field("secret_token", &redact(self.secret_token.is_some()))
            .field("access_token", &redact(!self.access_token.is_empty()))
            .field("refresh_token", &redact(self.refresh_token.is_some()))
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(!self.client_secret.is_empty()))
            .field("token_url", &self.token_url)
            .field("sandbox_root", &self.sandbox_root)
            .field("sandbox_home", &self.sandbox_home)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    /// Empty values count as unset.
    fn optional(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match (self.0)(key) {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "not valid unicode".to_string(),
            }),
        }
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.optional(key)?.map_or(Ok(default), |raw| {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{e}: {raw:?}"),
            })
        })
    }

    fn parse_nonzero_or(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.parse_or(key, default)? {
            0 => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "must be greater than zero".to_string(),
            }),
            value => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned().ok_or(VarError::NotPresent))
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:3000".parse().unwrap());
        assert!(config.secret_token.is_none());
        assert!(config.refresh_token.is_none());
        assert_eq!(config.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.sandbox_root, PathBuf::from("/workspace"));
        assert_eq!(config.sandbox_home, PathBuf::from("/workspace"));
        assert_eq!(config.command_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PORT", "8080"),
            ("BIND_ADDR", "127.0.0.1"),
            ("SECRET_TOKEN", "s3cret"),
            ("GITHUB_ACCESS_TOKEN", "ghu_a"),
            ("GITHUB_REFRESH_TOKEN", "ghr_b"),
            ("SANDBOX_ROOT", "/srv/sandbox"),
            ("COMMAND_TIMEOUT_SECS", "30"),
        ])
        .unwrap();

        assert_eq!(config.listen_addr(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.secret_token.as_deref(), Some("s3cret"));
        assert_eq!(config.sandbox_home, PathBuf::from("/srv/sandbox"));

        let executor = config.executor_config();
        assert_eq!(executor.timeout, Duration::from_secs(30));
        assert_eq!(executor.home_dir, PathBuf::from("/srv/sandbox"));

        let record = config.initial_record();
        assert_eq!(record.access_token, "ghu_a");
        assert_eq!(record.refresh_token.as_deref(), Some("ghr_b"));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = load(&[("SECRET_TOKEN", ""), ("PORT", " "), ("GITHUB_REFRESH_TOKEN", "")]).unwrap();
        assert!(config.secret_token.is_none());
        assert!(config.refresh_token.is_none());
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_invalid_number_is_error() {
        let err = load(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().starts_with("Invalid value for PORT"));

        assert!(load(&[("COMMAND_TIMEOUT_SECS", "-1")]).is_err());
        assert!(load(&[("BIND_ADDR", "localhost")]).is_err());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = load(&[("COMMAND_TIMEOUT_SECS", "0")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for COMMAND_TIMEOUT_SECS: must be greater than zero"
        );
        assert_eq!(
            load(&[("COMMAND_TIMEOUT_SECS", "1")]).unwrap().command_timeout,
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&[
            ("SECRET_TOKEN", "s3cret"),
            ("GITHUB_ACCESS_TOKEN", "ghu_a"),
            ("GITHUB_CLIENT_SECRET", "shh"),
        ])
        .unwrap();
        let debug = format!("{config:?}");
        for secret in ["s3cret", "ghu_a", "shh"] {
            assert!(!debug.contains(secret));
        }
    }
}
