//! Path-secret authorization.

use std::sync::Arc;

use subtle::ConstantTimeEq;

/// Authorizes requests by the leading segment of their path.
///
/// `/{secret}` and `/{secret}/anything` pass; every other path fails,
/// including ones that merely start with the secret (`/{secret}x`).
#[derive(Clone, Default)]
pub struct AccessGate {
    secret: Option<Arc<str>>,
}

impl AccessGate {
    /// An empty secret means open access.
    #[must_use]
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(Arc::from),
        }
    }

    /// Whether every path is authorized.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.secret.is_none()
    }

    #[must_use]
    pub fn authorize(&self, path: &str) -> bool {
        let Some(secret) = &self.secret else {
            return true;
        };
        let segment = path
            .strip_prefix('/')
            .unwrap_or(path)
            .split('/')
            .next()
            .unwrap_or_default();
        segment.as_bytes().ct_eq(secret.as_bytes()).into()
    }
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
