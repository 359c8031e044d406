//! Refresh-ahead credential lifecycle manager.
//!
//! Provides:
//! - `CredentialManager` - Owns the process-wide credential record
//! - `CredentialRecord` - Access/refresh token pair and its expiry
//! - OAuth refresh request/response types

pub mod manager;
pub mod refresh;

pub use manager::{
    CredentialConfig, CredentialManager, CredentialRecord, DEFAULT_TOKEN_URL, REFRESH_AHEAD,
    REFRESH_TIMEOUT,
};
pub use refresh::{DEFAULT_EXPIRES_IN, TokenGrant};
