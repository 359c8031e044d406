//! Core abstractions for the shellgate command gateway.
//!
//! This crate provides the shared building blocks:
//! - `CommandInvocation` - One command, its working directory and injected env
//! - `ExecutionResult` - Captured output of a finished command
//! - `TokenSource` and `CommandExecutor` traits
//! - Error taxonomy shared by the credential and executor crates

pub mod context;
pub mod traits;

pub use context::CommandInvocation;
pub use traits::{
    CommandExecutor, CredentialError, ExecutionResult, ExecutorError, SessionId, TokenSource,
};
