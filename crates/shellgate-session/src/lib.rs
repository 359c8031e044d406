//! Session registry for streaming clients.
//!
//! Provides:
//! - `SessionRegistry` - Maps live session ids to their inbound queues
//! - `SessionGuard` - Unregisters a session when its stream is dropped

pub mod registry;

pub use registry::{RegistryError, SessionGuard, SessionRegistry};
