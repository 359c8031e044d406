//! Streaming transport for the command gateway.
//!
//! Provides:
//! - JSON-RPC wire protocol and tool types
//! - Tool adapter exposing the `shell` capability
//! - Server-sent events session streams
//! - Path-secret gate and HTTP router

pub mod adapter;
pub mod gate;
pub mod protocol;
pub mod router;
pub mod sse;

pub use adapter::{SHELL_TOOL, ShellArguments, ToolAdapter};
pub use gate::AccessGate;
pub use protocol::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse};
pub use router::{GatewayState, router};
pub use sse::{GatewayRegistry, OpenedSession, ShutdownSignal, ShutdownTrigger, SseTransport};
