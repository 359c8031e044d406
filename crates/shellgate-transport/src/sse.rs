//! Server-sent events stream of one session.

use std::{convert::Infallible, future, sync::Arc};

use axum::response::sse::Event;
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use shellgate_core::SessionId;
use shellgate_session::{RegistryError, SessionRegistry};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::protocol::{JsonRpcMessage, JsonRpcResponse};

/// Registry of sessions that accept protocol messages.
pub type GatewayRegistry = SessionRegistry<JsonRpcMessage>;

/// Event announcing where the client must POST its messages.
pub const ENDPOINT_EVENT: &str = "endpoint";
/// Event carrying one protocol response.
pub const MESSAGE_EVENT: &str = "message";

/// Both ends of a freshly opened session.
pub struct OpenedSession {
    pub id: SessionId,
    /// Messages POSTed by the client.
    pub inbound: mpsc::UnboundedReceiver<JsonRpcMessage>,
    /// Responses to write to the client.
    pub outbound: mpsc::UnboundedSender<JsonRpcResponse>,
    /// Event stream for the response body. Dropping it closes the session.
    pub events: BoxStream<'static, Result<Event, Infallible>>,
}

/// Opens sessions for streaming clients.
pub struct SseTransport;

impl SseTransport {
    /// Mint a session id, register it and build the event stream.
    ///
    /// The endpoint event is the first item of the stream, and the id is
    /// routable before the stream is handed out.
    ///
    /// # Errors
    /// Returns `AlreadyRegistered` on an id collision.
    pub fn open(
        registry: &Arc<GatewayRegistry>,
        endpoint_path: &str,
        shutdown: ShutdownSignal,
    ) -> Result<OpenedSession, RegistryError> {
        let id = Uuid::new_v4();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let guard = registry.register(id, inbound_tx)?;

        let endpoint = Event::default()
            .event(ENDPOINT_EVENT)
            .data(format!("{endpoint_path}?sessionId={id}"));

        let messages = UnboundedReceiverStream::new(outbound_rx).filter_map(move |response| {
            let event = Event::default().event(MESSAGE_EVENT).json_data(&response);
            future::ready(match event {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::error!(session_id = %id, "Failed to encode response: {e}");
                    None
                }
            })
        });

        let events = stream::once(future::ready(endpoint))
            .chain(messages)
            .take_until(async move { shutdown.wait().await })
            .map(move |event| {
                let _session = &guard;
                Ok::<_, Infallible>(event)
            })
            .boxed();

        Ok(OpenedSession {
            id,
            inbound,
            outbound,
            events,
        })
    }
}

/// Fires the shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

impl ShutdownTrigger {
    #[must_use]
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (Self(tx), ShutdownSignal(Some(rx)))
    }

    /// Ends every open event stream.
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

/// Resolves once the server starts shutting down.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(Option<watch::Receiver<bool>>);

impl ShutdownSignal {
    /// A signal that never fires.
    #[must_use]
    pub const fn never() -> Self {
        Self(None)
    }

    pub async fn wait(mut self) {
        let Some(rx) = self.0.as_mut() else {
            return future::pending().await;
        };
        if rx.wait_for(|stopping| *stopping).await.is_err() {
            // Trigger dropped without firing.
            future::pending::<()>().await;
        }
    }
}
