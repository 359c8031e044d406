//! HTTP entry point: health check, path-secret gate and session dispatch.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Query, State},
    http::{Method, Request, StatusCode, Uri},
    response::{
        IntoResponse, Response,
        sse::{KeepAlive, Sse},
    },
    routing::any,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::{
    adapter::ToolAdapter,
    gate::AccessGate,
    protocol::JsonRpcMessage,
    sse::{GatewayRegistry, ShutdownSignal, SseTransport},
};

/// Shared state of the gateway router.
#[derive(Clone)]
pub struct GatewayState {
    pub gate: AccessGate,
    pub registry: Arc<GatewayRegistry>,
    pub adapter: Arc<ToolAdapter>,
    pub shutdown: ShutdownSignal,
}

impl GatewayState {
    #[must_use]
    pub fn new(gate: AccessGate, adapter: ToolAdapter, shutdown: ShutdownSignal) -> Self {
        Self {
            gate,
            registry: Arc::new(GatewayRegistry::new()),
            adapter: Arc::new(adapter),
            shutdown,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Build the gateway router.
///
/// Request spans carry the method only; the path holds the secret.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", any(health))
        .fallback(gateway)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!("request", method = %request.method())
            }),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn gateway(
    State(state): State<GatewayState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    if !state.gate.authorize(uri.path()) {
        return not_found();
    }

    match method {
        Method::GET => open_stream(&state, uri.path()),
        Method::POST => post_message(&state, &uri, &body),
        _ => (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response(),
    }
}

fn open_stream(state: &GatewayState, path: &str) -> Response {
    let opened = match SseTransport::open(&state.registry, path, state.shutdown.clone()) {
        Ok(opened) => opened,
        Err(e) => {
            tracing::error!("Failed to open session: {e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
        }
    };

    tokio::spawn(Arc::clone(&state.adapter).serve(opened.id, opened.inbound, opened.outbound));

    Sse::new(opened.events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn post_message(state: &GatewayState, uri: &Uri, body: &[u8]) -> Response {
    let session_id = match Query::<MessageQuery>::try_from_uri(uri) {
        Ok(Query(MessageQuery {
            session_id: Some(id),
        })) => id,
        _ => return (StatusCode::BAD_REQUEST, "Missing sessionId").into_response(),
    };

    let message: JsonRpcMessage = match serde_json::from_slice(body) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("Rejected message body: {e}");
            return (StatusCode::BAD_REQUEST, format!("Invalid JSON-RPC message: {e}"))
                .into_response();
        }
    };

    let Ok(session_id) = Uuid::parse_str(&session_id) else {
        return session_not_found();
    };

    match state.registry.route(session_id, message) {
        Ok(()) => (StatusCode::ACCEPTED, "Accepted").into_response(),
        Err(e) => {
            tracing::debug!("{e}");
            session_not_found()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

fn session_not_found() -> Response {
    (StatusCode::NOT_FOUND, "Session not found").into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{BodyDataStream, to_bytes};
    use futures::StreamExt;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::adapter::tests::EchoExecutor;

    const SECRET: &str = "s3cret";

    fn app(secret: Option<&str>) -> Router {
        router(GatewayState::new(
            AccessGate::new(secret.map(str::to_string)),
            ToolAdapter::new(Arc::new(EchoExecutor)),
            ShutdownSignal::never(),
        ))
    }

    fn request(method: Method, uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(body.into())
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn next_frame(stream: &mut BodyDataStream) -> String {
        let chunk = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("frame in time")
            .expect("stream still open")
            .unwrap();
        String::from_utf8(chunk.to_vec()).unwrap()
    }

    /// Open a stream and return it with the POST target it announced.
    async fn open(app: &Router, path: &str) -> (BodyDataStream, String) {
        let response = app
            .clone()
            .oneshot(request(Method::GET, path, Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );

        let mut stream = response.into_body().into_data_stream();
        let frame = next_frame(&mut stream).await;
        assert!(frame.starts_with("event: endpoint\n"));
        let endpoint = frame
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap()
            .to_string();
        (stream, endpoint)
    }

    fn tools_list() -> String {
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}).to_string()
    }

    #[tokio::test]
    async fn test_health_needs_no_secret() {
        let app = app(Some(SECRET));
        for method in [Method::GET, Method::POST, Method::HEAD] {
            let (status, _) = send(&app, request(method, "/health", Body::empty())).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (_, body) = send(&app, request(Method::GET, "/health", Body::empty())).await;
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn test_wrong_secret_looks_like_unknown_route() {
        let app = app(Some(SECRET));
        let wrong = send(&app, request(Method::GET, "/wrong", Body::empty())).await;
        let unknown = send(&app, request(Method::GET, "/no/such/route", Body::empty())).await;
        let suffixed = send(&app, request(Method::GET, "/s3cretx", Body::empty())).await;

        assert_eq!(wrong, (StatusCode::NOT_FOUND, "Not found".to_string()));
        assert_eq!(wrong, unknown);
        assert_eq!(wrong, suffixed);

        let post = send(&app, request(Method::POST, "/wrong?sessionId=x", tools_list())).await;
        assert_eq!(post, wrong);
    }

    #[tokio::test]
    async fn test_other_methods_are_not_allowed() {
        let app = app(Some(SECRET));
        let (status, _) = send(&app, request(Method::DELETE, "/s3cret", Body::empty())).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_post_validation() {
        let app = app(Some(SECRET));

        let (status, _) = send(&app, request(Method::POST, "/s3cret", tools_list())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            request(Method::POST, &format!("/s3cret?sessionId={}", Uuid::new_v4()), "{oops"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        for id in [Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
            let (status, _) = send(
                &app,
                request(Method::POST, &format!("/s3cret?sessionId={id}"), tools_list()),
            )
            .await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_stream_round_trip() {
        let app = app(Some(SECRET));
        let (mut stream, endpoint) = open(&app, "/s3cret/sse").await;
        assert!(endpoint.starts_with("/s3cret/sse?sessionId="));

        let (status, body) = send(&app, request(Method::POST, &endpoint, tools_list())).await;
        assert_eq!((status, body.as_str()), (StatusCode::ACCEPTED, "Accepted"));

        let frame = next_frame(&mut stream).await;
        assert!(frame.starts_with("event: message\n"));
        assert!(frame.contains(r#""name":"shell""#));

        let call = json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "shell", "arguments": {"command": "gh --version"}},
        });
        let (status, _) = send(&app, request(Method::POST, &endpoint, call.to_string())).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let frame = next_frame(&mut stream).await;
        assert!(frame.contains("ran `gh --version` in /workspace"));
    }

    #[tokio::test]
    async fn test_notification_is_accepted_without_reply() {
        let app = app(None);
        let (mut stream, endpoint) = open(&app, "/").await;

        let note = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        let (status, _) = send(&app, request(Method::POST, &endpoint, note.to_string())).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, _) = send(&app, request(Method::POST, &endpoint, tools_list())).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let frame = next_frame(&mut stream).await;
        assert!(frame.contains(r#""id":1"#));
    }

    #[tokio::test]
    async fn test_closed_stream_id_is_not_found() {
        let app = app(Some(SECRET));
        let (stream, endpoint) = open(&app, "/s3cret").await;
        drop(stream);

        for _ in 0..2 {
            let (status, _) = send(&app, request(Method::POST, &endpoint, tools_list())).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_no_secret_means_open_access() {
        let app = app(None);
        let (_stream, endpoint) = open(&app, "/anything").await;
        let (status, _) = send(&app, request(Method::POST, &endpoint, tools_list())).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }
}
