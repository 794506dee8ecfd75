//! HTTP surface of the relay.
//!
//! - `POST {rpc_path}` - standalone peering endpoint. The session is named
//!   by `X-Session-Id`; a fresh id is generated when the header is absent
//!   and echoed back on the response.
//! - `GET /health` - liveness.
//! - everything else - the session routes, resolved by [`RelayHandler`].

use std::sync::Arc;

use axum::{Json, Router};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use super::handler::RelayHandler;
use super::initiator::{PeeringInitiator, rpc_response};
use super::router::{RouteConfigError, SessionRouter};
use super::upstream::{ForwardError, HttpForwarder, SESSION_ID_HEADER};
use crate::config::{RelayConfig, StoreConfig};
use crate::logging_layer::logging_layer;
use crate::store::{MemoryStore, SessionStore, StoreError};

/// Failures while assembling the relay from its configuration.
#[derive(Debug, Error)]
pub enum RelayBuildError {
    #[error(transparent)]
    Routes(#[from] RouteConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Forwarder(#[from] ForwardError),

    #[error("invalid public URL: {0}")]
    PublicUrl(#[from] url::ParseError),

    #[error("SQLite store requested but the 'sqlite' feature is disabled")]
    SqliteUnavailable,
}

#[derive(Clone)]
struct AppState {
    handler: RelayHandler,
    initiator: Arc<PeeringInitiator>,
}

/// Assemble the axum router.
pub fn relay_app(
    handler: RelayHandler,
    initiator: Arc<PeeringInitiator>,
    rpc_path: &str,
    max_body_size: usize,
) -> Router {
    Router::new()
        .route(rpc_path, post(handle_peering_rpc).fallback(rpc_method_not_allowed))
        .route("/health", get(health_handler))
        .fallback(handle_relay)
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(logging_layer())
        .with_state(AppState { handler, initiator })
}

/// The relay, built from configuration and ready to serve.
pub struct RelayServer {
    listen: String,
    app: Router,
}

impl RelayServer {
    /// Build the store, forwarder, initiator, and router described by
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns `RelayBuildError` when any component cannot be built.
    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayBuildError> {
        let store = open_store(&config.store)?;
        Self::with_store(config, store)
    }

    /// Like [`RelayServer::from_config`], with a caller-supplied store.
    ///
    /// # Errors
    ///
    /// Returns `RelayBuildError` when any component cannot be built.
    pub fn with_store(
        config: &RelayConfig,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, RelayBuildError> {
        let router = Arc::new(
            SessionRouter::new(&config.routes)?.with_body_limit(config.max_body_size),
        );
        let forwarder = Arc::new(HttpForwarder::new(config.upstream.clone())?);
        let initiator = Arc::new(
            PeeringInitiator::new(
                store.clone(),
                router.clone(),
                config.effective_public_url()?,
                config.initiator.topic.clone(),
                config.initiator.protocols.clone(),
            )
            .with_max_body_size(config.max_body_size),
        );
        let handler = RelayHandler::new(router, store, forwarder, initiator.clone());

        Ok(Self {
            listen: config.listen.clone(),
            app: relay_app(handler, initiator, &config.rpc_path, config.max_body_size),
        })
    }

    pub fn app(&self) -> Router {
        self.app.clone()
    }

    /// Bind the configured address and serve until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server fails.
    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.listen).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> std::io::Result<()> {
        info!(addr = %listener.local_addr()?, "Relay listening");
        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("Relay shutting down");
            })
            .await
    }
}

/// Open the configured session store.
///
/// # Errors
///
/// Backend failures, or SQLite requested without the `sqlite` feature.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn SessionStore>, RelayBuildError> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "sqlite")]
        StoreConfig::Sqlite { path } => {
            info!(path = %path.display(), "Opening SQLite session store");
            Ok(Arc::new(crate::store::SqliteStore::open(path)?))
        }
        #[cfg(not(feature = "sqlite"))]
        StoreConfig::Sqlite { .. } => Err(RelayBuildError::SqliteUnavailable),
    }
}

async fn handle_relay(State(state): State<AppState>, request: Request) -> Response {
    state.handler.handle(request).await
}

async fn handle_peering_rpc(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session_id = headers
        .get(&SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    debug!(session_id = %session_id, "Peering request");

    let output = state
        .initiator
        .peering_server(&session_id)
        .handle_bytes(&body)
        .await;

    let mut response = rpc_response(output);
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

/// Non-POST methods on the peering endpoint.
async fn rpc_method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        Json(json!({ "error": "Method not allowed" })),
    )
        .into_response()
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app() -> Router {
        RelayServer::with_store(&RelayConfig::default(), Arc::new(MemoryStore::new()))
            .unwrap()
            .app()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rpc_endpoint_echoes_session_id() {
        let request = Request::post("/rpc")
            .header("x-session-id", "s-42")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"jsonrpc": "2.0", "id": 1, "method": "rpcpeering1/disconnect"}).to_string(),
            ))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-session-id"], "s-42");
        assert_eq!(
            body_json(response).await,
            json!({"jsonrpc": "2.0", "id": 1, "result": null})
        );
    }

    #[tokio::test]
    async fn test_rpc_endpoint_generates_session_id() {
        let request = Request::post("/rpc")
            .body(Body::from(
                json!({"jsonrpc": "2.0", "method": "rpcpeering1/disconnect"}).to_string(),
            ))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let id = response.headers()["x-session-id"].to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_rpc_parse_error() {
        let request = Request::post("/rpc").body(Body::from("{not json")).unwrap();
        let response = app().oneshot(request).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], -32700);
        assert_eq!(json["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_rpc_endpoint_rejects_get_with_json() {
        let response = app()
            .oneshot(Request::get("/rpc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()["allow"], "POST");
        assert_eq!(body_json(response).await, json!({"error": "Method not allowed"}));
    }

    #[tokio::test]
    async fn test_fallback_reaches_session_routes() {
        let response = app()
            .oneshot(
                Request::get("/sessions/missing/responder")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oversized_rpc_body_rejected() {
        let config = RelayConfig {
            max_body_size: 16,
            ..RelayConfig::default()
        };
        let app = RelayServer::with_store(&config, Arc::new(MemoryStore::new()))
            .unwrap()
            .app();

        let request = Request::post("/rpc")
            .body(Body::from(vec![b' '; 64]))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
