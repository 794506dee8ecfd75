//! Mock session responder for integration testing.
//!
//! A real JSON-RPC engine served over HTTP on an ephemeral port. Records the
//! headers of every request so tests can check what the relay injected.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use parking_lot::Mutex;
use rpcpeering::jsonrpc::{Method, MethodTable, RpcServer};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

#[derive(Default)]
struct Recorded {
    headers: Vec<HeaderMap>,
}

#[derive(Clone)]
struct MockState {
    rpc: RpcServer,
    recorded: Arc<Mutex<Recorded>>,
}

/// Builder for the mock responder.
pub struct MockResponder {
    methods: MethodTable,
}

impl MockResponder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            methods: MethodTable::new(),
        }
    }

    /// A responder answering `eth_chainId` with `chain_id`.
    #[must_use]
    pub fn ethereum(chain_id: &'static str) -> Self {
        Self::new().with(
            "eth_chainId",
            Method::call(move |_: rpcpeering::jsonrpc::NoParams| async move { Ok(chain_id) }),
        )
    }

    #[must_use]
    pub fn with(mut self, name: &str, method: Method) -> Self {
        self.methods.insert(name, method);
        self
    }

    /// Serve on `127.0.0.1:0` at `/rpc`.
    pub async fn start(self) -> MockResponderHandle {
        let state = MockState {
            rpc: RpcServer::new(self.methods),
            recorded: Arc::new(Mutex::new(Recorded::default())),
        };

        let app = Router::new()
            .route("/rpc", post(handle_jsonrpc))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockResponderHandle {
            addr,
            state,
            _handle: handle,
        }
    }
}

impl Default for MockResponder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the running mock responder.
pub struct MockResponderHandle {
    addr: SocketAddr,
    state: MockState,
    _handle: JoinHandle<()>,
}

impl MockResponderHandle {
    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}/rpc", self.addr)).unwrap()
    }

    pub fn request_count(&self) -> usize {
        self.state.recorded.lock().headers.len()
    }

    pub fn last_headers(&self) -> Option<HeaderMap> {
        self.state.recorded.lock().headers.last().cloned()
    }
}

async fn handle_jsonrpc(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> Response {
    state.recorded.lock().headers.push(headers);
    match state.rpc.handle_bytes(&body).await {
        Some(output) => axum::Json(output).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
