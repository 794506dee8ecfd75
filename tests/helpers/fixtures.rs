//! Test fixtures and data builders for integration testing.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::response::Response;
use http_body_util::BodyExt;
use rpcpeering::config::RelayConfig;
use rpcpeering::relay::RelayServer;
use rpcpeering::store::MemoryStore;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A minimal YAML configuration with env substitution in it.
#[must_use]
pub fn minimal_config_yaml() -> String {
    r#"
listen: "127.0.0.1:4180"
public_url: ${RPCPEERING_TEST_PUBLIC_URL:-http://relay.test}
initiator:
  topic: eth-mainnet
  protocols: [rpcpeering1, ethereum]
"#
    .to_string()
}

/// Relay configuration used by the HTTP flow tests.
#[must_use]
pub fn relay_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.public_url = Some(Url::parse("http://relay.test").unwrap());
    config.initiator.topic = "eth-mainnet".to_string();
    config.initiator.protocols = vec!["rpcpeering1".to_string(), "ethereum".to_string()];
    config
}

/// An in-process relay app over a fresh memory store.
pub fn relay_app(config: &RelayConfig) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let app = RelayServer::with_store(config, store.clone())
        .unwrap()
        .app();
    (app, store)
}

/// A relay listening on an ephemeral port. The returned token stops it.
pub async fn spawn_relay(mut config: RelayConfig) -> (Url, Arc<MemoryStore>, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
    config.public_url = Some(base.clone());

    let store = Arc::new(MemoryStore::new());
    let server = RelayServer::with_store(&config, store.clone()).unwrap();
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        server.serve(listener, token).await.unwrap();
    });

    (base, store, shutdown)
}

pub fn post(uri: &str, body: impl Into<Body>) -> Request {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(body.into())
        .unwrap()
}

pub fn get(uri: &str) -> Request {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
