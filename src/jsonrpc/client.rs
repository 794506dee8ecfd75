//! Typed JSON-RPC client over a pluggable transport.
//!
//! [`RpcClient`] builds requests, assigns ids and decodes results; the
//! [`RequestSender`] it wraps decides how a request reaches the peer.
//!
//! # Senders
//!
//! - [`HttpSender`] - POSTs to a URL with reqwest. No automatic retry.
//! - [`LoopbackSender`] - hands requests to an in-process [`RpcServer`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::server::RpcServer;
use super::types::{JsonRpcId, JsonRpcRequest, JsonRpcResponse};
use crate::error::jsonrpc::JsonRpcError;

/// Errors surfaced to JSON-RPC callers.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The peer did not answer in time.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The peer could not be reached.
    #[error("cannot connect to {url}: {reason}")]
    Connection { url: String, reason: String },

    /// Any other transport failure.
    #[error("transport failure: {reason}")]
    Transport { reason: String },

    /// The peer answered with a non-success HTTP status and no JSON body.
    #[error("peer returned HTTP {status}")]
    HttpStatus { status: u16 },

    /// The peer answered with a JSON-RPC error object.
    #[error("peer returned error: {0}")]
    Rpc(JsonRpcError),

    /// The response did not match the request or the expected result type.
    #[error("invalid response: {details}")]
    InvalidResponse { details: String },

    /// A call produced no response at all.
    #[error("peer sent no response to a call")]
    MissingResponse,

    /// Params could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Delivers an encoded request (or batch) and returns the decoded reply.
#[async_trait::async_trait]
pub trait RequestSender: Send + Sync {
    /// Send `payload`; `Ok(None)` when the peer replied without a body.
    async fn send(&self, payload: Value) -> Result<Option<Value>, ClientError>;
}

#[async_trait::async_trait]
impl<S: RequestSender + ?Sized> RequestSender for std::sync::Arc<S> {
    async fn send(&self, payload: Value) -> Result<Option<Value>, ClientError> {
        (**self).send(payload).await
    }
}

/// HTTP transport: one POST per request.
#[derive(Clone, Debug)]
pub struct HttpSender {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl HttpSender {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a sender with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` if the client cannot be built.
    pub fn new(url: Url) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ClientError::Transport {
                reason: format!("client build error: {e}"),
            })?;
        Ok(Self::with_client(client, url))
    }

    /// Create a sender sharing an existing reqwest client.
    pub fn with_client(client: Client, url: Url) -> Self {
        Self {
            client,
            url,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn classify_error(&self, error: reqwest::Error) -> ClientError {
        if error.is_timeout() {
            warn!(url = %self.url, timeout_secs = self.timeout.as_secs(), "JSON-RPC request timed out");
            ClientError::Timeout {
                url: self.url.to_string(),
            }
        } else if error.is_connect() {
            warn!(url = %self.url, "Failed to connect to JSON-RPC peer");
            ClientError::Connection {
                url: self.url.to_string(),
                reason: error.to_string(),
            }
        } else {
            ClientError::Transport {
                reason: error.to_string(),
            }
        }
    }
}

#[async_trait::async_trait]
impl RequestSender for HttpSender {
    async fn send(&self, payload: Value) -> Result<Option<Value>, ClientError> {
        let response = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.classify_error(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.classify_error(e))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            if !status.is_success() {
                return Err(ClientError::HttpStatus {
                    status: status.as_u16(),
                });
            }
            return Ok(None);
        }

        match serde_json::from_slice(&body) {
            Ok(value) => Ok(Some(value)),
            Err(_) if !status.is_success() => Err(ClientError::HttpStatus {
                status: status.as_u16(),
            }),
            Err(e) => Err(ClientError::InvalidResponse {
                details: format!("body is not JSON: {e}"),
            }),
        }
    }
}

/// In-process transport straight into an engine.
#[derive(Clone, Debug)]
pub struct LoopbackSender {
    server: RpcServer,
}

impl LoopbackSender {
    pub fn new(server: RpcServer) -> Self {
        Self { server }
    }
}

#[async_trait::async_trait]
impl RequestSender for LoopbackSender {
    async fn send(&self, payload: Value) -> Result<Option<Value>, ClientError> {
        match self.server.handle(payload).await {
            Some(output) => Ok(Some(serde_json::to_value(output)?)),
            None => Ok(None),
        }
    }
}

/// Typed JSON-RPC client.
///
/// Ids are integers counting up from 1, unique per client.
#[derive(Debug)]
pub struct RpcClient<S> {
    sender: S,
    next_id: AtomicI64,
}

impl<S: RequestSender> RpcClient<S> {
    pub fn new(sender: S) -> Self {
        Self {
            sender,
            next_id: AtomicI64::new(1),
        }
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// Call `method` and decode its result.
    ///
    /// `params` that serialize to `null` (such as `()`) are omitted.
    ///
    /// # Errors
    ///
    /// - `ClientError::Rpc` when the peer answers with an error object
    /// - `ClientError::InvalidResponse` when the reply is malformed, carries
    ///   another id, or its result does not decode as `R`
    /// - transport errors from the sender
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, ClientError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = JsonRpcId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = JsonRpcRequest::call(id.clone(), method, encode_params(params)?);

        debug!(method = %method, id = ?id, "Sending JSON-RPC call");
        let reply = self
            .sender
            .send(serde_json::to_value(&request)?)
            .await?
            .ok_or(ClientError::MissingResponse)?;

        let response: JsonRpcResponse =
            serde_json::from_value(reply).map_err(|e| ClientError::InvalidResponse {
                details: format!("not a JSON-RPC response: {e}"),
            })?;

        if response.id.as_ref().is_some_and(|got| *got != id) {
            return Err(ClientError::InvalidResponse {
                details: format!("response id {:?} does not match {:?}", response.id, id),
            });
        }
        if let Some(error) = response.error {
            return Err(ClientError::Rpc(error));
        }

        serde_json::from_value(response.result.unwrap_or(Value::Null)).map_err(|e| {
            ClientError::InvalidResponse {
                details: format!("unexpected result for {method}: {e}"),
            }
        })
    }

    /// Send `method` as a notification.
    pub async fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<(), ClientError> {
        let request = JsonRpcRequest::notification(method, encode_params(params)?);
        debug!(method = %method, "Sending JSON-RPC notification");
        self.sender.send(serde_json::to_value(&request)?).await?;
        Ok(())
    }
}

fn encode_params<P: Serialize>(params: P) -> Result<Option<Value>, ClientError> {
    match serde_json::to_value(params)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}
