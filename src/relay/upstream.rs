//! Forwarding relay requests to session responders.
//!
//! The forwarder replays the inbound method, headers, and body against the
//! responder URL and streams the upstream status, headers, and body back.
//!
//! # Header Rewriting
//!
//! - Hop-by-hop headers are stripped in both directions; the HTTP binding
//!   re-frames bodies.
//! - `Host` is set to the responder's `host[:port]`.
//! - `X-Session-Id` carries the session id to the responder.
//!
//! # Error Classification
//!
//! - Timeout errors → `ForwardError::Timeout`
//! - Connection errors → `ForwardError::Connection`
//! - Other errors → `ForwardError::Request`
//!
//! No automatic retry (prevents duplicate side effects).

use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::response::Response;
use http::header::{HOST, HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::duration_format;

/// Header carrying the session id to the responder.
pub const SESSION_ID_HEADER: HeaderName = HeaderName::from_static("x-session-id");

/// Configuration for the responder forwarder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Connection timeout (TCP + TLS handshake)
    #[serde(
        deserialize_with = "duration_format::deserialize",
        serialize_with = "duration_format::serialize"
    )]
    pub connect_timeout: Duration,
    /// Whole-request deadline; none by default
    #[serde(
        deserialize_with = "duration_format::deserialize_option",
        serialize_with = "duration_format::serialize_option"
    )]
    pub forward_timeout: Option<Duration>,
    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
    /// Idle connection timeout
    #[serde(
        deserialize_with = "duration_format::deserialize",
        serialize_with = "duration_format::serialize"
    )]
    pub pool_idle_timeout: Duration,
    /// Maximum buffered request body forwarded to a responder
    pub max_request_body: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            forward_timeout: None,
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            max_request_body: 2 * 1024 * 1024,
        }
    }
}

/// Forwarding failures. All of them surface as `500 Failed to forward request`.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("responder {url} did not respond within {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("cannot connect to responder {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("request to responder {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("failed to read inbound request body: {reason}")]
    RequestBody { reason: String },

    #[error("cannot build header {name}: {reason}")]
    InvalidHeader { name: &'static str, reason: String },

    #[error("failed to build forwarding client: {reason}")]
    ClientBuild { reason: String },
}

/// Sends a relayed request to a responder.
#[async_trait::async_trait]
pub trait ResponderForwarder: Send + Sync {
    async fn forward(
        &self,
        target: &Url,
        session_id: &str,
        request: Request,
    ) -> Result<Response, ForwardError>;
}

/// reqwest-backed forwarder with connection pooling.
#[derive(Clone, Debug)]
pub struct HttpForwarder {
    client: Client,
    config: UpstreamConfig,
}

impl HttpForwarder {
    /// Create a new forwarder.
    ///
    /// # Errors
    ///
    /// Returns `ForwardError::ClientBuild` if the client cannot be built.
    pub fn new(config: UpstreamConfig) -> Result<Self, ForwardError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ForwardError::ClientBuild {
                reason: e.to_string(),
            })?;

        Ok(Self { client, config })
    }

    fn classify_error(&self, error: reqwest::Error, target: &Url, session_id: &str) -> ForwardError {
        if error.is_timeout() {
            let timeout_secs = self
                .config
                .forward_timeout
                .unwrap_or(self.config.connect_timeout)
                .as_secs();
            warn!(session_id = %session_id, timeout_secs, "Responder request timed out");
            ForwardError::Timeout {
                url: target.to_string(),
                timeout_secs,
            }
        } else if error.is_connect() {
            warn!(session_id = %session_id, url = %target, "Failed to connect to responder");
            ForwardError::Connection {
                url: target.to_string(),
                reason: error.to_string(),
            }
        } else {
            error!(session_id = %session_id, error = %error, "Responder request failed");
            ForwardError::Request {
                url: target.to_string(),
                reason: error.to_string(),
            }
        }
    }
}

#[async_trait::async_trait]
impl ResponderForwarder for HttpForwarder {
    async fn forward(
        &self,
        target: &Url,
        session_id: &str,
        request: Request,
    ) -> Result<Response, ForwardError> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, self.config.max_request_body)
            .await
            .map_err(|e| ForwardError::RequestBody {
                reason: e.to_string(),
            })?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(http::header::CONTENT_LENGTH);
        headers.insert(HOST, header_value("host", &host_header(target))?);
        headers.insert(SESSION_ID_HEADER, header_value("x-session-id", session_id)?);

        debug!(
            session_id = %session_id,
            method = %parts.method,
            url = %target,
            "Forwarding request to responder"
        );

        let mut builder = self
            .client
            .request(parts.method, target.clone())
            .headers(headers)
            .body(body);
        if let Some(timeout) = self.config.forward_timeout {
            builder = builder.timeout(timeout);
        }

        let upstream = builder
            .send()
            .await
            .map_err(|e| self.classify_error(e, target, session_id))?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        // Body bytes pass through undecoded, so the upstream length stays valid.
        strip_hop_by_hop(&mut response_headers);

        debug!(session_id = %session_id, status = %status.as_u16(), "Responder answered");

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, ForwardError> {
    HeaderValue::from_str(value).map_err(|e| ForwardError::InvalidHeader {
        name,
        reason: e.to_string(),
    })
}

/// `host[:port]` of `url`, port only when explicit.
pub fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Returns true for headers that only apply to a single connection.
pub fn is_hop_by_hop_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    matches!(
        name.as_str(),
        "connection" | "keep-alive" | "te" | "trailer" | "trailers" | "transfer-encoding" | "upgrade"
    ) || name.starts_with("proxy-")
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<String> = headers
        .get_all(http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect();

    let doomed: Vec<HeaderName> = headers
        .keys()
        .filter(|name| is_hop_by_hop_header(name.as_str()) || named.iter().any(|n| n == name.as_str()))
        .cloned()
        .collect();
    for name in doomed {
        headers.remove(name);
    }
}
