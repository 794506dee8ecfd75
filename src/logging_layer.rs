//! Tower layer for structured request/response logging.
//!
//! `tower_http::trace::TraceLayer` does the plumbing; the callbacks here add
//! a correlation id to every request span and redact credentials from
//! header dumps.

use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use http::{HeaderMap, Request, Response};
use tower_http::classify::{ServerErrorsAsFailures, ServerErrorsFailureClass, SharedClassifier};
use tower_http::trace::{DefaultOnBodyChunk, DefaultOnEos, TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

/// Header a client can set to pick its own correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Headers that are redacted from logs.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "x-api-key",
    "x-auth-token",
    "proxy-authorization",
    "set-cookie",
];

const MAX_HEADERS_TO_LOG: usize = 50;
const MAX_VALUE_LEN: usize = 1024;

static CORRELATION_PREFIX: LazyLock<u64> = LazyLock::new(|| {
    let seed = Uuid::new_v4().as_u128();
    (seed >> 64) as u64
});

static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Counter-based correlation id.
///
/// The upper 64 bits come from one `Uuid::new_v4()` per process, the lower
/// 64 bits from a counter. Version 4 and RFC 4122 variant bits are set so
/// the result parses as an ordinary v4 UUID.
pub fn fast_correlation_id() -> Uuid {
    let prefix = *CORRELATION_PREFIX;
    let counter = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut combined = ((prefix as u128) << 64) | (counter as u128);
    combined = (combined & !(0xF_u128 << 76)) | (0x4_u128 << 76);
    combined = (combined & !(0x3_u128 << 62)) | (0x2_u128 << 62);
    Uuid::from_u128(combined)
}

pub type RelayTraceLayer = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    CorrelationMakeSpan,
    OnRequestLogger,
    OnResponseLogger,
    DefaultOnBodyChunk,
    DefaultOnEos,
    OnFailureLogger,
>;

/// Access-log layer for the relay router.
pub fn logging_layer() -> RelayTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(CorrelationMakeSpan)
        .on_request(OnRequestLogger)
        .on_response(OnResponseLogger)
        .on_failure(OnFailureLogger)
}

/// Opens a `request` span carrying `correlation_id`.
#[derive(Clone, Debug)]
pub struct CorrelationMakeSpan;

impl<B> tower_http::trace::MakeSpan<B> for CorrelationMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> tracing::Span {
        let correlation_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| fast_correlation_id().to_string());

        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            correlation_id = %correlation_id,
        )
    }
}

#[derive(Clone, Debug)]
pub struct OnRequestLogger;

impl<B> tower_http::trace::OnRequest<B> for OnRequestLogger {
    fn on_request(&mut self, request: &Request<B>, _span: &tracing::Span) {
        info!(
            method = %request.method(),
            uri = %request.uri(),
            direction = "inbound",
            "Request received"
        );

        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                version = ?request.version(),
                headers = ?sanitize_headers(request.headers()),
                "Request details"
            );
        }
    }
}

#[derive(Clone, Debug)]
pub struct OnResponseLogger;

impl<B> tower_http::trace::OnResponse<B> for OnResponseLogger {
    fn on_response(
        self,
        response: &Response<B>,
        latency: std::time::Duration,
        _span: &tracing::Span,
    ) {
        info!(
            status = %response.status().as_u16(),
            latency_ms = latency.as_millis(),
            direction = "outbound",
            "Response sent"
        );

        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                headers = ?sanitize_headers(response.headers()),
                "Response details"
            );
        }
    }
}

#[derive(Clone, Debug)]
pub struct OnFailureLogger;

impl tower_http::trace::OnFailure<ServerErrorsFailureClass> for OnFailureLogger {
    fn on_failure(
        &mut self,
        failure: ServerErrorsFailureClass,
        latency: std::time::Duration,
        _span: &tracing::Span,
    ) {
        warn!(
            classification = %failure,
            latency_ms = latency.as_millis(),
            direction = "error",
            "Request failed"
        );
    }
}

/// Debug view of a header map with credentials redacted.
pub struct SanitizedHeaders<'a>(pub &'a HeaderMap);

impl fmt::Debug for SanitizedHeaders<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();

        for (idx, (name, value)) in self.0.iter().enumerate() {
            if idx >= MAX_HEADERS_TO_LOG {
                map.entry(&"...", &format!("({} more headers)", self.0.len() - idx));
                break;
            }

            let name = name.as_str();
            let is_sensitive = SENSITIVE_HEADERS
                .iter()
                .any(|&sensitive| name.eq_ignore_ascii_case(sensitive));

            if is_sensitive {
                map.entry(&name, &"[REDACTED]");
                continue;
            }
            match value.to_str() {
                Ok(text) if text.len() <= MAX_VALUE_LEN => {
                    map.entry(&name, &text);
                }
                Ok(text) => {
                    let cut = (0..=MAX_VALUE_LEN)
                        .rev()
                        .find(|&i| text.is_char_boundary(i))
                        .unwrap_or(0);
                    map.entry(&name, &format!("{}... ({} bytes)", &text[..cut], text.len()));
                }
                Err(_) => {
                    map.entry(&name, &format!("<binary: {} bytes>", value.len()));
                }
            }
        }

        map.finish()
    }
}

#[inline]
pub fn sanitize_headers(headers: &HeaderMap) -> SanitizedHeaders<'_> {
    SanitizedHeaders(headers)
}
