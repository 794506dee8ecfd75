//! Relay request handling.
//!
//! # Request Flow
//!
//! 1. Resolve the request into a [`Route`] with the [`SessionRouter`]
//! 2. Act on the route against the session store
//! 3. Convert the outcome, or the [`RelayError`], into an HTTP response
//!
//! # Status Mapping
//!
//! | Outcome | Status | Body |
//! |---------|--------|------|
//! | Session created | 201 | `{routes, initiator}` |
//! | Responder found | 200 | `{url, protocols}` |
//! | Unknown session | 404 | `Session not found` |
//! | Unsupported protocols | 400 | `{"error": "Unsupported protocols", "unsupported": [...]}` |
//! | Bad responder registration | 400 | `Invalid RPC URL` |
//! | Forwarding failure | 500 | `Failed to forward request` |
//! | Any other failure | 500 | `{"error": ..., "routes"?: [...]}` |

use std::sync::Arc;

use axum::Json;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::initiator::{InitiatorHooks, InitiatorInfo};
use super::router::{Route, RouteError, SessionRouter, SupportedRoute};
use super::upstream::{ForwardError, ResponderForwarder};
use crate::store::{SessionResponder, SessionStore, StoreError};

/// Relay failures, each with a fixed HTTP rendering.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Unsupported protocols: {}", unsupported.join(","))]
    UnsupportedProtocols { unsupported: Vec<String> },

    #[error("Invalid RPC URL for session {session_id}: {reason}")]
    InvalidResponder { session_id: String, reason: String },

    #[error("Failed to forward request: {0}")]
    Upstream(#[from] ForwardError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Initiator failure: {0:#}")]
    Initiator(anyhow::Error),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            RelayError::UnsupportedProtocols { .. } | RelayError::InvalidResponder { .. } => {
                StatusCode::BAD_REQUEST
            }
            RelayError::Upstream(_)
            | RelayError::Route(_)
            | RelayError::Store(_)
            | RelayError::Initiator(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            RelayError::SessionNotFound { .. } => (status, "Session not found").into_response(),
            RelayError::UnsupportedProtocols { unsupported } => (
                status,
                Json(json!({ "error": "Unsupported protocols", "unsupported": unsupported })),
            )
                .into_response(),
            RelayError::InvalidResponder { .. } => (status, "Invalid RPC URL").into_response(),
            RelayError::Upstream(_) => (status, "Failed to forward request").into_response(),
            RelayError::Route(RouteError::InvalidRoute {
                method,
                path,
                routes,
            }) => (
                status,
                Json(json!({
                    "error": format!("Invalid route: {method} {path}"),
                    "routes": routes,
                })),
            )
                .into_response(),
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}

/// Body of a successful create-session response.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSession {
    pub routes: Vec<SupportedRoute>,
    pub initiator: InitiatorInfo,
}

/// Dispatches resolved routes to the store, the forwarder, and the initiator.
#[derive(Clone)]
pub struct RelayHandler {
    router: Arc<SessionRouter>,
    store: Arc<dyn SessionStore>,
    forwarder: Arc<dyn ResponderForwarder>,
    initiator: Arc<dyn InitiatorHooks>,
}

impl RelayHandler {
    pub fn new(
        router: Arc<SessionRouter>,
        store: Arc<dyn SessionStore>,
        forwarder: Arc<dyn ResponderForwarder>,
        initiator: Arc<dyn InitiatorHooks>,
    ) -> Self {
        Self {
            router,
            store,
            forwarder,
            initiator,
        }
    }

    pub fn router(&self) -> &SessionRouter {
        &self.router
    }

    /// Handle one relay request. Never fails; every error becomes a response.
    pub async fn handle(&self, request: Request) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        match self.try_handle(request).await {
            Ok(response) => response,
            Err(err) => {
                if err.status().is_server_error() {
                    error!(method = %method, path = %path, error = %err, "Relay request failed");
                } else {
                    debug!(method = %method, path = %path, error = %err, "Relay request rejected");
                }
                err.into_response()
            }
        }
    }

    /// Handle one relay request, surfacing failures as [`RelayError`].
    ///
    /// # Errors
    ///
    /// See the status table in the module docs.
    pub async fn try_handle(&self, request: Request) -> Result<Response, RelayError> {
        let route = match self.router.route(request).await {
            Ok(route) => route,
            Err(RouteError::InvalidResponderUrl { value, reason }) => {
                return Err(RelayError::InvalidResponder {
                    session_id: String::new(),
                    reason: format!("'{value}': {reason}"),
                });
            }
            Err(err) => return Err(err.into()),
        };

        match route {
            Route::CreateSession {
                session_id,
                responder,
            } => self.create_session(&session_id, responder).await,
            Route::RelayResponderRequest {
                session_id,
                protocols,
                request,
            } => self.relay_to_responder(&session_id, &protocols, request).await,
            Route::GetResponder { session_id } => self.get_responder(&session_id).await,
            Route::RelayInitiatorRequest {
                session_id,
                protocols,
                request,
            } => self
                .initiator
                .handle_request(&session_id, &protocols, request)
                .await
                .map_err(RelayError::Initiator),
            Route::GetInitiator { session_id } => {
                let info = self
                    .initiator
                    .describe(&session_id)
                    .await
                    .map_err(RelayError::Initiator)?;
                Ok(Json(info).into_response())
            }
        }
    }

    async fn create_session(
        &self,
        session_id: &str,
        responder: SessionResponder,
    ) -> Result<Response, RelayError> {
        let invalid = |reason: String| RelayError::InvalidResponder {
            session_id: session_id.to_string(),
            reason,
        };

        let url = responder.url.clone();
        self.store
            .set_responder(session_id, responder)
            .await
            .map_err(|e| invalid(e.to_string()))?;
        let initiator = self
            .initiator
            .describe(session_id)
            .await
            .map_err(|e| invalid(format!("{e:#}")))?;

        info!(session_id = %session_id, responder_url = %url, "Created session");
        let body = CreatedSession {
            routes: self.router.routes(),
            initiator,
        };
        Ok((StatusCode::CREATED, Json(body)).into_response())
    }

    async fn relay_to_responder(
        &self,
        session_id: &str,
        protocols: &[String],
        request: Request,
    ) -> Result<Response, RelayError> {
        let responder = self.lookup(session_id).await?;

        let unsupported = responder.unsupported(protocols);
        if !unsupported.is_empty() {
            debug!(session_id = %session_id, ?unsupported, "Unsupported protocols requested");
            return Err(RelayError::UnsupportedProtocols {
                unsupported: unsupported.into_iter().cloned().collect(),
            });
        }

        let response = self
            .forwarder
            .forward(&responder.url, session_id, request)
            .await
            .inspect_err(|e| warn!(session_id = %session_id, error = %e, "Failed to forward request"))?;
        Ok(response)
    }

    async fn get_responder(&self, session_id: &str) -> Result<Response, RelayError> {
        let responder = self.lookup(session_id).await?;
        Ok(Json(responder).into_response())
    }

    async fn lookup(&self, session_id: &str) -> Result<SessionResponder, RelayError> {
        self.store
            .get_responder(session_id)
            .await?
            .ok_or_else(|| RelayError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }
}
