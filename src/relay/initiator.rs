//! The initiator side of a relayed session.
//!
//! Requests routed to a session's initiator are handed to an
//! [`InitiatorHooks`] implementation. [`PeeringInitiator`] is the one the
//! relay binary uses: it speaks JSON-RPC on the initiator route and mounts
//! a method set per requested protocol.
//!
//! | Protocol | Methods |
//! |----------|---------|
//! | `rpcpeering1` | `rpcpeering1/peer`, `rpcpeering1/disconnect` |
//! | `danscanrpc-v1` | `set_responder({url, protocols})` |
//!
//! A request naming neither protocol gets `501 {"message":"Not implemented"}`.

use std::sync::Arc;

use axum::Json;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use super::router::{RouteKind, SessionRouter};
use crate::jsonrpc::{Method, MethodTable, RpcServer};
use crate::peering::{PeeringHooks, PeeringSessionProposal, peering_methods};
use crate::store::{SessionResponder, SessionStore};

/// Protocol name of the peering handshake.
pub const PEERING_PROTOCOL: &str = "rpcpeering1";

/// Protocol name of direct responder registration.
pub const REGISTRATION_PROTOCOL: &str = "danscanrpc-v1";

/// What the initiator of a session supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiatorInfo {
    pub protocols: Vec<String>,
}

/// Hooks for the initiator side of every session.
#[async_trait::async_trait]
pub trait InitiatorHooks: Send + Sync {
    /// Handle a request relayed to the initiator of `session_id`.
    async fn handle_request(
        &self,
        session_id: &str,
        protocols: &[String],
        request: Request,
    ) -> anyhow::Result<Response>;

    /// Describe the initiator of `session_id`.
    async fn describe(&self, session_id: &str) -> anyhow::Result<InitiatorInfo>;
}

/// Initiator that serves the peering handshake for each session.
#[derive(Clone)]
pub struct PeeringInitiator {
    store: Arc<dyn SessionStore>,
    router: Arc<SessionRouter>,
    public_url: Url,
    topic: String,
    protocols: Vec<String>,
    max_body_size: usize,
}

impl std::fmt::Debug for PeeringInitiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeeringInitiator")
            .field("public_url", &self.public_url.as_str())
            .field("topic", &self.topic)
            .field("protocols", &self.protocols)
            .finish_non_exhaustive()
    }
}

impl PeeringInitiator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        router: Arc<SessionRouter>,
        public_url: Url,
        topic: impl Into<String>,
        protocols: Vec<String>,
    ) -> Self {
        Self {
            store,
            router,
            public_url,
            topic: topic.into(),
            protocols,
            max_body_size: SessionRouter::DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = limit;
        self
    }

    /// Public URL of the peering endpoint of `session_id`.
    ///
    /// # Errors
    ///
    /// Fails when the rendered path does not form a valid URL.
    pub fn session_url(&self, session_id: &str) -> Result<Url, url::ParseError> {
        let path = self
            .router
            .template(RouteKind::RelayInitiatorRequest)
            .render(session_id, &[PEERING_PROTOCOL.to_string()]);
        Url::parse(&format!(
            "{}{}",
            self.public_url.as_str().trim_end_matches('/'),
            path
        ))
    }

    /// The proposal offered for `session_id`.
    pub fn proposal(&self, session_id: &str) -> anyhow::Result<PeeringSessionProposal> {
        Ok(PeeringSessionProposal {
            topic: self.topic.clone(),
            url: self.session_url(session_id)?,
            advertise: self.protocols.clone(),
        })
    }

    /// JSON-RPC engine for `session_id`, mounting the methods of every
    /// recognised protocol in `protocols`. `None` when none is recognised.
    pub fn session_server(&self, session_id: &str, protocols: &[String]) -> Option<RpcServer> {
        let mut methods = MethodTable::new();
        let mut recognised = false;

        if protocols.iter().any(|p| p == PEERING_PROTOCOL) {
            methods = methods.merge(peering_methods(Arc::new(SessionPeering {
                initiator: self.clone(),
                session_id: session_id.to_string(),
            })));
            recognised = true;
        }
        if protocols.iter().any(|p| p == REGISTRATION_PROTOCOL) {
            methods = methods.merge(registration_methods(
                self.store.clone(),
                session_id.to_string(),
            ));
            recognised = true;
        }

        recognised.then(|| RpcServer::new(methods))
    }

    /// JSON-RPC engine serving only the peering handshake for `session_id`.
    pub fn peering_server(&self, session_id: &str) -> RpcServer {
        RpcServer::new(peering_methods(Arc::new(SessionPeering {
            initiator: self.clone(),
            session_id: session_id.to_string(),
        })))
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }
}

#[async_trait::async_trait]
impl InitiatorHooks for PeeringInitiator {
    async fn handle_request(
        &self,
        session_id: &str,
        protocols: &[String],
        request: Request,
    ) -> anyhow::Result<Response> {
        let Some(server) = self.session_server(session_id, protocols) else {
            debug!(session_id = %session_id, ?protocols, "No initiator protocol recognised");
            return Ok((
                StatusCode::NOT_IMPLEMENTED,
                Json(json!({ "message": "Not implemented" })),
            )
                .into_response());
        };

        let body = axum::body::to_bytes(request.into_body(), self.max_body_size).await?;
        Ok(rpc_response(server.handle_bytes(&body).await))
    }

    async fn describe(&self, _session_id: &str) -> anyhow::Result<InitiatorInfo> {
        Ok(InitiatorInfo {
            protocols: self.protocols.clone(),
        })
    }
}

/// JSON-RPC output as an HTTP response; no output is `204 No Content`.
pub fn rpc_response(output: Option<crate::jsonrpc::RpcOutput>) -> Response {
    match output {
        Some(output) => (StatusCode::OK, Json(output)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Peering hooks bound to one session.
struct SessionPeering {
    initiator: PeeringInitiator,
    session_id: String,
}

#[async_trait::async_trait]
impl PeeringHooks for SessionPeering {
    async fn session_proposal(&self) -> anyhow::Result<PeeringSessionProposal> {
        self.initiator.proposal(&self.session_id)
    }

    async fn peer_connected(&self, remote_url: &Url) -> anyhow::Result<()> {
        let responder =
            SessionResponder::new(remote_url.clone(), vec![self.initiator.topic.clone()]);
        self.initiator
            .store
            .set_responder(&self.session_id, responder)
            .await?;
        info!(session_id = %self.session_id, remote_url = %remote_url, "Session peered");
        Ok(())
    }

    async fn peer_disconnected(&self) -> anyhow::Result<()> {
        self.initiator.store.delete_session(&self.session_id).await?;
        info!(session_id = %self.session_id, "Session unpeered");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SetResponderParams {
    url: Url,
    protocols: Vec<String>,
}

fn registration_methods(store: Arc<dyn SessionStore>, session_id: String) -> MethodTable {
    MethodTable::new().with(
        "set_responder",
        Method::call(move |params: SetResponderParams| {
            let store = store.clone();
            let session_id = session_id.clone();
            async move {
                store
                    .set_responder(
                        &session_id,
                        SessionResponder::new(params.url, params.protocols),
                    )
                    .await?;
                info!(session_id = %session_id, "Responder registered by initiator");
                Ok(true)
            }
        }),
    )
}
