//! Server side of the peering handshake.
//!
//! Two methods are mounted on the JSON-RPC engine:
//!
//! - `rpcpeering1/peer(proposal)` - `params` is the proposal object itself
//!   (a one-element array holding it is accepted too). Accept iff the remote topic equals the
//!   local one. On accept, `peer_connected` fires once with the remote URL and
//!   the local proposal is returned.
//! - `rpcpeering1/disconnect()` - fires `peer_disconnected`. Idempotent.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::proposal::{PeeringProposalResult, PeeringSessionProposal};
use crate::jsonrpc::{Method, MethodTable, NoParams, RpcOutput, RpcServer};

/// Method name of the handshake.
pub const PEER_METHOD: &str = "rpcpeering1/peer";

/// Method name of the teardown.
pub const DISCONNECT_METHOD: &str = "rpcpeering1/disconnect";

/// Lifecycle callbacks supplied by whoever hosts the peering endpoint.
#[async_trait::async_trait]
pub trait PeeringHooks: Send + Sync {
    /// The proposal this side offers.
    async fn session_proposal(&self) -> anyhow::Result<PeeringSessionProposal>;

    /// A remote peer was accepted.
    async fn peer_connected(&self, remote_url: &Url) -> anyhow::Result<()>;

    /// The remote peer asked to disconnect.
    async fn peer_disconnected(&self) -> anyhow::Result<()>;
}

/// Params of `rpcpeering1/peer`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PeerParams {
    Named(PeeringSessionProposal),
    Positional((PeeringSessionProposal,)),
}

impl From<PeerParams> for PeeringSessionProposal {
    fn from(params: PeerParams) -> Self {
        match params {
            PeerParams::Named(proposal) | PeerParams::Positional((proposal,)) => proposal,
        }
    }
}

/// Decide on a remote proposal.
///
/// # Errors
///
/// Propagates failures from the hooks; a failing `peer_connected` fails the
/// whole handshake.
pub async fn negotiate(
    hooks: &dyn PeeringHooks,
    remote: PeeringSessionProposal,
) -> anyhow::Result<PeeringProposalResult> {
    let local = hooks.session_proposal().await?;
    if !local.is_compatible_with(&remote) {
        debug!(
            local_topic = %local.topic,
            remote_topic = %remote.topic,
            "Rejecting peering proposal"
        );
        return Ok(PeeringProposalResult::Rejected);
    }

    hooks.peer_connected(&remote.url).await?;
    info!(topic = %local.topic, remote_url = %remote.url, "Peer connected");
    Ok(PeeringProposalResult::Accepted { proposal: local })
}

/// The peering methods as a mountable table.
pub fn peering_methods(hooks: Arc<dyn PeeringHooks>) -> MethodTable {
    let peer_hooks = hooks.clone();
    MethodTable::new()
        .with(
            PEER_METHOD,
            Method::call(move |params: PeerParams| {
                let hooks = peer_hooks.clone();
                async move { negotiate(hooks.as_ref(), params.into()).await }
            }),
        )
        .with(
            DISCONNECT_METHOD,
            Method::call(move |_: NoParams| {
                let hooks = hooks.clone();
                async move {
                    hooks.peer_disconnected().await?;
                    info!("Peer disconnected");
                    Ok(())
                }
            }),
        )
}

/// A JSON-RPC engine serving only the peering methods.
#[derive(Clone, Debug)]
pub struct PeeringServer {
    rpc: RpcServer,
}

impl PeeringServer {
    pub fn new(hooks: Arc<dyn PeeringHooks>) -> Self {
        Self {
            rpc: RpcServer::new(peering_methods(hooks)),
        }
    }

    pub fn rpc(&self) -> &RpcServer {
        &self.rpc
    }

    pub async fn handle(&self, request: Value) -> Option<RpcOutput> {
        self.rpc.handle(request).await
    }

    pub async fn handle_bytes(&self, body: &[u8]) -> Option<RpcOutput> {
        self.rpc.handle_bytes(body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingHooks {
        connected: Mutex<Vec<Url>>,
        disconnects: Mutex<usize>,
    }

    fn server_proposal() -> PeeringSessionProposal {
        PeeringSessionProposal {
            topic: "test".to_string(),
            url: Url::parse("https://server.example.com/rpcpeering").unwrap(),
            advertise: vec!["test2".to_string()],
        }
    }

    fn client_proposal(topic: &str) -> PeeringSessionProposal {
        PeeringSessionProposal {
            topic: topic.to_string(),
            url: Url::parse("https://client.example.com/rpcpeering").unwrap(),
            advertise: vec!["test2".to_string()],
        }
    }

    #[async_trait::async_trait]
    impl PeeringHooks for RecordingHooks {
        async fn session_proposal(&self) -> anyhow::Result<PeeringSessionProposal> {
            Ok(server_proposal())
        }

        async fn peer_connected(&self, remote_url: &Url) -> anyhow::Result<()> {
            self.connected.lock().push(remote_url.clone());
            Ok(())
        }

        async fn peer_disconnected(&self) -> anyhow::Result<()> {
            *self.disconnects.lock() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_equal_topics_accept_and_connect_once() {
        let hooks = RecordingHooks::default();

        let result = negotiate(&hooks, client_proposal("test")).await.unwrap();

        assert_eq!(
            result,
            PeeringProposalResult::Accepted {
                proposal: server_proposal()
            }
        );
        assert_eq!(
            *hooks.connected.lock(),
            vec![Url::parse("https://client.example.com/rpcpeering").unwrap()]
        );
    }

    #[tokio::test]
    async fn test_different_topics_reject_without_callback() {
        let hooks = RecordingHooks::default();

        let result = negotiate(&hooks, client_proposal("other")).await.unwrap();

        assert_eq!(result, PeeringProposalResult::Rejected);
        assert!(hooks.connected.lock().is_empty());
    }

    #[tokio::test]
    async fn test_peer_with_proposal_object_params() {
        let hooks = Arc::new(RecordingHooks::default());
        let server = PeeringServer::new(hooks.clone());

        let output = server
            .handle(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": PEER_METHOD,
                "params": {
                    "topic": "test",
                    "url": "https://client.example.com/rpcpeering",
                    "advertise": ["test2"]
                }
            }))
            .await;

        let value = serde_json::to_value(output.unwrap()).unwrap();
        assert_eq!(value["result"]["accepted"], true);
        assert_eq!(
            value["result"]["proposal"]["url"],
            "https://server.example.com/rpcpeering"
        );
        assert_eq!(hooks.connected.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_peer_with_positional_params() {
        let hooks = Arc::new(RecordingHooks::default());
        let server = PeeringServer::new(hooks.clone());

        let output = server
            .handle(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": PEER_METHOD,
                "params": [client_proposal("test")]
            }))
            .await;

        let value = serde_json::to_value(output.unwrap()).unwrap();
        assert_eq!(value["result"]["accepted"], true);
    }

    #[tokio::test]
    async fn test_disconnect_accepts_absent_and_empty_params() {
        let hooks = Arc::new(RecordingHooks::default());
        let server = PeeringServer::new(hooks.clone());

        for request in [
            json!({"jsonrpc": "2.0", "id": 1, "method": DISCONNECT_METHOD}),
            json!({"jsonrpc": "2.0", "id": 2, "method": DISCONNECT_METHOD, "params": []}),
        ] {
            let value = serde_json::to_value(server.handle(request).await.unwrap()).unwrap();
            assert_eq!(value["result"], Value::Null);
            assert!(value.get("error").is_none());
        }
        assert_eq!(*hooks.disconnects.lock(), 2);
    }

    #[tokio::test]
    async fn test_malformed_proposal_is_invalid_params() {
        let server = PeeringServer::new(Arc::new(RecordingHooks::default()));

        let output = server
            .handle(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": PEER_METHOD,
                "params": [{"topic": "test"}]
            }))
            .await;

        let value = serde_json::to_value(output.unwrap()).unwrap();
        assert_eq!(value["error"]["code"], -32602);
    }
}
