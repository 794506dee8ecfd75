//! Client side of the peering handshake.

use thiserror::Error;

use super::proposal::{PeeringProposalResult, PeeringSessionProposal};
use super::server::{DISCONNECT_METHOD, PEER_METHOD};
use crate::jsonrpc::{ClientError, RequestSender, RpcClient};

/// Errors raised while peering.
#[derive(Debug, Error)]
pub enum PeeringClientError {
    /// The remote answered `{"accepted": false}`.
    #[error("peer rejected the session proposal")]
    PeerRejectedProposal,

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Speaks `rpcpeering1/*` to a remote peering endpoint.
#[derive(Debug)]
pub struct PeeringClient<S> {
    rpc: RpcClient<S>,
}

impl<S: RequestSender> PeeringClient<S> {
    pub fn new(sender: S) -> Self {
        Self {
            rpc: RpcClient::new(sender),
        }
    }

    /// Offer `local` and return the remote's proposal on acceptance.
    ///
    /// The proposal object is sent as `params` directly.
    ///
    /// # Errors
    ///
    /// - `PeerRejectedProposal` if the remote rejects
    /// - `Client` for transport or protocol failures
    pub async fn peer(
        &self,
        local: &PeeringSessionProposal,
    ) -> Result<PeeringSessionProposal, PeeringClientError> {
        match self.rpc.call(PEER_METHOD, local).await? {
            PeeringProposalResult::Accepted { proposal } => Ok(proposal),
            PeeringProposalResult::Rejected => Err(PeeringClientError::PeerRejectedProposal),
        }
    }

    /// Tell the remote to tear the session down.
    pub async fn disconnect(&self) -> Result<(), PeeringClientError> {
        let () = self.rpc.call(DISCONNECT_METHOD, ()).await?;
        Ok(())
    }
}
