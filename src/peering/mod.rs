//! Peering handshake protocol.
//!
//! Two parties exchange [`PeeringSessionProposal`]s over JSON-RPC and agree
//! to connect when their topics match. The server half mounts onto any
//! [`crate::jsonrpc::RpcServer`]; the client half drives it from the other
//! side.

pub mod client;
pub mod proposal;
pub mod server;

pub use client::{PeeringClient, PeeringClientError};
pub use proposal::{PeeringProposalResult, PeeringSessionProposal};
pub use server::{
    DISCONNECT_METHOD, PEER_METHOD, PeeringHooks, PeeringServer, negotiate, peering_methods,
};
