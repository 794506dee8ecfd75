//! rpcpeering - session relay and peering handshake for JSON-RPC peers.
//!
//! An *initiator* wants to call a *responder* it cannot reach directly. A
//! relay binds a session id to the responder's URL and proxies requests;
//! the peering handshake lets two parties agree on a session over JSON-RPC.
//!
//! # Modules
//!
//! - [`uri`] - connection and peering URI codecs, proposal embedding
//! - [`jsonrpc`] - JSON-RPC 2.0 engine and client
//! - [`peering`] - `rpcpeering1/peer` and `rpcpeering1/disconnect`
//! - [`store`] - session-to-responder storage (memory, SQLite)
//! - [`relay`] - HTTP session routing and forwarding
//! - [`config`] - YAML configuration for the relay binary

pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod logging_layer;
pub mod peering;
pub mod relay;
pub mod store;
pub mod uri;

pub use error::RpcError;
