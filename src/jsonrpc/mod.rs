//! JSON-RPC 2.0 engine and client.
//!
//! # Architecture
//!
//! ```text
//! HTTP body / Value
//!   → types::parse_requests     (single | batch | InvalidRequest)
//!   → RpcServer::dispatch       (per element, concurrent for batches)
//!   → MethodTable lookup        (Call | Notification)
//!   → RpcOutput                 (single | batch | nothing)
//! ```
//!
//! The client side mirrors it: [`RpcClient`] encodes calls and hands them to
//! a [`RequestSender`].

pub mod client;
pub mod method;
pub mod server;
pub mod types;

pub use client::{ClientError, HttpSender, LoopbackSender, RequestSender, RpcClient};
pub use method::{Method, MethodHandler, MethodTable, NoParams};
pub use server::RpcServer;
pub use types::{JsonRpcId, JsonRpcRequest, JsonRpcResponse, RpcOutput};
