//! The session relay.
//!
//! # Architecture
//!
//! ```text
//! HTTP request
//!   → router::SessionRouter       (method + path → Route)
//!   → handler::RelayHandler       (store lookups, status mapping)
//!       ├─ upstream::HttpForwarder      (relay to responder)
//!       └─ initiator::PeeringInitiator  (relay to initiator)
//!   → HTTP response
//! ```

pub mod handler;
pub mod initiator;
pub mod router;
pub mod server;
pub mod upstream;

pub use handler::{CreatedSession, RelayError, RelayHandler};
pub use initiator::{InitiatorHooks, InitiatorInfo, PEERING_PROTOCOL, PeeringInitiator};
pub use router::{
    Route, RouteConfigError, RouteError, RouteKind, RouteMatch, RouteTable, RouteTemplate,
    SessionRouter, SupportedRoute,
};
pub use server::{RelayBuildError, RelayServer, open_store, relay_app};
pub use upstream::{ForwardError, HttpForwarder, ResponderForwarder, UpstreamConfig};
