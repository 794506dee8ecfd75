//! Compact URI encodings for out-of-band session discovery.
//!
//! Two URI shapes carry relay information across QR codes and deep links:
//!
//! - [`ConnectionUri`] - `rpcpeering-v1:<p1>,<p2>@<url>`: a relay URL plus
//!   the protocols reachable through it.
//! - [`PeeringUri`] - `rpcpeering+<topic>:<percent-encoded url>`: where to
//!   send a peering proposal for a topic.
//!
//! The [`interop`] module embeds a full peering proposal into third-party
//! connection URIs as a query parameter.
//!
//! All parsing is pure: no I/O, no allocation beyond the decoded values.

pub mod connection;
pub mod interop;
pub mod peering;

pub use connection::ConnectionUri;
pub use peering::PeeringUri;

use thiserror::Error;

/// Errors raised while encoding or decoding URIs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UriError {
    /// The scheme segment did not match the expected literal.
    #[error("incorrect scheme: expected '{expected}', got '{actual}'")]
    IncorrectScheme { expected: String, actual: String },

    /// A required separator or segment is missing.
    #[error("invalid URI format: '{input}'")]
    InvalidFormat { input: String },

    /// The protocol list is empty.
    #[error("URI does not carry any protocols")]
    MissingProtocols,

    /// The embedded URL is not an absolute URL.
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The topic is empty or contains a reserved character.
    #[error("invalid topic '{topic}'")]
    InvalidTopic { topic: String },

    /// A protocol entry is empty or contains a reserved character.
    #[error("invalid protocol '{protocol}'")]
    InvalidProtocol { protocol: String },

    /// An embedded peering proposal could not be decoded.
    #[error("invalid embedded proposal: {reason}")]
    InvalidProposal { reason: String },
}

/// Parse an absolute URL, mapping failures to [`UriError::InvalidUrl`].
pub(crate) fn parse_url(raw: &str) -> Result<url::Url, UriError> {
    url::Url::parse(raw).map_err(|source| UriError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}
