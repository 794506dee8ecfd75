//! Connection URI: `rpcpeering-v1:<p1>,<p2>,...@<url>`.

use std::fmt;
use std::str::FromStr;

use url::Url;

use super::{UriError, parse_url};

/// A relay URL plus the protocols a peer can speak through it.
///
/// Immutable once built; `Display` output round-trips through `FromStr`.
///
/// # Example
///
/// ```
/// use rpcpeering::uri::ConnectionUri;
///
/// let uri: ConnectionUri = "rpcpeering-v1:eth,btc@https://relay.example/rpc"
///     .parse()
///     .unwrap();
/// assert_eq!(uri.protocols(), ["eth", "btc"]);
/// assert_eq!(uri.url().as_str(), "https://relay.example/rpc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionUri {
    protocols: Vec<String>,
    url: Url,
}

impl ConnectionUri {
    /// Scheme literal of connection URIs.
    pub const SCHEME: &'static str = "rpcpeering-v1";

    /// Build a connection URI.
    ///
    /// # Errors
    ///
    /// - `MissingProtocols` if `protocols` is empty
    /// - `InvalidProtocol` if an entry is empty or contains `,` or `@`
    pub fn new(url: Url, protocols: Vec<String>) -> Result<Self, UriError> {
        if protocols.is_empty() {
            return Err(UriError::MissingProtocols);
        }
        if let Some(bad) = protocols
            .iter()
            .find(|p| p.is_empty() || p.contains([',', '@']))
        {
            return Err(UriError::InvalidProtocol {
                protocol: bad.clone(),
            });
        }
        Ok(Self { protocols, url })
    }

    /// The relay URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Protocols in their encoded order.
    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }
}

impl fmt::Display for ConnectionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}",
            Self::SCHEME,
            self.protocols.join(","),
            self.url
        )
    }
}

impl FromStr for ConnectionUri {
    type Err = UriError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || UriError::InvalidFormat {
            input: input.to_string(),
        };

        let (scheme, rest) = input.split_once(':').ok_or_else(invalid)?;
        if scheme != Self::SCHEME {
            return Err(UriError::IncorrectScheme {
                expected: Self::SCHEME.to_string(),
                actual: scheme.to_string(),
            });
        }

        let (csv, url) = rest.split_once('@').ok_or_else(invalid)?;
        if url.is_empty() {
            return Err(invalid());
        }
        if csv.is_empty() {
            return Err(UriError::MissingProtocols);
        }

        let protocols = csv.split(',').map(str::to_string).collect();
        Self::new(parse_url(url)?, protocols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELAY: &str = "https://relay.example.com/sessions/abc/responder/requests/eth";

    #[test]
    fn test_decode_valid_uri() {
        let uri: ConnectionUri = format!("rpcpeering-v1:ethereum,danscanrpc-v1@{RELAY}")
            .parse()
            .unwrap();

        assert_eq!(uri.protocols(), ["ethereum", "danscanrpc-v1"]);
        assert_eq!(uri.url().as_str(), RELAY);
    }

    #[test]
    fn test_encode_matches_wire_format() {
        let uri = ConnectionUri::new(
            Url::parse(RELAY).unwrap(),
            vec!["a".to_string(), "b".to_string()],
        )
        .unwrap();

        assert_eq!(uri.to_string(), format!("rpcpeering-v1:a,b@{RELAY}"));
    }

    #[test]
    fn test_round_trip() {
        let uri = ConnectionUri::new(Url::parse(RELAY).unwrap(), vec!["x".to_string()]).unwrap();
        let decoded: ConnectionUri = uri.to_string().parse().unwrap();
        assert_eq!(decoded, uri);
    }

    #[test]
    fn test_incorrect_scheme_reports_actual() {
        let err = format!("rpcpeering-v2:a@{RELAY}")
            .parse::<ConnectionUri>()
            .unwrap_err();

        assert_eq!(
            err,
            UriError::IncorrectScheme {
                expected: "rpcpeering-v1".to_string(),
                actual: "rpcpeering-v2".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_at_is_invalid_format() {
        let err = "rpcpeering-v1:a,b".parse::<ConnectionUri>().unwrap_err();
        assert!(matches!(err, UriError::InvalidFormat { input } if input == "rpcpeering-v1:a,b"));
    }

    #[test]
    fn test_missing_url_is_invalid_format() {
        let err = "rpcpeering-v1:a@".parse::<ConnectionUri>().unwrap_err();
        assert!(matches!(err, UriError::InvalidFormat { .. }));
    }

    #[test]
    fn test_missing_colon_is_invalid_format() {
        let err = "rpcpeering-v1".parse::<ConnectionUri>().unwrap_err();
        assert!(matches!(err, UriError::InvalidFormat { .. }));
    }

    #[test]
    fn test_empty_protocols() {
        let err = format!("rpcpeering-v1:@{RELAY}")
            .parse::<ConnectionUri>()
            .unwrap_err();
        assert_eq!(err, UriError::MissingProtocols);
    }

    #[test]
    fn test_empty_protocol_entry_rejected() {
        let err = format!("rpcpeering-v1:a,,b@{RELAY}")
            .parse::<ConnectionUri>()
            .unwrap_err();
        assert!(matches!(err, UriError::InvalidProtocol { .. }));
    }

    #[test]
    fn test_relative_url_rejected() {
        let err = "rpcpeering-v1:a@/relative"
            .parse::<ConnectionUri>()
            .unwrap_err();
        assert!(matches!(err, UriError::InvalidUrl { .. }));
    }

    #[test]
    fn test_url_may_contain_at_sign() {
        let uri: ConnectionUri = "rpcpeering-v1:a@https://user@relay.example/"
            .parse()
            .unwrap();
        assert_eq!(uri.url().username(), "user");
    }

    #[test]
    fn test_constructor_rejects_reserved_characters() {
        let url = Url::parse(RELAY).unwrap();
        assert!(matches!(
            ConnectionUri::new(url.clone(), vec!["a,b".to_string()]),
            Err(UriError::InvalidProtocol { .. })
        ));
        assert!(matches!(
            ConnectionUri::new(url, vec![]),
            Err(UriError::MissingProtocols)
        ));
    }
}
