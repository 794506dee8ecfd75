//! Peering URI: `rpcpeering+<topic>:<percent-encoded url>`.

use std::fmt;
use std::str::FromStr;

use url::Url;

use super::{UriError, parse_url};

/// Where to send a peering proposal for a topic.
///
/// The topic may contain `+`; only the first `+` separates it from the
/// scheme. The URL is percent-encoded so it survives QR codes and deep
/// links untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeeringUri {
    topic: String,
    url: Url,
}

impl PeeringUri {
    /// Scheme literal of peering URIs.
    pub const SCHEME: &'static str = "rpcpeering";

    /// Build a peering URI.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTopic` when the topic is empty or contains `:`.
    pub fn new(topic: impl Into<String>, url: Url) -> Result<Self, UriError> {
        let topic = topic.into();
        if topic.is_empty() || topic.contains(':') {
            return Err(UriError::InvalidTopic { topic });
        }
        Ok(Self { topic, url })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for PeeringUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}+{}:{}",
            Self::SCHEME,
            self.topic,
            urlencoding::encode(self.url.as_str())
        )
    }
}

impl FromStr for PeeringUri {
    type Err = UriError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || UriError::InvalidFormat {
            input: input.to_string(),
        };

        let (head, payload) = input.split_once(':').ok_or_else(invalid)?;
        let (scheme, topic) = head.split_once('+').unwrap_or((head, ""));
        if scheme != Self::SCHEME {
            return Err(UriError::IncorrectScheme {
                expected: Self::SCHEME.to_string(),
                actual: scheme.to_string(),
            });
        }
        if payload.is_empty() {
            return Err(invalid());
        }

        let decoded = urlencoding::decode(payload).map_err(|_| invalid())?;
        Self::new(topic, parse_url(&decoded)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_URL: &str = "https://server.example.com/rpcpeering";

    #[test]
    fn test_decode_valid_uri() {
        let raw = format!("rpcpeering+test:{}", urlencoding::encode(SERVER_URL));
        let uri: PeeringUri = raw.parse().unwrap();

        assert_eq!(uri.topic(), "test");
        assert_eq!(uri.url().as_str(), SERVER_URL);
    }

    #[test]
    fn test_encode_percent_encodes_url() {
        let uri = PeeringUri::new("test", Url::parse(SERVER_URL).unwrap()).unwrap();
        assert_eq!(
            uri.to_string(),
            "rpcpeering+test:https%3A%2F%2Fserver.example.com%2Frpcpeering"
        );
    }

    #[test]
    fn test_topic_may_contain_plus() {
        let raw = format!("rpcpeering+a+b:{}", urlencoding::encode(SERVER_URL));
        let uri: PeeringUri = raw.parse().unwrap();
        assert_eq!(uri.topic(), "a+b");
        assert_eq!(uri.to_string(), raw);
    }

    #[test]
    fn test_incorrect_scheme_reports_actual() {
        let err = "walletconnect+test:abc".parse::<PeeringUri>().unwrap_err();
        assert_eq!(
            err,
            UriError::IncorrectScheme {
                expected: "rpcpeering".to_string(),
                actual: "walletconnect".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_payload_is_invalid_format() {
        assert!(matches!(
            "rpcpeering+test:".parse::<PeeringUri>(),
            Err(UriError::InvalidFormat { .. })
        ));
        assert!(matches!(
            "rpcpeering+test".parse::<PeeringUri>(),
            Err(UriError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_missing_topic_rejected() {
        let raw = format!("rpcpeering:{}", urlencoding::encode(SERVER_URL));
        assert!(matches!(
            raw.parse::<PeeringUri>(),
            Err(UriError::InvalidTopic { .. })
        ));
    }

    #[test]
    fn test_relative_url_rejected() {
        assert!(matches!(
            "rpcpeering+test:%2Frelative".parse::<PeeringUri>(),
            Err(UriError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_invalid_percent_encoding_rejected() {
        assert!(matches!(
            "rpcpeering+test:%FF%FE".parse::<PeeringUri>(),
            Err(UriError::InvalidFormat { .. })
        ));
    }
}
