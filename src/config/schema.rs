//! Configuration schema for the relay.
//!
//! Every field has a default, so an empty mapping (`{}`) is a complete
//! configuration for a local relay on `127.0.0.1:4180`.
//!
//! ```yaml
//! listen: 0.0.0.0:4180
//! public_url: https://relay.example
//! rpc_path: /rpc
//! max_body_size: 1048576
//!
//! routes:
//!   create_session: /sessions/[session]/[protocols]
//!
//! initiator:
//!   topic: eth-mainnet
//!   protocols: [rpcpeering1, ethereum]
//!
//! store:
//!   type: sqlite
//!   path: /var/lib/rpcpeering/sessions.db
//!
//! upstream:
//!   connect_timeout: 5s
//!   forward_timeout: 30s
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::relay::initiator::PEERING_PROTOCOL;
use crate::relay::router::RouteTable;
use crate::relay::upstream::UpstreamConfig;

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:4180";

/// Default path of the standalone JSON-RPC endpoint.
pub const DEFAULT_RPC_PATH: &str = "/rpc";

/// Default cap on buffered request bodies (1 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Top-level relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Socket address to bind.
    pub listen: String,

    /// Externally reachable base URL. Defaults to `http://{listen}`.
    pub public_url: Option<Url>,

    /// Path of the standalone peering endpoint.
    pub rpc_path: String,

    /// Maximum buffered request body, in bytes.
    pub max_body_size: usize,

    pub routes: RouteTable,

    pub initiator: InitiatorConfig,

    pub store: StoreConfig,

    pub upstream: UpstreamConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            public_url: None,
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            routes: RouteTable::default(),
            initiator: InitiatorConfig::default(),
            store: StoreConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl RelayConfig {
    /// The configured public URL, or one derived from `listen`.
    ///
    /// # Errors
    ///
    /// Fails when no public URL is configured and `listen` does not form a
    /// valid URL authority.
    pub fn effective_public_url(&self) -> Result<Url, url::ParseError> {
        match &self.public_url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(&format!("http://{}", self.listen)),
        }
    }
}

/// How this relay presents itself as a session initiator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InitiatorConfig {
    /// Topic offered in peering proposals; peers must present the same one.
    pub topic: String,

    /// Protocols advertised in proposals and session descriptions.
    pub protocols: Vec<String>,
}

impl Default for InitiatorConfig {
    fn default() -> Self {
        Self {
            topic: "rpcpeering".to_string(),
            protocols: vec![PEERING_PROTOCOL.to_string()],
        }
    }
}

/// Session store backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum StoreConfig {
    /// Sessions live in process memory.
    #[default]
    Memory,

    /// Sessions persist in a SQLite database file.
    Sqlite { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_mapping_is_default() {
        let config: RelayConfig = serde_saphyr::from_str("{}").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(
            config.effective_public_url().unwrap().as_str(),
            "http://127.0.0.1:4180/"
        );
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
listen: "0.0.0.0:9000"
public_url: https://relay.example/base
rpc_path: /peering
max_body_size: 2048
routes:
  get_responder: /s/[session]/responder
initiator:
  topic: eth-mainnet
  protocols: [rpcpeering1, ethereum]
store:
  type: sqlite
  path: /tmp/sessions.db
upstream:
  connect_timeout: 2s
  forward_timeout: 1m
"#;
        let config: RelayConfig = serde_saphyr::from_str(yaml).unwrap();

        assert_eq!(config.listen, "0.0.0.0:9000");
        assert_eq!(
            config.effective_public_url().unwrap().as_str(),
            "https://relay.example/base"
        );
        assert_eq!(config.routes.get_responder, "/s/[session]/responder");
        assert_eq!(
            config.routes.create_session,
            RouteTable::default().create_session
        );
        assert_eq!(config.initiator.topic, "eth-mainnet");
        assert_eq!(
            config.store,
            StoreConfig::Sqlite {
                path: PathBuf::from("/tmp/sessions.db")
            }
        );
        assert_eq!(config.upstream.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.upstream.forward_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(serde_saphyr::from_str::<RelayConfig>("listne: 1.2.3.4:5\n").is_err());
    }

    #[test]
    fn test_memory_store_tag() {
        let config: RelayConfig = serde_saphyr::from_str("store:\n  type: memory\n").unwrap();
        assert_eq!(config.store, StoreConfig::Memory);
    }
}
