//! Relay configuration.
//!
//! This module provides:
//! - YAML configuration parsing
//! - Environment variable substitution and overrides
//! - Configuration validation
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! let config = rpcpeering::config::load_and_validate(Some(Path::new("relay.yaml")))?;
//! println!("listening on {}", config.listen);
//! # Ok::<(), rpcpeering::config::ConfigError>(())
//! ```

pub mod duration_format;
mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::{
    CONFIG_ENV, LISTEN_ENV, LOCAL_CONFIG_FILE, PUBLIC_URL_ENV, SQLITE_PATH_ENV,
    apply_env_overrides, default_config_paths, find_config_file, load_and_validate, load_config,
    substitute_env_vars, validate,
};
pub use schema::{
    DEFAULT_LISTEN, DEFAULT_MAX_BODY_SIZE, DEFAULT_RPC_PATH, InitiatorConfig, RelayConfig,
    StoreConfig,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::router::SessionRouter;

    #[test]
    fn test_full_loading_flow() {
        let yaml = r#"
listen: "127.0.0.1:8080"
public_url: https://relay.example
initiator:
  topic: eth-mainnet
  protocols: [rpcpeering1, ethereum]
routes:
  create_session: /v1/[session]/[protocols]
"#;
        let config: RelayConfig = serde_saphyr::from_str(yaml).unwrap();
        validate(&config).unwrap();

        let router = SessionRouter::new(&config.routes).unwrap();
        let matched = router
            .classify(&http::Method::POST, "/v1/abc/ethereum")
            .unwrap();
        assert_eq!(matched.session_id, "abc");
    }
}
