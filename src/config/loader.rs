//! Configuration loading and validation.
//!
//! # Loading Flow
//!
//! 1. Locate the file: `--config`, then `$RPCPEERING_CONFIG`, then
//!    `./rpcpeering.yaml`. Nothing found means built-in defaults.
//! 2. Reject empty files.
//! 3. Substitute `${VAR}` / `${VAR:-default}`.
//! 4. Parse YAML.
//! 5. Apply `RPCPEERING_*` environment overrides.
//! 6. Validate.

use regex::Regex;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use tracing::{debug, info};
use url::Url;

use super::error::ConfigError;
use super::schema::{RelayConfig, StoreConfig};
use crate::relay::router::SessionRouter;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "RPCPEERING_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "./rpcpeering.yaml";

/// Overrides `listen`.
pub const LISTEN_ENV: &str = "RPCPEERING_LISTEN";

/// Overrides `public_url`.
pub const PUBLIC_URL_ENV: &str = "RPCPEERING_PUBLIC_URL";

/// Switches the store to SQLite at this path.
pub const SQLITE_PATH_ENV: &str = "RPCPEERING_SQLITE_PATH";

/// Configuration file search paths (in priority order), after `--config`.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        paths.push(PathBuf::from(path));
    }
    paths.push(PathBuf::from(LOCAL_CONFIG_FILE));
    paths
}

/// Find the config file to load.
///
/// An explicit path must exist. Otherwise the first existing default path
/// wins, and `Ok(None)` means run on defaults.
///
/// # Errors
///
/// Returns `ConfigError::ConfigFileNotFound` when `explicit_path` is given
/// but missing.
pub fn find_config_file(explicit_path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ConfigError::ConfigFileNotFound {
            searched: vec![path.to_path_buf()],
        });
    }

    Ok(default_config_paths().into_iter().find(|p| p.exists()))
}

/// Load configuration from a file path, without overrides or validation.
///
/// # Errors
///
/// I/O, empty file, env substitution, or YAML errors.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Err(ConfigError::EmptyConfigFile);
    }

    let contents = substitute_env_vars(&contents)?;
    let config: RelayConfig = serde_saphyr::from_str(&contents)?;
    Ok(config)
}

/// Locate, load, override, and validate the relay configuration.
///
/// # Errors
///
/// Any loading, override, or validation error.
pub fn load_and_validate(explicit_path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    let mut config = match find_config_file(explicit_path)? {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            load_config(&path)?
        }
        None => {
            debug!("No configuration file found, using defaults");
            RelayConfig::default()
        }
    };

    apply_env_overrides(&mut config)?;
    validate(&config)?;
    Ok(config)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment Variable Substitution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

// ${VAR} and ${VAR:-default}
static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid regex")
});

/// Substitute environment variables in a string.
///
/// # Syntax
/// - `${VAR}` - Required, fail if not set
/// - `${VAR:-default}` - Optional with default
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` for the first required variable
/// that is not set.
pub fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut missing = None;
    let result = ENV_VAR_PATTERN.replace_all(content, |cap: &regex::Captures<'_>| {
        let var_name = &cap[1];
        match (std::env::var(var_name), cap.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    if let Some(var) = missing {
        return Err(ConfigError::MissingEnvVar {
            var,
            field: "configuration".to_string(),
        });
    }
    Ok(result.into_owned())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment Overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Apply `RPCPEERING_*` overrides on top of a loaded config.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvOverride` when `RPCPEERING_PUBLIC_URL`
/// is not a URL.
pub fn apply_env_overrides(config: &mut RelayConfig) -> Result<(), ConfigError> {
    if let Ok(listen) = std::env::var(LISTEN_ENV) {
        config.listen = listen;
    }

    if let Ok(raw) = std::env::var(PUBLIC_URL_ENV) {
        let url = Url::parse(&raw).map_err(|e| ConfigError::InvalidEnvOverride {
            var: PUBLIC_URL_ENV,
            value: raw.clone(),
            message: e.to_string(),
        })?;
        config.public_url = Some(url);
    }

    if let Ok(path) = std::env::var(SQLITE_PATH_ENV) {
        config.store = StoreConfig::Sqlite {
            path: PathBuf::from(path),
        };
    }

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate a configuration.
///
/// # Errors
///
/// The first violated rule.
pub fn validate(config: &RelayConfig) -> Result<(), ConfigError> {
    config
        .listen
        .parse::<SocketAddr>()
        .map_err(|e| ConfigError::InvalidListenAddress {
            value: config.listen.clone(),
            message: e.to_string(),
        })?;

    let public_url = config
        .effective_public_url()
        .map_err(|e| ConfigError::InvalidUrl {
            field: "public_url",
            url: config.listen.clone(),
            message: e.to_string(),
        })?;
    if !matches!(public_url.scheme(), "http" | "https") || public_url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            field: "public_url",
            url: public_url.to_string(),
            message: "expected an absolute http(s) URL".to_string(),
        });
    }

    if !config.rpc_path.starts_with('/') {
        return Err(ConfigError::InvalidRpcPath {
            path: config.rpc_path.clone(),
        });
    }

    if config.max_body_size == 0 {
        return Err(ConfigError::ZeroLimit {
            field: "max_body_size",
        });
    }
    if config.upstream.max_request_body == 0 {
        return Err(ConfigError::ZeroLimit {
            field: "upstream.max_request_body",
        });
    }

    if config.initiator.protocols.is_empty() {
        return Err(ConfigError::NoInitiatorProtocols);
    }
    let topic = &config.initiator.topic;
    if topic.is_empty() || topic.contains(':') {
        return Err(ConfigError::InvalidTopic {
            topic: topic.clone(),
        });
    }

    SessionRouter::new(&config.routes)?;
    Ok(())
}
