//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::relay::router::RouteConfigError;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A route template does not compile.
    #[error("invalid route table: {0}")]
    InvalidRoutes(#[from] RouteConfigError),

    /// A URL field is not a usable absolute http(s) URL.
    #[error("invalid URL '{url}' for '{field}': {message}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        message: String,
    },

    /// The listen address is not `host:port`.
    #[error("invalid listen address '{value}': {message}")]
    InvalidListenAddress { value: String, message: String },

    /// `rpc_path` must be an absolute path.
    #[error("rpc_path '{path}' must start with '/'")]
    InvalidRpcPath { path: String },

    /// The initiator must advertise something.
    #[error("initiator.protocols must not be empty")]
    NoInitiatorProtocols,

    /// Proposal topics cannot be empty or contain ':'.
    #[error("invalid initiator topic '{topic}'")]
    InvalidTopic { topic: String },

    /// A numeric limit is out of range.
    #[error("'{field}' must be greater than zero")]
    ZeroLimit { field: &'static str },

    /// An environment override holds an unusable value.
    #[error("environment variable '{var}' has invalid value '{value}': {message}")]
    InvalidEnvOverride {
        var: &'static str,
        value: String,
        message: String,
    },

    /// Required environment variable not set during substitution.
    #[error("environment variable '{var}' not set (required for field '{field}')")]
    MissingEnvVar { var: String, field: String },

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    ParseError(#[from] serde_saphyr::Error),

    /// I/O error reading config file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// An explicitly named config file does not exist.
    #[error("configuration file not found (searched: {searched:?})")]
    ConfigFileNotFound { searched: Vec<PathBuf> },

    /// Empty configuration file.
    #[error("configuration file is empty")]
    EmptyConfigFile,
}
