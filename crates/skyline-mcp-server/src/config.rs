//! Server runtime configuration.
//!
//! Read from a YAML file with `SKYLINE_`-prefixed environment variables
//! layered on top; nested fields use `__` in the variable name
//! (`SKYLINE_LOGGING__LEVEL=debug`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::JsonSchema;
use serde::Deserialize;
use url::Url;

/// Separator for nested options in environment variables.
const ENV_NESTED_SEPARATOR: &str = "__";

/// Default request body cap.
const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub bind: SocketAddr,

    /// Path of the encrypted profile store.
    pub storage: PathBuf,

    /// Bearer-token enforcement mode.
    pub auth_mode: AuthMode,

    /// Token accepted on `/admin/*` and as a master token on profile routes.
    pub admin_token: Option<String>,

    /// Profile artefact cache TTL.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub cache_ttl: Duration,

    /// Optional JSON-lines audit sink.
    pub audit_log: Option<PathBuf>,

    /// Optional periodic push of the Prometheus text to an endpoint.
    pub metrics_push: Option<MetricsPush>,

    /// Cap on inbound request bodies, in bytes.
    pub body_limit: usize,

    pub logging: Logging,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8443)),
            storage: PathBuf::from("profiles.enc.yaml"),
            auth_mode: AuthMode::Bearer,
            admin_token: None,
            cache_ttl: crate::cache::DEFAULT_TTL,
            audit_log: None,
            metrics_push: None,
            body_limit: DEFAULT_BODY_LIMIT,
            logging: Logging::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// No token checks; only suitable behind a trusted proxy.
    None,
    /// Profile routes require the profile token, admin routes the admin token.
    Bearer,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MetricsPush {
    #[schemars(with = "String")]
    pub endpoint: Url,

    #[serde(with = "humantime_serde", default = "MetricsPush::default_interval")]
    #[schemars(with = "String")]
    pub interval: Duration,
}

impl MetricsPush {
    fn default_interval() -> Duration {
        Duration::from_secs(30)
    }
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub level: LogLevel,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Read configuration from environment variables only.
#[allow(clippy::result_large_err)]
pub fn read_config_from_env() -> Result<ServerConfig, figment::Error> {
    Figment::new()
        .join(Env::prefixed("SKYLINE_").split(ENV_NESTED_SEPARATOR))
        .extract()
}

/// Read a YAML config file, filling missing values from the environment.
#[allow(clippy::result_large_err)]
pub fn read_config(yaml_path: impl AsRef<Path>) -> Result<ServerConfig, figment::Error> {
    Figment::new()
        .join(Env::prefixed("SKYLINE_").split(ENV_NESTED_SEPARATOR))
        .join(Yaml::file(yaml_path))
        .extract()
}
