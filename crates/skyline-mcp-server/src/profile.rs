//! Profiles and their API configuration.
//!
//! A profile is a tenant: a bearer token plus a YAML config describing the
//! APIs it bundles. The config YAML is kept verbatim on the profile (it is
//! the cache fingerprint input) and parsed on demand.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use skyline_mcp_registry::{SpecSource, SpecType, resolve_spec_url};
use url::Url;

use crate::errors::GatewayError;

/// Default per-request timeout against an upstream API.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default retry budget for retryable failures.
pub const DEFAULT_RETRIES: u32 = 2;

/// Default cap on response bodies returned to clients.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 512 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub token: String,
    pub config_yaml: String,
}

impl Profile {
    pub fn config(&self) -> Result<ProfileConfig, GatewayError> {
        let mut config: ProfileConfig = serde_yaml::from_str(&self.config_yaml)
            .map_err(|e| GatewayError::BadArguments(format!("invalid profile config: {e}")))?;
        config.apply_defaults();
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    #[serde(default)]
    pub apis: Vec<ApiConfig>,

    #[serde(default)]
    pub defaults: Defaults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Per-request timeout applied to APIs that set none.
    #[serde(default, with = "humantime_serde::option")]
    #[schemars(with = "Option<String>")]
    pub timeout: Option<Duration>,

    /// Retry budget applied to APIs that set none.
    #[serde(default)]
    pub retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    pub name: String,

    /// Spec URL or well-known alias.
    pub spec_url: String,

    /// Override the base URL declared by the spec.
    #[serde(default)]
    pub base_url: Option<Url>,

    /// Pin a spec format instead of auto-detecting.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub spec_type: Option<SpecType>,

    #[serde(default)]
    pub auth: Option<AuthConfig>,

    #[serde(default)]
    pub operation_filters: Option<OperationFilters>,

    #[serde(default)]
    pub max_response_bytes: Option<usize>,

    #[serde(default, with = "humantime_serde::option")]
    #[schemars(with = "Option<String>")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,

    #[serde(default)]
    pub circuit_breaker: Option<BreakerConfig>,

    #[serde(default)]
    pub graphql: Option<GraphQlConfig>,
}

impl ApiConfig {
    pub fn to_spec_source(&self) -> SpecSource {
        SpecSource {
            name: self.name.clone(),
            spec_url: self.spec_url.clone(),
            spec_type: self.spec_type,
            base_url_override: self.base_url.clone(),
            auth_header: self.auth.as_ref().and_then(AuthConfig::spec_fetch_header),
            include: self
                .operation_filters
                .as_ref()
                .map(|f| f.include.clone())
                .unwrap_or_default(),
            exclude: self
                .operation_filters
                .as_ref()
                .map(|f| f.exclude.clone())
                .unwrap_or_default(),
            crud_grouping: self
                .graphql
                .as_ref()
                .map(|g| g.enable_crud_grouping)
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct OperationFilters {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum AuthConfig {
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
    ApiKey {
        header: String,
        value: String,
    },
    OauthRefresh {
        token_url: Url,
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default)]
        scopes: Vec<String>,
    },
}

impl AuthConfig {
    /// Secret literals to register with the redactor.
    pub fn secrets(&self) -> Vec<String> {
        match self {
            Self::None => vec![],
            Self::Bearer { token } => vec![token.clone()],
            Self::Basic { password, .. } => vec![password.clone()],
            Self::ApiKey { value, .. } => vec![value.clone()],
            Self::OauthRefresh {
                client_secret,
                refresh_token,
                ..
            } => vec![client_secret.clone(), refresh_token.clone()],
        }
    }

    /// Header forwarded when fetching the spec itself, where that makes sense.
    fn spec_fetch_header(&self) -> Option<(String, String)> {
        match self {
            Self::Bearer { token } => {
                Some(("Authorization".to_string(), format!("Bearer {token}")))
            }
            Self::ApiKey { header, value } => Some((header.clone(), value.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub rpm: u32,
    #[serde(default)]
    pub rph: u32,
    #[serde(default)]
    pub rpd: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BreakerConfig {
    pub failure_threshold: u32,

    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub cooldown: Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GraphQlConfig {
    #[serde(default)]
    pub enable_crud_grouping: bool,
}

impl ProfileConfig {
    /// Fill unset per-API knobs from the profile defaults.
    pub fn apply_defaults(&mut self) {
        let timeout = self.defaults.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let retries = self.defaults.retries.unwrap_or(DEFAULT_RETRIES);
        for api in &mut self.apis {
            api.timeout.get_or_insert(timeout);
            api.retries.get_or_insert(retries);
            api.max_response_bytes
                .get_or_insert(DEFAULT_MAX_RESPONSE_BYTES);
        }
    }

    /// Every secret literal in the config, for redactor registration.
    pub fn secrets(&self) -> Vec<String> {
        self.apis
            .iter()
            .filter_map(|api| api.auth.as_ref())
            .flat_map(AuthConfig::secrets)
            .collect()
    }

    /// Validate the parts that can fail before any network traffic.
    pub fn validate(&self) -> Result<(), GatewayError> {
        for api in &self.apis {
            resolve_spec_url(&api.spec_url)?;
        }
        Ok(())
    }
}
