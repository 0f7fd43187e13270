use std::time::Duration;

use skyline_mcp_registry::SpecError;

use crate::rate_limit::RateTier;

/// An MCP tool error.
pub type McpError = rmcp::model::ErrorData;

/// An error surfaced by a tool execution or gateway request.
///
/// Each variant maps to a distinct HTTP status and JSON-RPC code at the
/// boundary. Messages are passed through the redactor before they leave the
/// process.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid arguments: {0}")]
    BadArguments(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("rate limited ({tier}), retry after {retry_after:?}")]
    RateLimited {
        tier: RateTier,
        retry_after: Duration,
    },

    #[error("circuit open for {api}, retry in {retry_in:?}")]
    CircuitOpen {
        api: String,
        retry_in: Duration,
        last_error: Option<String>,
    },

    #[error("upstream returned {status}")]
    Upstream { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The HTTP status this error maps to at the REST boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadArguments(_) => 400,
            Self::UnknownTool(_) | Self::UnknownProfile(_) => 404,
            Self::Unauthorized => 401,
            Self::Spec(SpecError::UnsupportedSpec(_)) => 422,
            Self::Spec(_) => 502,
            Self::RateLimited { .. } => 429,
            Self::CircuitOpen { .. } => 503,
            Self::Upstream { status, .. } => *status,
            Self::Timeout => 504,
            Self::Crypto(_) | Self::Internal(_) => 500,
        }
    }

    /// The JSON-RPC error code used on the streaming transports.
    pub fn json_rpc_code(&self) -> i32 {
        match self {
            Self::BadArguments(_) => -32602,
            Self::UnknownTool(_) | Self::UnknownProfile(_) => -32601,
            _ => -32603,
        }
    }

    /// A short machine tag identifying the error class.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::BadArguments(_) => "bad_arguments",
            Self::UnknownTool(_) => "unknown_tool",
            Self::UnknownProfile(_) => "unknown_profile",
            Self::Unauthorized => "unauthorized",
            Self::Spec(SpecError::UnsupportedSpec(_)) => "unsupported_spec",
            Self::Spec(SpecError::Fetch { .. }) | Self::Spec(SpecError::FetchStatus { .. }) => {
                "fetch_error"
            }
            Self::Spec(_) => "parse_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Upstream { .. } => "upstream_error",
            Self::Timeout => "timeout",
            Self::Crypto(_) => "crypto_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether a retry at the executor level may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Timeout => false,
            _ => false,
        }
    }
}
