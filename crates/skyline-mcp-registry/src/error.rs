use url::Url;

/// Errors raised while fetching and normalising API specifications
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("no adapter recognised the spec for API '{0}'")]
    UnsupportedSpec(String),

    #[error("failed to fetch spec from {url}: {reason}")]
    Fetch { url: Url, reason: String },

    #[error("spec fetch from {url} returned status {status}")]
    FetchStatus { url: Url, status: u16 },

    #[error("could not parse spec for API '{api}': {reason}")]
    Parse { api: String, reason: String },

    #[error("invalid spec URL '{0}'")]
    InvalidUrl(String),

    #[error("no base URL available for API '{0}': the spec declares none and no override was given")]
    MissingBaseUrl(String),

    #[error("reserved argument name 'selection' used by field '{0}'")]
    ReservedArgument(String),

    #[error("invalid operation filter pattern '{pattern}': {reason}")]
    InvalidFilter { pattern: String, reason: String },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SpecError {
    pub fn parse(api: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            api: api.into(),
            reason: reason.into(),
        }
    }
}
