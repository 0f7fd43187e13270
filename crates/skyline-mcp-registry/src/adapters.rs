//! Spec adapters.
//!
//! One adapter per supported description format. Each adapter answers two
//! questions: does this byte blob look like my format (`detect`, pure and
//! signature based), and what canonical [`Service`] does it describe
//! (`parse`). The loader tries adapters in the fixed priority order returned
//! by [`all`].

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SpecError;
use crate::model::Service;

pub mod discovery;
pub mod graphql;
pub mod jenkins;
pub mod odata;
pub mod openapi;
pub mod openrpc;
pub mod postman;
pub mod wsdl;

/// Everything an adapter needs to build a service.
pub struct ParseInput<'a> {
    pub raw: &'a [u8],
    pub api_name: &'a str,
    pub base_url_override: Option<&'a Url>,

    /// Enable CRUD grouping for GraphQL schemas.
    pub crud_grouping: bool,
}

pub trait SpecAdapter: Send + Sync {
    /// The spec type this adapter handles.
    fn spec_type(&self) -> SpecType;

    /// Signature-based format sniffing. Must not allocate heavily and must
    /// never touch the network.
    fn detect(&self, raw: &[u8]) -> bool;

    /// Build a canonical service from raw spec bytes.
    fn parse(&self, input: &ParseInput<'_>) -> Result<Service, SpecError>;
}

/// Known spec formats, used to pin an adapter explicitly in an API config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpecType {
    Openapi,
    Graphql,
    Postman,
    Openrpc,
    Odata,
    Wsdl,
    GoogleDiscovery,
    Jenkins,
}

impl std::fmt::Display for SpecType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Openapi => "openapi",
            Self::Graphql => "graphql",
            Self::Postman => "postman",
            Self::Openrpc => "openrpc",
            Self::Odata => "odata",
            Self::Wsdl => "wsdl",
            Self::GoogleDiscovery => "google-discovery",
            Self::Jenkins => "jenkins",
        };
        f.write_str(name)
    }
}

/// All adapters in detection priority order.
pub fn all() -> Vec<Box<dyn SpecAdapter>> {
    vec![
        Box::new(openapi::OpenApiAdapter),
        Box::new(graphql::GraphQlAdapter),
        Box::new(postman::PostmanAdapter),
        Box::new(openrpc::OpenRpcAdapter),
        Box::new(odata::ODataAdapter),
        Box::new(wsdl::WsdlAdapter),
        Box::new(discovery::GoogleDiscoveryAdapter),
        Box::new(jenkins::JenkinsAdapter),
    ]
}

/// Parse bytes that may be JSON or YAML into a JSON value.
pub(crate) fn parse_json_or_yaml(
    api_name: &str,
    raw: &[u8],
) -> Result<serde_json::Value, SpecError> {
    if let Ok(value) = serde_json::from_slice(raw) {
        return Ok(value);
    }
    serde_yaml::from_slice(raw).map_err(|e| SpecError::parse(api_name, e.to_string()))
}

/// Case-sensitive substring scan used by the detect implementations.
pub(crate) fn contains_bytes(haystack: &[u8], needle: &str) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle.as_bytes())
}
