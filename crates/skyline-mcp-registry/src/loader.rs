//! Spec loader: fetch, adapter dispatch, post-processing.
//!
//! For each configured API the loader resolves well-known aliases, fetches
//! the raw spec bytes, walks the adapter priority list, and applies the
//! configured operation filters to the resulting service.

use std::time::Duration;

use glob::Pattern;
use tracing::{debug, warn};
use url::Url;

use crate::adapters::{self, ParseInput, SpecAdapter, SpecType};
use crate::error::SpecError;
use crate::model::Service;
use crate::well_known::resolve_alias;

/// Default timeout for a spec fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// What to load and how to shape the result.
#[derive(Debug, Clone)]
pub struct SpecSource {
    pub name: String,

    /// A URL or a well-known service alias.
    pub spec_url: String,

    /// Pin a single adapter instead of detecting.
    pub spec_type: Option<SpecType>,

    pub base_url_override: Option<Url>,

    /// Forwarded on the fetch request (e.g. a private spec behind auth).
    pub auth_header: Option<(String, String)>,

    pub include: Vec<String>,
    pub exclude: Vec<String>,

    pub crud_grouping: bool,
}

pub struct SpecLoader {
    client: reqwest::Client,
    adapters: Vec<Box<dyn SpecAdapter>>,
}

impl Default for SpecLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecLoader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .unwrap_or_default(),
            adapters: adapters::all(),
        }
    }

    /// Fetch and canonicalise one API description.
    pub async fn load(&self, source: &SpecSource) -> Result<Service, SpecError> {
        let url = resolve_spec_url(&source.spec_url)?;
        let raw = self.fetch(&url, source.auth_header.as_ref()).await?;
        let service = self.parse(&raw, source)?;
        apply_operation_filters(service, &source.include, &source.exclude)
    }

    /// Run adapter dispatch over already-fetched bytes.
    pub fn parse(&self, raw: &[u8], source: &SpecSource) -> Result<Service, SpecError> {
        let input = ParseInput {
            raw,
            api_name: &source.name,
            base_url_override: source.base_url_override.as_ref(),
            crud_grouping: source.crud_grouping,
        };

        if let Some(pinned) = source.spec_type {
            let adapter = self
                .adapters
                .iter()
                .find(|adapter| adapter.spec_type() == pinned)
                .ok_or_else(|| SpecError::UnsupportedSpec(source.name.clone()))?;
            return adapter.parse(&input);
        }

        for adapter in &self.adapters {
            if !adapter.detect(raw) {
                continue;
            }
            match adapter.parse(&input) {
                Ok(service) => {
                    debug!(
                        api = %source.name,
                        adapter = %adapter.spec_type(),
                        operations = service.operations.len(),
                        "spec parsed"
                    );
                    return Ok(service);
                }
                Err(e) => {
                    warn!(
                        api = %source.name,
                        adapter = %adapter.spec_type(),
                        "adapter detected format but failed to parse: {e}"
                    );
                }
            }
        }
        Err(SpecError::UnsupportedSpec(source.name.clone()))
    }

    /// Which adapter claims these bytes, if any. Used by detection probes.
    pub fn detect(&self, raw: &[u8]) -> Option<SpecType> {
        self.adapters
            .iter()
            .find(|adapter| adapter.detect(raw))
            .map(|adapter| adapter.spec_type())
    }

    async fn fetch(
        &self,
        url: &Url,
        auth_header: Option<&(String, String)>,
    ) -> Result<Vec<u8>, SpecError> {
        let mut request = self.client.get(url.clone());
        if let Some((name, value)) = auth_header {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await.map_err(|e| SpecError::Fetch {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SpecError::FetchStatus {
                url: url.clone(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(|e| SpecError::Fetch {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

/// Turn a configured spec URL or alias into a concrete URL.
pub fn resolve_spec_url(spec_url: &str) -> Result<Url, SpecError> {
    let resolved = resolve_alias(spec_url).unwrap_or(spec_url);
    Url::parse(resolved).map_err(|_| SpecError::InvalidUrl(spec_url.to_string()))
}

/// Retain operations matching the include globs (when given) and drop those
/// matching the exclude globs. Globs match the operation id and tool name.
pub fn apply_operation_filters(
    mut service: Service,
    include: &[String],
    exclude: &[String],
) -> Result<Service, SpecError> {
    let compile = |patterns: &[String]| -> Result<Vec<Pattern>, SpecError> {
        patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| SpecError::InvalidFilter {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    };
    let include = compile(include)?;
    let exclude = compile(exclude)?;

    service.operations.retain(|op| {
        let matches = |patterns: &[Pattern]| {
            patterns
                .iter()
                .any(|pattern| pattern.matches(&op.id) || pattern.matches(&op.tool_name))
        };
        let included = include.is_empty() || matches(&include);
        included && !matches(&exclude)
    });
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(name: &str, url: String) -> SpecSource {
        SpecSource {
            name: name.to_string(),
            spec_url: url,
            spec_type: None,
            base_url_override: None,
            auth_header: None,
            include: vec![],
            exclude: vec![],
            crud_grouping: false,
        }
    }

    fn openapi_doc() -> serde_json::Value {
        json!({
            "openapi": "3.0.0",
            "servers": [{"url": "https://api.example.com"}],
            "paths": {
                "/pets": {"get": {"operationId": "listPets", "responses": {}}},
                "/pets/{id}": {"delete": {"operationId": "deletePet", "responses": {}}}
            }
        })
    }

    #[tokio::test]
    async fn selects_openapi_adapter_by_detection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/openapi.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openapi_doc()))
            .mount(&server)
            .await;

        let loader = SpecLoader::new();
        let service = loader
            .load(&source("pets", format!("{}/openapi.json", server.uri())))
            .await
            .unwrap();
        assert_eq!(service.operations.len(), 2);
    }

    #[tokio::test]
    async fn selects_graphql_adapter_for_introspection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "__schema": {
                        "queryType": {"name": "Query"},
                        "types": [
                            {
                                "kind": "OBJECT",
                                "name": "Query",
                                "fields": [
                                    {"name": "hello", "args": [], "type": {"kind": "SCALAR", "name": "String"}}
                                ]
                            }
                        ]
                    }
                }
            })))
            .mount(&server)
            .await;

        let loader = SpecLoader::new();
        let mut src = source("gql", format!("{}/graphql", server.uri()));
        src.base_url_override = Some(Url::parse(&format!("{}/graphql", server.uri())).unwrap());
        let service = loader.load(&src).await.unwrap();
        assert_eq!(service.operations[0].id, "hello");
        assert!(service.operations[0].graphql.is_some());
    }

    #[tokio::test]
    async fn forwards_auth_header_on_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spec"))
            .and(header("authorization", "Bearer sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openapi_doc()))
            .mount(&server)
            .await;

        let loader = SpecLoader::new();
        let mut src = source("pets", format!("{}/spec", server.uri()));
        src.auth_header = Some(("Authorization".to_string(), "Bearer sekrit".to_string()));
        assert!(loader.load(&src).await.is_ok());
    }

    #[tokio::test]
    async fn non_success_fetch_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spec"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let loader = SpecLoader::new();
        let result = loader.load(&source("gone", format!("{}/spec", server.uri()))).await;
        assert!(matches!(
            result,
            Err(SpecError::FetchStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn unrecognised_payload_is_unsupported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spec"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
            .mount(&server)
            .await;

        let loader = SpecLoader::new();
        let result = loader.load(&source("mystery", format!("{}/spec", server.uri()))).await;
        assert!(matches!(result, Err(SpecError::UnsupportedSpec(_))));
    }

    #[test]
    fn alias_resolution_and_invalid_urls() {
        assert!(resolve_spec_url("slack").is_ok());
        assert!(matches!(
            resolve_spec_url("not a url"),
            Err(SpecError::InvalidUrl(_))
        ));
    }

    #[test]
    fn filters_retain_includes_and_drop_excludes() {
        let loader = SpecLoader::new();
        let raw = openapi_doc().to_string().into_bytes();
        let service = loader.parse(&raw, &source("pets", "unused".into())).unwrap();

        let filtered = apply_operation_filters(
            service.clone(),
            &["list*".to_string()],
            &[],
        )
        .unwrap();
        assert_eq!(filtered.operations.len(), 1);
        assert_eq!(filtered.operations[0].id, "listPets");

        let filtered =
            apply_operation_filters(service, &[], &["delete*".to_string()]).unwrap();
        assert_eq!(filtered.operations.len(), 1);
        assert_eq!(filtered.operations[0].id, "listPets");
    }

    #[test]
    fn invalid_filter_pattern_is_rejected() {
        let loader = SpecLoader::new();
        let raw = openapi_doc().to_string().into_bytes();
        let service = loader.parse(&raw, &source("pets", "unused".into())).unwrap();
        assert!(matches!(
            apply_operation_filters(service, &["[".to_string()], &[]),
            Err(SpecError::InvalidFilter { .. })
        ));
    }
}
