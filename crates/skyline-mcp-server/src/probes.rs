//! Detection and verification probes.
//!
//! Helpers behind `/detect`, `/test`, `/operations`, and `/verify`: probe a
//! base URL for well-known spec locations, check reachability of a spec
//! URL, parse a spec into operation summaries, and echo service-specific
//! credentials.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use skyline_mcp_registry::{SpecLoader, SpecSource, SpecType};
use url::Url;

use crate::errors::GatewayError;

/// Probe timeout per candidate.
const PROBE_TIMEOUT: Duration = Duration::from_secs(8);

/// Candidate locations checked by a detection probe, in order.
const CANDIDATES: [(&str, &str, &str); 8] = [
    ("openapi", "/openapi.json", "GET"),
    ("openapi", "/openapi.yaml", "GET"),
    ("openapi", "/swagger.json", "GET"),
    ("openapi", "/v2/api-docs", "GET"),
    ("openapi", "/api/openapi.json", "GET"),
    ("graphql", "/graphql", "POST"),
    ("odata", "/$metadata", "GET"),
    ("jenkins", "/api/json", "GET"),
];

/// Minimal introspection query used for the GraphQL probe.
const PROBE_INTROSPECTION: &str = r#"{"query": "{ __schema { queryType { name } } }"}"#;

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub base_url: Url,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DetectCandidate {
    #[serde(rename = "type")]
    pub spec_type: String,
    pub spec_url: String,
    pub method: String,
    pub status: Option<u16>,
    pub found: bool,
    pub error: Option<String>,
}

/// Probe the base URL for spec documents at well-known locations.
pub async fn detect(request: &DetectRequest) -> Vec<DetectCandidate> {
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .unwrap_or_default();
    let loader = SpecLoader::new();

    let mut results = Vec::with_capacity(CANDIDATES.len());
    for (expected_type, path, method) in CANDIDATES {
        let url = join(&request.base_url, path);
        let mut builder = match method {
            "POST" => client
                .post(url.clone())
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(PROBE_INTROSPECTION),
            _ => client.get(url.clone()),
        };
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let candidate = match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.bytes().await.unwrap_or_default();
                let detected = loader.detect(&body);
                DetectCandidate {
                    spec_type: detected
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| expected_type.to_string()),
                    spec_url: url.to_string(),
                    method: method.to_string(),
                    status: Some(status),
                    found: status < 400 && detected.is_some(),
                    error: None,
                }
            }
            Err(e) => DetectCandidate {
                spec_type: expected_type.to_string(),
                spec_url: url.to_string(),
                method: method.to_string(),
                status: None,
                found: false,
                error: Some(e.to_string()),
            },
        };
        results.push(candidate);
    }
    results
}

#[derive(Debug, Deserialize)]
pub struct TestRequest {
    pub spec_url: String,
}

#[derive(Debug, Serialize)]
pub struct TestReport {
    pub reachable: bool,
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub detected_type: Option<String>,
    pub error: Option<String>,
}

/// Fetch a spec URL and report reachability plus the detected format.
pub async fn test_spec(request: &TestRequest) -> TestReport {
    let url = match skyline_mcp_registry::resolve_spec_url(&request.spec_url) {
        Ok(url) => url,
        Err(e) => {
            return TestReport {
                reachable: false,
                status: None,
                content_type: None,
                detected_type: None,
                error: Some(e.to_string()),
            };
        }
    };
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .unwrap_or_default();
    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await.unwrap_or_default();
            TestReport {
                reachable: status < 400,
                status: Some(status),
                content_type,
                detected_type: SpecLoader::new().detect(&body).map(|t| t.to_string()),
                error: None,
            }
        }
        Err(e) => TestReport {
            reachable: false,
            status: None,
            content_type: None,
            detected_type: None,
            error: Some(e.to_string()),
        },
    }
}

#[derive(Debug, Deserialize)]
pub struct OperationsRequest {
    pub spec_url: String,
    pub spec_type: Option<SpecType>,
    pub base_url: Option<Url>,
}

#[derive(Debug, Serialize)]
pub struct OperationSummary {
    pub id: String,
    pub tool_name: String,
    pub method: String,
    pub path: String,
    pub summary: Option<String>,
}

/// Fetch and parse a spec, returning one summary per operation.
pub async fn operations(
    request: &OperationsRequest,
) -> Result<Vec<OperationSummary>, GatewayError> {
    let loader = SpecLoader::new();
    let service = loader
        .load(&SpecSource {
            name: "probe".to_string(),
            spec_url: request.spec_url.clone(),
            spec_type: request.spec_type,
            base_url_override: request.base_url.clone(),
            auth_header: None,
            include: vec![],
            exclude: vec![],
            crud_grouping: false,
        })
        .await?;
    Ok(service
        .operations
        .iter()
        .map(|op| OperationSummary {
            id: op.id.clone(),
            tool_name: op.tool_name.clone(),
            method: op.http_method.clone(),
            path: op.path.clone(),
            summary: op.summary.clone(),
        })
        .collect())
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub service: String,
    pub token: String,
    pub base_url: Option<Url>,
}

#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub ok: bool,
    pub status: Option<u16>,
    pub identity: Option<Value>,
    pub error: Option<String>,
}

/// Echo credentials against a known service's identity endpoint.
pub async fn verify(request: &VerifyRequest) -> VerifyReport {
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .unwrap_or_default();

    let outcome = match request.service.to_ascii_lowercase().as_str() {
        "slack" => {
            client
                .post("https://slack.com/api/auth.test")
                .bearer_auth(&request.token)
                .send()
                .await
        }
        "gitlab" => {
            let base = match request.base_url.clone() {
                Some(base) => base,
                None => match Url::parse("https://gitlab.com") {
                    Ok(url) => url,
                    Err(e) => {
                        return VerifyReport {
                            ok: false,
                            status: None,
                            identity: None,
                            error: Some(e.to_string()),
                        };
                    }
                },
            };
            client
                .get(join(&base, "/api/v4/user"))
                .bearer_auth(&request.token)
                .send()
                .await
        }
        "jira" => {
            let Some(base) = request.base_url.clone() else {
                return VerifyReport {
                    ok: false,
                    status: None,
                    identity: None,
                    error: Some("jira verification requires base_url".to_string()),
                };
            };
            client
                .get(join(&base, "/rest/api/2/myself"))
                .bearer_auth(&request.token)
                .send()
                .await
        }
        other => {
            return VerifyReport {
                ok: false,
                status: None,
                identity: None,
                error: Some(format!("unsupported verification service '{other}'")),
            };
        }
    };

    match outcome {
        Ok(response) => {
            let status = response.status().as_u16();
            let identity: Option<Value> = response.json().await.ok();
            // Slack reports failure inside a 200 body.
            let ok = status < 400
                && identity
                    .as_ref()
                    .and_then(|v| v.get("ok"))
                    .and_then(Value::as_bool)
                    .unwrap_or(status < 400);
            VerifyReport {
                ok,
                status: Some(status),
                identity,
                error: None,
            }
        }
        Err(e) => VerifyReport {
            ok: false,
            status: None,
            identity: None,
            error: Some(e.to_string()),
        },
    }
}

fn join(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let base_path = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base_path}{path}"));
    url
}
