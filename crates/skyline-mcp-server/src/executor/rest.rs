//! REST request construction.

use serde_json::{Map, Value};
use skyline_mcp_registry::model::{Operation, ParameterLocation};
use url::Url;

use crate::errors::GatewayError;

/// A request ready to send, plus its approximate wire size.
pub struct BuiltRequest {
    pub request: reqwest::RequestBuilder,
    pub request_size: usize,
}

/// Fold arguments into path, query, headers, and body per the operation's
/// parameter locations.
pub fn build_request(
    client: &reqwest::Client,
    base_url: &Url,
    operation: &Operation,
    arguments: &Map<String, Value>,
) -> Result<BuiltRequest, GatewayError> {
    let url = join_path(base_url, &substitute_path(operation, arguments)?)?;
    let method = reqwest::Method::from_bytes(operation.http_method.as_bytes())
        .map_err(|_| GatewayError::Internal(format!("bad method {}", operation.http_method)))?;
    let mut request = client.request(method, url);

    for (name, value) in &operation.static_headers {
        request = request.header(name, value);
    }

    let mut query: Vec<(String, String)> = Vec::new();
    let mut body_fields = Map::new();
    let mut raw_body: Option<Value> = None;

    for param in &operation.parameters {
        let Some(value) = arguments.get(&param.name) else {
            continue;
        };
        match param.location {
            ParameterLocation::Path => {}
            ParameterLocation::Query => match value {
                Value::Array(items) => {
                    for item in items {
                        query.push((param.name.clone(), scalar_to_string(item)));
                    }
                }
                other => query.push((param.name.clone(), scalar_to_string(other))),
            },
            ParameterLocation::Header => {
                request = request.header(&param.name, scalar_to_string(value));
            }
            ParameterLocation::Body => {
                if param.name == "body" && operation.parameters.iter().filter(|p| p.location == ParameterLocation::Body).count() == 1 {
                    raw_body = Some(value.clone());
                } else {
                    body_fields.insert(param.name.clone(), value.clone());
                }
            }
            // GraphQL and JSON-RPC operations do not come through here.
            ParameterLocation::Argument | ParameterLocation::Selection => {}
        }
    }

    if !query.is_empty() {
        request = request.query(&query);
    }

    let mut request_size = 0;
    let content_type = operation.content_type.as_deref().unwrap_or("application/json");
    let body = raw_body.or_else(|| {
        (!body_fields.is_empty()).then(|| Value::Object(body_fields))
    });
    if let Some(body) = body {
        match content_type {
            "application/x-www-form-urlencoded" => {
                let pairs: Vec<(String, String)> = body
                    .as_object()
                    .map(|fields| {
                        fields
                            .iter()
                            .map(|(k, v)| (k.clone(), scalar_to_string(v)))
                            .collect()
                    })
                    .unwrap_or_default();
                request_size = pairs.iter().map(|(k, v)| k.len() + v.len() + 2).sum();
                request = request.form(&pairs);
            }
            "text/xml" | "application/xml" => {
                let text = match body {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                request_size = text.len();
                request = request
                    .header(http::header::CONTENT_TYPE, content_type)
                    .body(text);
            }
            _ => {
                request_size = body.to_string().len();
                request = request.json(&body);
            }
        }
    }

    Ok(BuiltRequest {
        request,
        request_size,
    })
}

/// Replace `{param}` placeholders with URL-encoded argument values.
fn substitute_path(
    operation: &Operation,
    arguments: &Map<String, Value>,
) -> Result<String, GatewayError> {
    let mut path = operation.path.clone();
    for param in &operation.parameters {
        if param.location != ParameterLocation::Path {
            continue;
        }
        let placeholder = format!("{{{}}}", param.name);
        if !path.contains(&placeholder) {
            continue;
        }
        let value = arguments.get(&param.name).ok_or_else(|| {
            GatewayError::BadArguments(format!("missing path parameter '{}'", param.name))
        })?;
        let encoded = urlencode(&scalar_to_string(value));
        path = path.replace(&placeholder, &encoded);
    }
    Ok(path)
}

fn join_path(base_url: &Url, path: &str) -> Result<Url, GatewayError> {
    if path.is_empty() {
        return Ok(base_url.clone());
    }
    let mut joined = base_url.clone();
    let base_path = joined.path().trim_end_matches('/').to_string();
    joined.set_path(&format!("{base_path}{path}"));
    Ok(joined)
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skyline_mcp_registry::model::{Parameter, object_schema};
    use std::collections::BTreeMap;

    fn operation(method: &str, path: &str, parameters: Vec<Parameter>) -> Operation {
        Operation {
            service_name: "svc".into(),
            id: "op".into(),
            tool_name: "svc_op".into(),
            http_method: method.into(),
            path: path.into(),
            summary: None,
            description: None,
            parameters,
            request_body: None,
            static_headers: BTreeMap::from([("X-Static".to_string(), "yes".to_string())]),
            input_schema: object_schema(serde_json::Map::new(), vec![]),
            response_schema: None,
            content_type: Some("application/json".into()),
            graphql: None,
            json_rpc: None,
        }
    }

    fn param(name: &str, location: ParameterLocation, required: bool) -> Parameter {
        Parameter {
            name: name.into(),
            location,
            required,
            schema: json!({"type": "string"}),
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn substitutes_and_encodes_path_params() {
        let op = operation(
            "GET",
            "/users/{id}/repos",
            vec![param("id", ParameterLocation::Path, true)],
        );
        let base = Url::parse("https://api.example.com/v1").unwrap();
        let built = build_request(
            &reqwest::Client::new(),
            &base,
            &op,
            &args(json!({"id": "octo cat"})),
        )
        .unwrap();
        let request = built.request.build().unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/v1/users/octo%20cat/repos"
        );
        assert_eq!(request.headers().get("X-Static").unwrap(), "yes");
    }

    #[test]
    fn missing_path_param_is_bad_arguments() {
        let op = operation(
            "GET",
            "/users/{id}",
            vec![param("id", ParameterLocation::Path, true)],
        );
        let base = Url::parse("https://api.example.com").unwrap();
        let result = build_request(&reqwest::Client::new(), &base, &op, &args(json!({})));
        assert!(matches!(result, Err(GatewayError::BadArguments(_))));
    }

    #[test]
    fn arrays_become_repeated_query_params() {
        let op = operation(
            "GET",
            "/search",
            vec![param("tag", ParameterLocation::Query, false)],
        );
        let base = Url::parse("https://api.example.com").unwrap();
        let built = build_request(
            &reqwest::Client::new(),
            &base,
            &op,
            &args(json!({"tag": ["a", "b"]})),
        )
        .unwrap();
        let request = built.request.build().unwrap();
        assert_eq!(request.url().query(), Some("tag=a&tag=b"));
    }

    #[test]
    fn body_fields_assemble_into_json_object() {
        let op = operation(
            "POST",
            "/things",
            vec![
                param("name", ParameterLocation::Body, true),
                param("color", ParameterLocation::Body, false),
            ],
        );
        let base = Url::parse("https://api.example.com").unwrap();
        let built = build_request(
            &reqwest::Client::new(),
            &base,
            &op,
            &args(json!({"name": "widget", "color": "red"})),
        )
        .unwrap();
        assert!(built.request_size > 0);
        let request = built.request.build().unwrap();
        let body = request.body().unwrap().as_bytes().unwrap();
        let parsed: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(parsed, json!({"name": "widget", "color": "red"}));
    }

    #[test]
    fn single_body_argument_is_sent_verbatim() {
        let op = operation(
            "POST",
            "/raw",
            vec![param("body", ParameterLocation::Body, true)],
        );
        let base = Url::parse("https://api.example.com").unwrap();
        let built = build_request(
            &reqwest::Client::new(),
            &base,
            &op,
            &args(json!({"body": {"a": [1, 2]}})),
        )
        .unwrap();
        let request = built.request.build().unwrap();
        let body = request.body().unwrap().as_bytes().unwrap();
        let parsed: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(parsed, json!({"a": [1, 2]}));
    }

    #[test]
    fn form_content_type_uses_urlencoding() {
        let mut op = operation(
            "POST",
            "/form",
            vec![param("email", ParameterLocation::Body, true)],
        );
        op.content_type = Some("application/x-www-form-urlencoded".into());
        let base = Url::parse("https://api.example.com").unwrap();
        let built = build_request(
            &reqwest::Client::new(),
            &base,
            &op,
            &args(json!({"email": "a@b.c"})),
        )
        .unwrap();
        let request = built.request.build().unwrap();
        let body = request.body().unwrap().as_bytes().unwrap();
        assert_eq!(std::str::from_utf8(body).unwrap(), "email=a%40b.c");
    }
}
