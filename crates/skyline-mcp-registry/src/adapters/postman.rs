//! Postman Collection v2.1 adapter.
//!
//! Folders become tool-name prefixes. `{{var}}` URL segments and `:var`
//! path segments both become `{var}` path variables. Auth, Content-Type,
//! and Accept headers never become parameters.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use url::Url;

use super::{ParseInput, SpecAdapter, SpecType, contains_bytes, parse_json_or_yaml};
use crate::error::SpecError;
use crate::model::{
    Operation, Parameter, ParameterLocation, RequestBody, Service, object_schema,
};
use crate::sanitize::tool_name;

const POSTMAN_SCHEMA_MARKER: &str = "schema.getpostman.com";

/// Headers that are handled by the executor's auth layer instead of the tool
/// surface.
const DROPPED_HEADERS: [&str; 3] = ["authorization", "content-type", "accept"];

pub struct PostmanAdapter;

impl SpecAdapter for PostmanAdapter {
    fn spec_type(&self) -> SpecType {
        SpecType::Postman
    }

    fn detect(&self, raw: &[u8]) -> bool {
        contains_bytes(raw, POSTMAN_SCHEMA_MARKER)
    }

    fn parse(&self, input: &ParseInput<'_>) -> Result<Service, SpecError> {
        let document = parse_json_or_yaml(input.api_name, input.raw)?;
        let items = document
            .get("item")
            .and_then(Value::as_array)
            .ok_or_else(|| SpecError::parse(input.api_name, "collection has no items"))?;

        let mut operations = Vec::new();
        let mut first_origin: Option<Url> = None;
        collect_items(input.api_name, items, &[], &mut operations, &mut first_origin);

        let base_url = input
            .base_url_override
            .cloned()
            .or(first_origin)
            .ok_or_else(|| SpecError::MissingBaseUrl(input.api_name.to_string()))?;

        Ok(Service {
            name: input.api_name.to_string(),
            base_url,
            operations,
        })
    }
}

fn collect_items(
    api_name: &str,
    items: &[Value],
    folders: &[String],
    operations: &mut Vec<Operation>,
    first_origin: &mut Option<Url>,
) {
    for item in items {
        let Some(item) = item.as_object() else {
            continue;
        };
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("request");
        if let Some(children) = item.get("item").and_then(Value::as_array) {
            let mut nested = folders.to_vec();
            nested.push(name.to_string());
            collect_items(api_name, children, &nested, operations, first_origin);
        } else if let Some(request) = item.get("request") {
            if let Some(operation) =
                build_operation(api_name, name, request, folders, first_origin)
            {
                operations.push(operation);
            }
        }
    }
}

fn build_operation(
    api_name: &str,
    name: &str,
    request: &Value,
    folders: &[String],
    first_origin: &mut Option<Url>,
) -> Option<Operation> {
    let method = request
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_uppercase();
    let url = request.get("url")?;

    let (path, origin) = parse_url(url);
    if first_origin.is_none() {
        *first_origin = origin;
    }

    let mut parameters = Vec::new();

    // Path variables from both {{var}} templating and url.variable entries.
    for segment in path.split('/') {
        if let Some(var) = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            parameters.push(Parameter {
                name: var.to_string(),
                location: ParameterLocation::Path,
                required: true,
                schema: json!({"type": "string"}),
            });
        }
    }

    for query in url
        .get("query")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let Some(key) = query.get("key").and_then(Value::as_str) else {
            continue;
        };
        let mut schema = Map::new();
        schema.insert("type".into(), json!("string"));
        if let Some(description) = query.get("description").and_then(Value::as_str) {
            schema.insert("description".into(), json!(description));
        }
        parameters.push(Parameter {
            name: key.to_string(),
            location: ParameterLocation::Query,
            required: false,
            schema: Value::Object(schema),
        });
    }

    let mut static_headers = BTreeMap::new();
    for header in request
        .get("header")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let Some(key) = header.get("key").and_then(Value::as_str) else {
            continue;
        };
        if DROPPED_HEADERS.contains(&key.to_ascii_lowercase().as_str()) {
            continue;
        }
        if let Some(value) = header.get("value").and_then(Value::as_str) {
            static_headers.insert(key.to_string(), value.to_string());
        }
    }

    let (request_body, content_type) = parse_body(request.get("body"), &mut parameters);

    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in &parameters {
        properties.insert(param.name.clone(), param.schema.clone());
        if param.required {
            required.push(param.name.clone());
        }
    }

    let mut id_parts = folders.to_vec();
    id_parts.push(name.to_string());
    let id = id_parts.join("_");

    Some(Operation {
        service_name: api_name.to_string(),
        id: id.clone(),
        tool_name: tool_name(api_name, &id),
        http_method: method,
        path,
        summary: Some(name.to_string()),
        description: request
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        parameters,
        request_body,
        static_headers,
        input_schema: object_schema(properties, required),
        response_schema: None,
        content_type,
        graphql: None,
        json_rpc: None,
    })
}

/// Extract the request path (with `{var}` placeholders) and, when the host is
/// concrete, the collection's origin URL.
fn parse_url(url: &Value) -> (String, Option<Url>) {
    let segments: Vec<String> = url
        .get("path")
        .and_then(Value::as_array)
        .map(|path| {
            path.iter()
                .filter_map(Value::as_str)
                .map(normalize_segment)
                .collect()
        })
        .unwrap_or_default();
    let path = format!("/{}", segments.join("/"));

    let host = url
        .get("host")
        .and_then(Value::as_array)
        .map(|host| {
            host.iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(".")
        })
        .filter(|host| !host.contains("{{"));
    let origin = host.and_then(|host| {
        let protocol = url
            .get("protocol")
            .and_then(Value::as_str)
            .unwrap_or("https");
        Url::parse(&format!("{protocol}://{host}")).ok()
    });

    (path, origin)
}

/// `{{var}}` and `:var` both become `{var}`.
fn normalize_segment(segment: &str) -> String {
    if let Some(var) = segment
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
    {
        format!("{{{var}}}")
    } else if let Some(var) = segment.strip_prefix(':') {
        format!("{{{var}}}")
    } else {
        segment.to_string()
    }
}

fn parse_body(
    body: Option<&Value>,
    parameters: &mut Vec<Parameter>,
) -> (Option<RequestBody>, Option<String>) {
    let Some(body) = body else {
        return (None, None);
    };
    let mode = body.get("mode").and_then(Value::as_str).unwrap_or("raw");
    match mode {
        "urlencoded" | "formdata" => {
            let content_type = if mode == "urlencoded" {
                "application/x-www-form-urlencoded"
            } else {
                "multipart/form-data"
            };
            for field in body.get(mode).and_then(Value::as_array).into_iter().flatten() {
                let Some(key) = field.get("key").and_then(Value::as_str) else {
                    continue;
                };
                parameters.push(Parameter {
                    name: key.to_string(),
                    location: ParameterLocation::Body,
                    required: false,
                    schema: json!({"type": "string"}),
                });
            }
            (
                Some(RequestBody {
                    required: false,
                    content_type: content_type.to_string(),
                    schema: json!({"type": "object"}),
                }),
                Some(content_type.to_string()),
            )
        }
        "raw" => {
            let language = body
                .get("options")
                .and_then(|o| o.get("raw"))
                .and_then(|r| r.get("language"))
                .and_then(Value::as_str)
                .unwrap_or("json");
            let content_type = match language {
                "xml" => "application/xml",
                _ => "application/json",
            };
            parameters.push(Parameter {
                name: "body".to_string(),
                location: ParameterLocation::Body,
                required: false,
                schema: if content_type == "application/json" {
                    json!({"type": "object"})
                } else {
                    json!({"type": "string"})
                },
            });
            (
                Some(RequestBody {
                    required: false,
                    content_type: content_type.to_string(),
                    schema: json!({"type": "object"}),
                }),
                Some(content_type.to_string()),
            )
        }
        _ => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> Value {
        json!({
            "info": {
                "name": "Acme",
                "schema": "https://schema.getpostman.com/json/collection/v2.1.0/collection.json"
            },
            "item": [
                {
                    "name": "Users",
                    "item": [
                        {
                            "name": "Get User",
                            "request": {
                                "method": "GET",
                                "header": [
                                    {"key": "Authorization", "value": "Bearer {{token}}"},
                                    {"key": "X-Trace", "value": "on"}
                                ],
                                "url": {
                                    "protocol": "https",
                                    "host": ["api", "acme", "com"],
                                    "path": ["users", "{{userId}}"],
                                    "query": [{"key": "expand", "description": "Related records"}]
                                }
                            }
                        }
                    ]
                },
                {
                    "name": "Create User",
                    "request": {
                        "method": "POST",
                        "url": {
                            "protocol": "https",
                            "host": ["api", "acme", "com"],
                            "path": ["users"]
                        },
                        "body": {
                            "mode": "urlencoded",
                            "urlencoded": [
                                {"key": "email"},
                                {"key": "name"}
                            ]
                        }
                    }
                }
            ]
        })
    }

    fn parse() -> Service {
        let raw = collection().to_string().into_bytes();
        PostmanAdapter
            .parse(&ParseInput {
                raw: &raw,
                api_name: "acme",
                base_url_override: None,
                crud_grouping: false,
            })
            .unwrap()
    }

    #[test]
    fn detects_by_schema_url() {
        assert!(PostmanAdapter.detect(collection().to_string().as_bytes()));
        assert!(!PostmanAdapter.detect(br#"{"openapi": "3.0.0"}"#));
    }

    #[test]
    fn folders_prefix_tool_names() {
        let service = parse();
        assert_eq!(service.operations[0].tool_name, "acme_Users_Get_User");
        assert_eq!(service.operations[1].tool_name, "acme_Create_User");
    }

    #[test]
    fn template_vars_become_path_parameters() {
        let service = parse();
        let get_user = &service.operations[0];
        assert_eq!(get_user.path, "/users/{userId}");
        let path_param = get_user
            .parameters
            .iter()
            .find(|p| p.location == ParameterLocation::Path)
            .unwrap();
        assert_eq!(path_param.name, "userId");
        assert!(path_param.required);
    }

    #[test]
    fn auth_headers_dropped_other_headers_static() {
        let service = parse();
        let get_user = &service.operations[0];
        assert!(
            get_user
                .parameters
                .iter()
                .all(|p| p.location != ParameterLocation::Header)
        );
        assert_eq!(get_user.static_headers.get("X-Trace").unwrap(), "on");
        assert!(!get_user.static_headers.contains_key("Authorization"));
    }

    #[test]
    fn urlencoded_body_fields_become_parameters() {
        let service = parse();
        let create = &service.operations[1];
        assert_eq!(
            create.content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        let body_fields: Vec<_> = create
            .parameters
            .iter()
            .filter(|p| p.location == ParameterLocation::Body)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(body_fields, vec!["email", "name"]);
    }

    #[test]
    fn base_url_derived_from_first_request() {
        let service = parse();
        assert_eq!(service.base_url.as_str(), "https://api.acme.com/");
    }
}
