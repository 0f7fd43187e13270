//! Google API Discovery document adapter.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use url::Url;

use super::{ParseInput, SpecAdapter, SpecType, contains_bytes, parse_json_or_yaml};
use crate::error::SpecError;
use crate::model::{
    Operation, Parameter, ParameterLocation, RequestBody, Service, object_schema,
};
use crate::sanitize::tool_name;

pub struct GoogleDiscoveryAdapter;

impl SpecAdapter for GoogleDiscoveryAdapter {
    fn spec_type(&self) -> SpecType {
        SpecType::GoogleDiscovery
    }

    fn detect(&self, raw: &[u8]) -> bool {
        contains_bytes(raw, "\"discoveryVersion\"")
    }

    fn parse(&self, input: &ParseInput<'_>) -> Result<Service, SpecError> {
        let document = parse_json_or_yaml(input.api_name, input.raw)?;

        let base_url = match input.base_url_override {
            Some(url) => url.clone(),
            None => {
                let base = document
                    .get("baseUrl")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| {
                        let root = document.get("rootUrl").and_then(Value::as_str)?;
                        let path = document
                            .get("servicePath")
                            .and_then(Value::as_str)
                            .unwrap_or("");
                        Some(format!("{root}{path}"))
                    })
                    .ok_or_else(|| SpecError::MissingBaseUrl(input.api_name.to_string()))?;
                Url::parse(&base)
                    .map_err(|_| SpecError::MissingBaseUrl(input.api_name.to_string()))?
            }
        };

        let schemas = document
            .get("schemas")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut operations = Vec::new();
        if let Some(resources) = document.get("resources").and_then(Value::as_object) {
            collect_resources(input.api_name, resources, &schemas, &mut operations);
        }
        if let Some(methods) = document.get("methods").and_then(Value::as_object) {
            collect_methods(input.api_name, methods, &schemas, &mut operations);
        }

        Ok(Service {
            name: input.api_name.to_string(),
            base_url,
            operations,
        })
    }
}

fn collect_resources(
    api_name: &str,
    resources: &Map<String, Value>,
    schemas: &Map<String, Value>,
    operations: &mut Vec<Operation>,
) {
    for resource in resources.values() {
        if let Some(methods) = resource.get("methods").and_then(Value::as_object) {
            collect_methods(api_name, methods, schemas, operations);
        }
        if let Some(nested) = resource.get("resources").and_then(Value::as_object) {
            collect_resources(api_name, nested, schemas, operations);
        }
    }
}

fn collect_methods(
    api_name: &str,
    methods: &Map<String, Value>,
    schemas: &Map<String, Value>,
    operations: &mut Vec<Operation>,
) {
    for method in methods.values() {
        let Some(id) = method.get("id").and_then(Value::as_str) else {
            continue;
        };
        let http_method = method
            .get("httpMethod")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();
        let path = method
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let mut parameters = Vec::new();
        for (name, descriptor) in method
            .get("parameters")
            .and_then(Value::as_object)
            .into_iter()
            .flatten()
        {
            let location = match descriptor.get("location").and_then(Value::as_str) {
                Some("path") => ParameterLocation::Path,
                _ => ParameterLocation::Query,
            };
            let mut schema = Map::new();
            schema.insert(
                "type".to_string(),
                json!(
                    descriptor
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("string")
                ),
            );
            if let Some(description) = descriptor.get("description").and_then(Value::as_str) {
                schema.insert("description".to_string(), json!(description));
            }
            if let Some(enum_values) = descriptor.get("enum") {
                schema.insert("enum".to_string(), enum_values.clone());
            }
            parameters.push(Parameter {
                name: name.clone(),
                location,
                required: descriptor
                    .get("required")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                schema: Value::Object(schema),
            });
        }

        let request_body = method
            .get("request")
            .and_then(|request| request.get("$ref"))
            .and_then(Value::as_str)
            .map(|name| RequestBody {
                required: true,
                content_type: "application/json".to_string(),
                schema: schemas.get(name).cloned().unwrap_or(json!({"type": "object"})),
            });
        if request_body.is_some() {
            parameters.push(Parameter {
                name: "body".to_string(),
                location: ParameterLocation::Body,
                required: true,
                schema: request_body
                    .as_ref()
                    .map(|b| b.schema.clone())
                    .unwrap_or(json!({"type": "object"})),
            });
        }

        let response_schema = method
            .get("response")
            .and_then(|response| response.get("$ref"))
            .and_then(Value::as_str)
            .and_then(|name| schemas.get(name).cloned());

        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &parameters {
            properties.insert(param.name.clone(), param.schema.clone());
            if param.required {
                required.push(param.name.clone());
            }
        }

        let content_type = request_body.as_ref().map(|_| "application/json".to_string());
        operations.push(Operation {
            service_name: api_name.to_string(),
            id: id.to_string(),
            tool_name: tool_name(api_name, id),
            http_method,
            path: if path.starts_with('/') {
                path
            } else {
                format!("/{path}")
            },
            summary: method
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            description: None,
            parameters,
            request_body,
            static_headers: BTreeMap::new(),
            input_schema: object_schema(properties, required),
            response_schema,
            content_type,
            graphql: None,
            json_rpc: None,
        });
    }
}
