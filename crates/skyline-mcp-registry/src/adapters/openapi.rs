//! OpenAPI 3.x and Swagger 2.0 adapter.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value, json};
use tracing::warn;
use url::Url;

use super::{ParseInput, SpecAdapter, SpecType, contains_bytes, parse_json_or_yaml};
use crate::error::SpecError;
use crate::model::{
    Operation, Parameter, ParameterLocation, RequestBody, Service, object_schema,
};
use crate::sanitize::tool_name;

const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Body content types in preference order.
const BODY_CONTENT_TYPES: [&str; 4] = [
    "application/json",
    "application/x-www-form-urlencoded",
    "multipart/form-data",
    "application/xml",
];

pub struct OpenApiAdapter;

impl SpecAdapter for OpenApiAdapter {
    fn spec_type(&self) -> SpecType {
        SpecType::Openapi
    }

    fn detect(&self, raw: &[u8]) -> bool {
        ["\"openapi\"", "openapi:", "\"swagger\"", "swagger:"]
            .iter()
            .any(|needle| contains_bytes(raw, needle))
    }

    fn parse(&self, input: &ParseInput<'_>) -> Result<Service, SpecError> {
        let document = parse_json_or_yaml(input.api_name, input.raw)?;
        let document = document
            .as_object()
            .ok_or_else(|| SpecError::parse(input.api_name, "spec root is not an object"))?;

        let swagger2 = document.contains_key("swagger");
        let base_url = match input.base_url_override {
            Some(url) => url.clone(),
            None => base_url_from_document(input.api_name, document, swagger2)?,
        };

        let resolver = RefResolver::new(document);
        let mut operations = Vec::new();
        let empty = Map::new();
        let paths = document
            .get("paths")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        for (path, path_item) in paths {
            let Some(path_item) = path_item.as_object() else {
                continue;
            };
            let shared_params = path_item
                .get("parameters")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for method in HTTP_METHODS {
                let Some(op) = path_item.get(method).and_then(Value::as_object) else {
                    continue;
                };
                match build_operation(
                    input.api_name,
                    &resolver,
                    path,
                    method,
                    op,
                    &shared_params,
                    swagger2,
                ) {
                    Ok(operation) => operations.push(operation),
                    Err(e) => {
                        warn!(path, method, "skipping unparsable operation: {e}");
                    }
                }
            }
        }

        Ok(Service {
            name: input.api_name.to_string(),
            base_url,
            operations,
        })
    }
}

fn base_url_from_document(
    api_name: &str,
    document: &Map<String, Value>,
    swagger2: bool,
) -> Result<Url, SpecError> {
    if swagger2 {
        let host = document
            .get("host")
            .and_then(Value::as_str)
            .ok_or_else(|| SpecError::MissingBaseUrl(api_name.to_string()))?;
        let scheme = document
            .get("schemes")
            .and_then(Value::as_array)
            .and_then(|schemes| schemes.first())
            .and_then(Value::as_str)
            .unwrap_or("https");
        let base_path = document
            .get("basePath")
            .and_then(Value::as_str)
            .unwrap_or("");
        Url::parse(&format!("{scheme}://{host}{base_path}"))
            .map_err(|_| SpecError::MissingBaseUrl(api_name.to_string()))
    } else {
        document
            .get("servers")
            .and_then(Value::as_array)
            .and_then(|servers| servers.first())
            .and_then(|server| server.get("url"))
            .and_then(Value::as_str)
            .and_then(|url| Url::parse(url).ok())
            .ok_or_else(|| SpecError::MissingBaseUrl(api_name.to_string()))
    }
}

#[allow(clippy::too_many_arguments)]
fn build_operation(
    api_name: &str,
    resolver: &RefResolver<'_>,
    path: &str,
    method: &str,
    op: &Map<String, Value>,
    shared_params: &[Value],
    swagger2: bool,
) -> Result<Operation, SpecError> {
    let id = op
        .get("operationId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{method}_{path}"));

    let mut parameters = Vec::new();
    let mut request_body = None;
    let mut content_type = None;

    let own_params = op
        .get("parameters")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for raw_param in shared_params.iter().chain(own_params.iter()) {
        let resolved = resolver.resolve(raw_param.clone());
        let Some(param) = resolved.as_object() else {
            continue;
        };
        let Some(name) = param.get("name").and_then(Value::as_str) else {
            continue;
        };
        let location = param.get("in").and_then(Value::as_str).unwrap_or("query");
        let required = param
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(location == "path");
        match location {
            "path" | "query" | "header" => {
                let schema = if swagger2 {
                    swagger2_param_schema(param)
                } else {
                    resolver.resolve(param.get("schema").cloned().unwrap_or(json!({})))
                };
                parameters.push(Parameter {
                    name: name.to_string(),
                    location: match location {
                        "path" => ParameterLocation::Path,
                        "header" => ParameterLocation::Header,
                        _ => ParameterLocation::Query,
                    },
                    required,
                    schema,
                });
            }
            // Swagger 2 carries the body as a parameter.
            "body" if swagger2 => {
                let schema = resolver.resolve(param.get("schema").cloned().unwrap_or(json!({})));
                content_type = Some("application/json".to_string());
                absorb_body(&mut parameters, &mut request_body, schema, required, "application/json");
            }
            "formData" if swagger2 => {
                content_type = Some("application/x-www-form-urlencoded".to_string());
                parameters.push(Parameter {
                    name: name.to_string(),
                    location: ParameterLocation::Body,
                    required,
                    schema: swagger2_param_schema(param),
                });
            }
            _ => {}
        }
    }

    if !swagger2 {
        if let Some(body) = op.get("requestBody") {
            let body = resolver.resolve(body.clone());
            if let Some(body) = body.as_object() {
                let required = body
                    .get("required")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if let Some(content) = body.get("content").and_then(Value::as_object) {
                    if let Some(chosen) = BODY_CONTENT_TYPES
                        .iter()
                        .find(|ct| content.contains_key(**ct))
                        .copied()
                        .or_else(|| content.keys().next().map(String::as_str))
                    {
                        let schema = content
                            .get(chosen)
                            .and_then(|media| media.get("schema"))
                            .cloned()
                            .unwrap_or(json!({}));
                        let schema = resolver.resolve(schema);
                        content_type = Some(chosen.to_string());
                        absorb_body(&mut parameters, &mut request_body, schema, required, chosen);
                    }
                }
            }
        }
    }

    let response_schema = response_schema(resolver, op, swagger2);

    let mut properties = Map::new();
    let mut required_props = Vec::new();
    for param in &parameters {
        properties.insert(param.name.clone(), param.schema.clone());
        if param.required {
            required_props.push(param.name.clone());
        }
    }

    Ok(Operation {
        service_name: api_name.to_string(),
        id: id.clone(),
        tool_name: tool_name(api_name, &id),
        http_method: method.to_uppercase(),
        path: path.to_string(),
        summary: op
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_string),
        description: op
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        parameters,
        request_body,
        static_headers: BTreeMap::new(),
        input_schema: object_schema(properties, required_props),
        response_schema,
        content_type,
        graphql: None,
        json_rpc: None,
    })
}

/// Fold a body schema into the parameter list.
///
/// Object bodies are flattened so each top-level property becomes its own
/// tool argument; anything else becomes a single `body` argument.
fn absorb_body(
    parameters: &mut Vec<Parameter>,
    request_body: &mut Option<RequestBody>,
    schema: Value,
    required: bool,
    content_type: &str,
) {
    *request_body = Some(RequestBody {
        required,
        content_type: content_type.to_string(),
        schema: schema.clone(),
    });
    let flattenable = schema
        .get("type")
        .and_then(Value::as_str)
        .map(|t| t == "object")
        .unwrap_or(false)
        && schema.get("properties").is_some();
    if flattenable {
        let body_required: HashSet<String> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if let Some(props) = schema.get("properties").and_then(Value::as_object) {
            for (name, prop_schema) in props {
                parameters.push(Parameter {
                    name: name.clone(),
                    location: ParameterLocation::Body,
                    required: required && body_required.contains(name),
                    schema: prop_schema.clone(),
                });
            }
        }
    } else {
        parameters.push(Parameter {
            name: "body".to_string(),
            location: ParameterLocation::Body,
            required,
            schema,
        });
    }
}

fn response_schema(
    resolver: &RefResolver<'_>,
    op: &Map<String, Value>,
    swagger2: bool,
) -> Option<Value> {
    let responses = op.get("responses").and_then(Value::as_object)?;
    let success = ["200", "201", "202", "default"]
        .iter()
        .find_map(|code| responses.get(*code))?;
    let success = resolver.resolve(success.clone());
    let schema = if swagger2 {
        success.get("schema").cloned()?
    } else {
        success
            .get("content")
            .and_then(Value::as_object)?
            .values()
            .next()?
            .get("schema")
            .cloned()?
    };
    Some(resolver.resolve(schema))
}

/// Swagger 2 parameters carry schema keywords inline.
fn swagger2_param_schema(param: &Map<String, Value>) -> Value {
    let mut schema = Map::new();
    for key in ["type", "format", "enum", "items", "default", "description"] {
        if let Some(value) = param.get(key) {
            schema.insert(key.to_string(), value.clone());
        }
    }
    Value::Object(schema)
}

/// Resolves local `$ref` pointers by inlining the target, with a visited
/// stack so self-referential schemas terminate.
struct RefResolver<'a> {
    document: &'a Map<String, Value>,
}

impl<'a> RefResolver<'a> {
    fn new(document: &'a Map<String, Value>) -> Self {
        Self { document }
    }

    fn resolve(&self, value: Value) -> Value {
        let mut visiting = Vec::new();
        self.resolve_inner(value, &mut visiting)
    }

    fn resolve_inner(&self, value: Value, visiting: &mut Vec<String>) -> Value {
        match value {
            Value::Object(map) => {
                if let Some(target) = map.get("$ref").and_then(Value::as_str) {
                    if visiting.iter().any(|seen| seen == target) {
                        // Cycle: truncate rather than recurse forever.
                        return json!({"type": "object"});
                    }
                    match self.lookup(target) {
                        Some(resolved) => {
                            visiting.push(target.to_string());
                            let result = self.resolve_inner(resolved, visiting);
                            visiting.pop();
                            return result;
                        }
                        None => return json!({"type": "object"}),
                    }
                }
                Value::Object(
                    map.into_iter()
                        .map(|(key, nested)| (key, self.resolve_inner(nested, visiting)))
                        .collect(),
                )
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.resolve_inner(item, visiting))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Look up `#/a/b/c` within the document. External refs are unsupported.
    fn lookup(&self, pointer: &str) -> Option<Value> {
        let path = pointer.strip_prefix("#/")?;
        let mut current = Value::Object(self.document.clone());
        for segment in path.split('/') {
            let segment = segment.replace("~1", "/").replace("~0", "~");
            current = current.get(&segment)?.clone();
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(api: &str, doc: Value) -> Service {
        let raw = doc.to_string().into_bytes();
        OpenApiAdapter
            .parse(&ParseInput {
                raw: &raw,
                api_name: api,
                base_url_override: None,
                crud_grouping: false,
            })
            .unwrap()
    }

    fn petstore_v3() -> Value {
        json!({
            "openapi": "3.0.0",
            "servers": [{"url": "https://pets.example.com/v1"}],
            "components": {
                "schemas": {
                    "Pet": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "integer"},
                            "name": {"type": "string"},
                            "tag": {"$ref": "#/components/schemas/Tag"}
                        },
                        "required": ["name"]
                    },
                    "Tag": {"type": "string", "enum": ["cat", "dog"]}
                }
            },
            "paths": {
                "/pets": {
                    "get": {
                        "operationId": "listPets",
                        "summary": "List all pets",
                        "parameters": [
                            {"name": "limit", "in": "query", "schema": {"type": "integer"}}
                        ],
                        "responses": {
                            "200": {
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": {"$ref": "#/components/schemas/Pet"}
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "post": {
                        "operationId": "createPet",
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": {"$ref": "#/components/schemas/Pet"}
                                }
                            }
                        },
                        "responses": {}
                    }
                },
                "/pets/{petId}": {
                    "parameters": [
                        {"name": "petId", "in": "path", "required": true, "schema": {"type": "string"}}
                    ],
                    "get": {"operationId": "getPet", "responses": {}}
                }
            }
        })
    }

    #[test]
    fn detects_openapi_json_and_yaml() {
        assert!(OpenApiAdapter.detect(br#"{"openapi": "3.0.0"}"#));
        assert!(OpenApiAdapter.detect(b"swagger: '2.0'\npaths: {}\n"));
        assert!(!OpenApiAdapter.detect(b"type Query { hi: String }"));
    }

    #[test]
    fn builds_operations_with_resolved_refs() {
        let service = parse("petstore", petstore_v3());
        assert_eq!(service.base_url.as_str(), "https://pets.example.com/v1");
        assert_eq!(service.operations.len(), 3);

        let list = service
            .operations
            .iter()
            .find(|op| op.id == "listPets")
            .unwrap();
        assert_eq!(list.tool_name, "petstore_listPets");
        assert_eq!(list.http_method, "GET");
        let response = list.response_schema.as_ref().unwrap();
        // The $ref chain Pet -> Tag is fully inlined.
        assert_eq!(
            response["items"]["properties"]["tag"]["enum"],
            json!(["cat", "dog"])
        );
    }

    #[test]
    fn object_bodies_flatten_into_arguments() {
        let service = parse("petstore", petstore_v3());
        let create = service
            .operations
            .iter()
            .find(|op| op.id == "createPet")
            .unwrap();
        let body_params: Vec<_> = create
            .parameters
            .iter()
            .filter(|p| p.location == ParameterLocation::Body)
            .map(|p| (p.name.as_str(), p.required))
            .collect();
        assert_eq!(
            body_params,
            vec![("id", false), ("name", true), ("tag", false)]
        );
        assert_eq!(create.content_type.as_deref(), Some("application/json"));
        let required = create.input_schema["required"].as_array().unwrap();
        assert_eq!(required, &vec![json!("name")]);
    }

    #[test]
    fn path_level_parameters_are_inherited() {
        let service = parse("petstore", petstore_v3());
        let get = service
            .operations
            .iter()
            .find(|op| op.id == "getPet")
            .unwrap();
        let param = &get.parameters[0];
        assert_eq!(param.name, "petId");
        assert_eq!(param.location, ParameterLocation::Path);
        assert!(param.required);
    }

    #[test]
    fn swagger2_host_and_body_parameter() {
        let doc = json!({
            "swagger": "2.0",
            "host": "api.example.com",
            "basePath": "/v2",
            "schemes": ["https"],
            "paths": {
                "/things": {
                    "post": {
                        "operationId": "makeThing",
                        "parameters": [
                            {
                                "name": "payload",
                                "in": "body",
                                "required": true,
                                "schema": {
                                    "type": "object",
                                    "properties": {"label": {"type": "string"}},
                                    "required": ["label"]
                                }
                            }
                        ],
                        "responses": {}
                    }
                }
            }
        });
        let service = parse("things", doc);
        assert_eq!(service.base_url.as_str(), "https://api.example.com/v2");
        let op = &service.operations[0];
        assert_eq!(op.parameters[0].name, "label");
        assert!(op.parameters[0].required);
    }

    #[test]
    fn cyclic_refs_terminate() {
        let doc = json!({
            "openapi": "3.0.0",
            "servers": [{"url": "https://example.com"}],
            "components": {
                "schemas": {
                    "Node": {
                        "type": "object",
                        "properties": {"next": {"$ref": "#/components/schemas/Node"}}
                    }
                }
            },
            "paths": {
                "/nodes": {
                    "get": {
                        "operationId": "getNodes",
                        "responses": {
                            "200": {
                                "content": {
                                    "application/json": {
                                        "schema": {"$ref": "#/components/schemas/Node"}
                                    }
                                }
                            }
                        }
                    }
                }
            }
        });
        let service = parse("nodes", doc);
        let schema = service.operations[0].response_schema.as_ref().unwrap();
        assert_eq!(schema["properties"]["next"], json!({"type": "object"}));
    }

    #[test]
    fn operation_without_id_gets_method_path_id() {
        let doc = json!({
            "openapi": "3.0.0",
            "servers": [{"url": "https://example.com"}],
            "paths": {"/status": {"get": {"responses": {}}}}
        });
        let service = parse("svc", doc);
        assert_eq!(service.operations[0].id, "get_/status");
        assert_eq!(service.operations[0].tool_name, "svc_get_status");
    }
}
