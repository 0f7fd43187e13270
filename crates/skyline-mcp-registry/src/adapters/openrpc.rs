//! OpenRPC adapter. Each method becomes a POST tool carrying JSON-RPC
//! transport metadata.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use url::Url;

use super::{ParseInput, SpecAdapter, SpecType, contains_bytes, parse_json_or_yaml};
use crate::error::SpecError;
use crate::model::{
    JsonRpcOperation, Operation, Parameter, ParameterLocation, Service, object_schema,
};
use crate::sanitize::{sanitize_tool_name, tool_name};

pub struct OpenRpcAdapter;

impl SpecAdapter for OpenRpcAdapter {
    fn spec_type(&self) -> SpecType {
        SpecType::Openrpc
    }

    fn detect(&self, raw: &[u8]) -> bool {
        contains_bytes(raw, "\"openrpc\"") || contains_bytes(raw, "openrpc:")
    }

    fn parse(&self, input: &ParseInput<'_>) -> Result<Service, SpecError> {
        let document = parse_json_or_yaml(input.api_name, input.raw)?;

        let base_url = match input.base_url_override {
            Some(url) => url.clone(),
            None => document
                .get("servers")
                .and_then(Value::as_array)
                .and_then(|servers| servers.first())
                .and_then(|server| server.get("url"))
                .and_then(Value::as_str)
                .and_then(|url| Url::parse(url).ok())
                .ok_or_else(|| SpecError::MissingBaseUrl(input.api_name.to_string()))?,
        };

        let methods = document
            .get("methods")
            .and_then(Value::as_array)
            .ok_or_else(|| SpecError::parse(input.api_name, "document has no methods"))?;

        let mut operations = Vec::new();
        for method in methods {
            let Some(name) = method.get("name").and_then(Value::as_str) else {
                continue;
            };
            let mut parameters = Vec::new();
            let mut properties = Map::new();
            let mut required = Vec::new();
            for param in method
                .get("params")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let Some(param_name) = param.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let param_required = param
                    .get("required")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let schema = param.get("schema").cloned().unwrap_or(json!({}));
                parameters.push(Parameter {
                    name: param_name.to_string(),
                    location: ParameterLocation::Argument,
                    required: param_required,
                    schema: schema.clone(),
                });
                properties.insert(param_name.to_string(), schema);
                if param_required {
                    required.push(param_name.to_string());
                }
            }

            let id = sanitize_tool_name(name);
            operations.push(Operation {
                service_name: input.api_name.to_string(),
                id: id.clone(),
                tool_name: tool_name(input.api_name, &id),
                http_method: "POST".to_string(),
                path: String::new(),
                summary: method
                    .get("summary")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                description: method
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                parameters,
                request_body: None,
                static_headers: BTreeMap::new(),
                input_schema: object_schema(properties, required),
                response_schema: method
                    .get("result")
                    .and_then(|result| result.get("schema"))
                    .cloned(),
                content_type: Some("application/json".to_string()),
                graphql: None,
                json_rpc: Some(JsonRpcOperation {
                    method_name: name.to_string(),
                }),
            });
        }

        Ok(Service {
            name: input.api_name.to_string(),
            base_url,
            operations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> Value {
        json!({
            "openrpc": "1.2.6",
            "info": {"title": "Wallet", "version": "1.0.0"},
            "servers": [{"url": "https://rpc.example.com"}],
            "methods": [
                {
                    "name": "eth_getBalance",
                    "summary": "Balance of an address",
                    "params": [
                        {"name": "address", "required": true, "schema": {"type": "string"}},
                        {"name": "block", "schema": {"type": "string"}}
                    ],
                    "result": {"name": "balance", "schema": {"type": "string"}}
                }
            ]
        })
    }

    #[test]
    fn detects_openrpc_key() {
        assert!(OpenRpcAdapter.detect(document().to_string().as_bytes()));
        assert!(!OpenRpcAdapter.detect(br#"{"openapi": "3.0.0"}"#));
    }

    #[test]
    fn methods_become_post_tools() {
        let raw = document().to_string().into_bytes();
        let service = OpenRpcAdapter
            .parse(&ParseInput {
                raw: &raw,
                api_name: "wallet",
                base_url_override: None,
                crud_grouping: false,
            })
            .unwrap();

        assert_eq!(service.base_url.as_str(), "https://rpc.example.com/");
        let op = &service.operations[0];
        assert_eq!(op.http_method, "POST");
        assert_eq!(op.tool_name, "wallet_eth_getBalance");
        // The wire method name keeps its original spelling.
        assert_eq!(op.json_rpc.as_ref().unwrap().method_name, "eth_getBalance");
        assert_eq!(
            op.input_schema["required"],
            json!(["address"])
        );
    }
}
