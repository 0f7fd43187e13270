//! Canonical operation model shared by every spec adapter.
//!
//! A [`Service`] is one API in canonical form: a base URL plus the flat list
//! of [`Operation`]s it exposes. Everything downstream (tool registry,
//! executor, transports) works exclusively on this model; the adapter that
//! produced it is irrelevant after parsing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// One API in canonical form.
#[derive(Debug, Clone, Serialize)]
pub struct Service {
    pub name: String,
    pub base_url: Url,
    pub operations: Vec<Operation>,
}

/// A single callable endpoint, independent of transport.
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    /// Name of the owning service.
    pub service_name: String,

    /// Stable identifier within the service (operationId, field name, ...).
    pub id: String,

    /// Sanitised, collision-safe tool name exposed to clients.
    pub tool_name: String,

    /// HTTP method used on the wire. JSON-RPC and GraphQL operations POST.
    pub http_method: String,

    /// Path template relative to the base URL, with `{param}` placeholders.
    pub path: String,

    pub summary: Option<String>,
    pub description: Option<String>,

    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,

    /// Headers sent verbatim on every invocation of this operation.
    pub static_headers: BTreeMap<String, String>,

    /// JSON schema describing the tool arguments.
    pub input_schema: Value,

    /// JSON schema of the (success) response payload, when the spec declares one.
    pub response_schema: Option<Value>,

    pub content_type: Option<String>,

    pub graphql: Option<GraphQlOperation>,
    pub json_rpc: Option<JsonRpcOperation>,
}

impl Operation {
    /// A compact human description used for the tool surface.
    pub fn tool_description(&self) -> String {
        let mut parts = Vec::new();
        if let Some(summary) = self.summary.as_deref().filter(|s| !s.is_empty()) {
            parts.push(summary.to_string());
        } else if let Some(description) = self.description.as_deref().filter(|s| !s.is_empty()) {
            parts.push(description.to_string());
        }
        if self.graphql.is_none() && self.json_rpc.is_none() {
            parts.push(format!("{} {}", self.http_method, self.path));
        }
        parts.join("\n")
    }
}

/// Where a parameter is carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    /// A GraphQL or JSON-RPC argument.
    Argument,
    /// A top-level field of the request body.
    Body,
    /// The GraphQL selection-set override argument.
    Selection,
}

#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestBody {
    pub required: bool,
    pub content_type: String,
    pub schema: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphQlOperationType {
    Query,
    Mutation,
}

impl GraphQlOperationType {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

/// Transport metadata for a tool backed by a single GraphQL field.
#[derive(Debug, Clone, Serialize)]
pub struct GraphQlOperation {
    pub operation_type: GraphQlOperationType,
    pub field_name: String,

    /// Argument name to GraphQL type reference (e.g. `ID!`).
    pub arg_types: BTreeMap<String, String>,

    /// Scalar-only leaf selection used when the caller passes no `selection`.
    pub default_selection: String,

    /// True when no usable default selection could be derived and the caller
    /// must supply one.
    pub requires_selection: bool,

    pub composite: Option<CompositeOperation>,
}

/// A composite tool folding an entity's CRUD mutations into one surface.
#[derive(Debug, Clone, Serialize)]
pub struct CompositeOperation {
    /// The entity type the group was detected for (e.g. `Issue`).
    pub base_type: String,

    pub create: Option<CompositeField>,
    pub update: Option<CompositeField>,
    pub delete: Option<CompositeField>,

    /// Set-style mutations (`issueSetLabels`, ...) in declaration order.
    pub set_ops: Vec<CompositeField>,
}

/// One underlying mutation of a composite tool.
#[derive(Debug, Clone, Serialize)]
pub struct CompositeField {
    pub field_name: String,

    /// Argument name to GraphQL type reference.
    pub arg_types: BTreeMap<String, String>,

    /// Arguments other than the entity id; their presence in a call selects
    /// this step for execution.
    pub arg_group: Vec<String>,

    pub default_selection: String,
}

/// Transport metadata for a tool backed by a JSON-RPC method.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcOperation {
    pub method_name: String,
}

/// Build the skeleton of a tool input schema.
pub fn object_schema(properties: serde_json::Map<String, Value>, required: Vec<String>) -> Value {
    let mut schema = serde_json::Map::new();
    schema.insert("type".into(), Value::String("object".into()));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert(
            "required".into(),
            Value::Array(required.into_iter().map(Value::String).collect()),
        );
    }
    Value::Object(schema)
}
