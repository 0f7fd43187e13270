//! GraphQL adapter: SDL documents and introspection JSON.
//!
//! Every top-level Query and Mutation field becomes one tool. With CRUD
//! grouping enabled, conventionally named mutations fold into composite
//! `{base}_manage` tools; query fields always stay exposed 1:1.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use url::Url;

use super::{ParseInput, SpecAdapter, SpecType, contains_bytes};
use crate::error::SpecError;
use crate::graphql::crud::{DetectedComposite, detect_crud_groups};
use crate::graphql::selection::{default_selection, is_degenerate};
use crate::graphql::{
    FieldDef, SchemaModel, input_type_to_json_schema, introspection::parse_introspection,
    sdl::parse_sdl,
};
use crate::model::{
    GraphQlOperation, GraphQlOperationType, Operation, Parameter, ParameterLocation, Service,
    object_schema,
};
use crate::sanitize::tool_name;

/// Argument name reserved for selection-set overrides.
const SELECTION_ARG: &str = "selection";

pub struct GraphQlAdapter;

impl SpecAdapter for GraphQlAdapter {
    fn spec_type(&self) -> SpecType {
        SpecType::Graphql
    }

    fn detect(&self, raw: &[u8]) -> bool {
        if contains_bytes(raw, "\"__schema\"") {
            return true;
        }
        ["type Query", "type Mutation", "schema {", "schema{"]
            .iter()
            .any(|needle| contains_bytes(raw, needle))
    }

    fn parse(&self, input: &ParseInput<'_>) -> Result<Service, SpecError> {
        let base_url = input
            .base_url_override
            .cloned()
            .ok_or_else(|| SpecError::MissingBaseUrl(input.api_name.to_string()))?;

        let model = if looks_like_introspection(input.raw) {
            parse_introspection(input.api_name, input.raw)?
        } else {
            let text = std::str::from_utf8(input.raw)
                .map_err(|_| SpecError::parse(input.api_name, "schema is not valid UTF-8"))?;
            parse_sdl(input.api_name, text)?
        };

        build_service(input.api_name, base_url, &model, input.crud_grouping)
    }
}

fn looks_like_introspection(raw: &[u8]) -> bool {
    raw.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{')
        && contains_bytes(raw, "\"__schema\"")
}

fn build_service(
    api_name: &str,
    base_url: Url,
    model: &SchemaModel,
    crud_grouping: bool,
) -> Result<Service, SpecError> {
    let mut operations = Vec::new();

    for field in model.query_fields() {
        operations.push(field_operation(
            api_name,
            model,
            field,
            GraphQlOperationType::Query,
        )?);
    }

    let groups = if crud_grouping {
        detect_crud_groups(model)
    } else {
        Default::default()
    };

    for field in model.mutation_fields() {
        if groups.grouped_fields.contains(&field.name) {
            continue;
        }
        operations.push(field_operation(
            api_name,
            model,
            field,
            GraphQlOperationType::Mutation,
        )?);
    }

    for detected in &groups.composites {
        operations.push(composite_operation(api_name, detected));
    }

    Ok(Service {
        name: api_name.to_string(),
        base_url,
        operations,
    })
}

/// Build the tool for a single top-level field.
fn field_operation(
    api_name: &str,
    model: &SchemaModel,
    field: &FieldDef,
    operation_type: GraphQlOperationType,
) -> Result<Operation, SpecError> {
    if field.args.iter().any(|arg| arg.name == SELECTION_ARG) {
        return Err(SpecError::ReservedArgument(field.name.clone()));
    }

    let mut parameters = Vec::new();
    let mut properties = Map::new();
    let mut required = Vec::new();
    let mut arg_types = BTreeMap::new();

    for arg in &field.args {
        let mut schema = input_type_to_json_schema(model, &arg.ty);
        if let (Value::Object(schema), Some(description)) = (&mut schema, &arg.description) {
            schema
                .entry("description")
                .or_insert_with(|| Value::String(description.clone()));
        }
        parameters.push(Parameter {
            name: arg.name.clone(),
            location: ParameterLocation::Argument,
            required: arg.is_required(),
            schema: schema.clone(),
        });
        properties.insert(arg.name.clone(), schema);
        if arg.is_required() {
            required.push(arg.name.clone());
        }
        arg_types.insert(arg.name.clone(), arg.ty.to_string());
    }

    let selection = default_selection(model, &field.ty);
    let requires_selection = selection
        .as_deref()
        .map(is_degenerate)
        .unwrap_or(false);
    if selection.is_some() {
        let description = if requires_selection {
            "GraphQL selection set for the result. Required: no usable default could be derived."
        } else {
            "Optional GraphQL selection set overriding the default."
        };
        let schema = json!({"type": "string", "description": description});
        parameters.push(Parameter {
            name: SELECTION_ARG.to_string(),
            location: ParameterLocation::Selection,
            required: requires_selection,
            schema: schema.clone(),
        });
        properties.insert(SELECTION_ARG.to_string(), schema);
        if requires_selection {
            required.push(SELECTION_ARG.to_string());
        }
    }

    Ok(Operation {
        service_name: api_name.to_string(),
        id: field.name.clone(),
        tool_name: tool_name(api_name, &field.name),
        http_method: "POST".to_string(),
        path: String::new(),
        summary: field.description.clone(),
        description: field.description.clone(),
        parameters,
        request_body: None,
        static_headers: BTreeMap::new(),
        input_schema: object_schema(properties, required),
        response_schema: None,
        content_type: Some("application/json".to_string()),
        graphql: Some(GraphQlOperation {
            operation_type,
            field_name: field.name.clone(),
            arg_types,
            default_selection: selection.unwrap_or_default(),
            requires_selection,
            composite: None,
        }),
        json_rpc: None,
    })
}

/// Build the `{base}_manage` composite tool from a detected group.
fn composite_operation(api_name: &str, detected: &DetectedComposite) -> Operation {
    let composite = &detected.operation;
    let (id_name, id_type) = &detected.id_arg;
    let entity = lower_first(&composite.base_type);
    let id = format!("{entity}_manage");

    let mut parameters = Vec::new();
    let mut properties = Map::new();
    let mut arg_types = BTreeMap::new();

    // The entity id selects update-mode; its absence selects create-mode.
    let id_schema = json!({
        "type": "string",
        "description": format!(
            "Identifier of the {} to modify. Omit to create a new one.",
            composite.base_type
        )
    });
    properties.insert(id_name.clone(), id_schema.clone());
    parameters.push(Parameter {
        name: id_name.clone(),
        location: ParameterLocation::Argument,
        required: false,
        schema: id_schema,
    });
    arg_types.insert(id_name.clone(), id_type.clone());

    let members = composite
        .create
        .iter()
        .chain(composite.update.iter())
        .chain(composite.delete.iter())
        .chain(composite.set_ops.iter());
    for member in members {
        for (arg, ty) in &member.arg_types {
            if arg == id_name || properties.contains_key(arg) {
                continue;
            }
            properties.insert(arg.clone(), json!({}));
            parameters.push(Parameter {
                name: arg.clone(),
                location: ParameterLocation::Argument,
                required: false,
                schema: json!({}),
            });
            arg_types.insert(arg.clone(), ty.clone());
        }
    }

    let default_selection = composite
        .update
        .as_ref()
        .or(composite.create.as_ref())
        .map(|member| member.default_selection.clone())
        .unwrap_or_default();

    let description = format!(
        "Manage a {} in one call: creates when no {} is given, updates changed fields, and applies set operations ({}).",
        composite.base_type,
        id_name,
        composite
            .set_ops
            .iter()
            .map(|op| op.field_name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    );

    Operation {
        service_name: api_name.to_string(),
        id: id.clone(),
        tool_name: tool_name(api_name, &id),
        http_method: "POST".to_string(),
        path: String::new(),
        summary: Some(format!("Create or update a {}", composite.base_type)),
        description: Some(description),
        parameters,
        request_body: None,
        static_headers: BTreeMap::new(),
        input_schema: object_schema(properties, vec![]),
        response_schema: None,
        content_type: Some("application/json".to_string()),
        graphql: Some(GraphQlOperation {
            operation_type: GraphQlOperationType::Mutation,
            field_name: entity,
            arg_types,
            default_selection,
            requires_selection: false,
            composite: Some(composite.clone()),
        }),
        json_rpc: None,
    }
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACKER_SDL: &str = r#"
        type Query {
            issue(id: ID!): Issue
            issues(first: Int): [Issue!]!
        }

        type Mutation {
            createIssue(title: String!, body: String): IssuePayload
            updateIssue(id: ID!, title: String, body: String): IssuePayload
            deleteIssue(id: ID!): DeletePayload
            issueSetLabels(id: ID!, labels: [String!]!): IssuePayload
            issueSetAssignees(id: ID!, assignees: [String!]!): IssuePayload
        }

        type Issue { id: ID! title: String! body: String }
        type IssuePayload { issue: Issue }
        type DeletePayload { ok: Boolean! }
    "#;

    fn parse(sdl: &str, crud: bool) -> Service {
        let url = Url::parse("https://gql.example.com/graphql").unwrap();
        GraphQlAdapter
            .parse(&ParseInput {
                raw: sdl.as_bytes(),
                api_name: "tracker",
                base_url_override: Some(&url),
                crud_grouping: crud,
            })
            .unwrap()
    }

    #[test]
    fn detects_sdl_and_introspection() {
        assert!(GraphQlAdapter.detect(b"type Query { a: String }"));
        assert!(GraphQlAdapter.detect(br#"{"data":{"__schema":{}}}"#));
        assert!(!GraphQlAdapter.detect(br#"{"openapi":"3.0.0"}"#));
    }

    #[test]
    fn one_tool_per_field_without_grouping() {
        let service = parse(TRACKER_SDL, false);
        let ids: Vec<_> = service.operations.iter().map(|op| op.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "issue",
                "issues",
                "createIssue",
                "updateIssue",
                "deleteIssue",
                "issueSetLabels",
                "issueSetAssignees",
            ]
        );
    }

    #[test]
    fn grouping_emits_one_composite_and_keeps_queries() {
        let service = parse(TRACKER_SDL, true);
        let ids: Vec<_> = service.operations.iter().map(|op| op.id.as_str()).collect();
        assert_eq!(ids, vec!["issue", "issues", "issue_manage"]);

        let manage = service
            .operations
            .iter()
            .find(|op| op.id == "issue_manage")
            .unwrap();
        let properties = manage.input_schema["properties"].as_object().unwrap();
        for expected in ["id", "title", "body", "labels", "assignees"] {
            assert!(properties.contains_key(expected), "missing {expected}");
        }
        // Everything on the composite is optional; mode is chosen at runtime.
        assert!(manage.input_schema.get("required").is_none());

        let graphql = manage.graphql.as_ref().unwrap();
        let composite = graphql.composite.as_ref().unwrap();
        assert_eq!(composite.base_type, "Issue");
        assert_eq!(composite.set_ops.len(), 2);
    }

    #[test]
    fn query_tools_carry_selection_parameter() {
        let service = parse(TRACKER_SDL, false);
        let issue = service
            .operations
            .iter()
            .find(|op| op.id == "issue")
            .unwrap();
        let selection = issue
            .parameters
            .iter()
            .find(|p| p.location == ParameterLocation::Selection)
            .unwrap();
        assert!(!selection.required);
        let graphql = issue.graphql.as_ref().unwrap();
        assert_eq!(graphql.default_selection, "{ id title body }");
    }

    #[test]
    fn reserved_selection_argument_is_rejected() {
        let url = Url::parse("https://gql.example.com/graphql").unwrap();
        let result = GraphQlAdapter.parse(&ParseInput {
            raw: b"type Query { search(selection: String): String }",
            api_name: "bad",
            base_url_override: Some(&url),
            crud_grouping: false,
        });
        assert!(matches!(result, Err(SpecError::ReservedArgument(field)) if field == "search"));
    }

    #[test]
    fn missing_base_url_is_an_error() {
        let result = GraphQlAdapter.parse(&ParseInput {
            raw: b"type Query { a: String }",
            api_name: "nourl",
            base_url_override: None,
            crud_grouping: false,
        });
        assert!(matches!(result, Err(SpecError::MissingBaseUrl(_))));
    }
}
