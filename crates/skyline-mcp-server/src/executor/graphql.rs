//! GraphQL request construction and composite orchestration planning.
//!
//! Query building and step planning are pure; the executor core owns the
//! wire traffic. Composite steps run create → update → set-ops and the plan
//! only includes steps whose argument groups are actually present.

use serde_json::{Map, Value, json};
use skyline_mcp_registry::model::{CompositeField, CompositeOperation, GraphQlOperation};

use crate::errors::GatewayError;

/// A single GraphQL request: query text plus variables.
pub struct GraphQlRequest {
    pub query: String,
    pub variables: Value,
}

/// One planned sub-mutation of a composite call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub kind: StepKind,
    pub field_name: String,
    /// Argument names (from the caller's arguments) this step consumes.
    pub args: Vec<String>,
    pub selection: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Create,
    Update,
    SetOp,
}

/// Build the request for a plain single-field tool.
pub fn build_request(
    operation: &GraphQlOperation,
    arguments: &Map<String, Value>,
) -> Result<GraphQlRequest, GatewayError> {
    let selection = match arguments.get("selection") {
        Some(Value::String(explicit)) => {
            let trimmed = explicit.trim();
            if !trimmed.starts_with('{') || !trimmed.ends_with('}') {
                return Err(GatewayError::BadArguments(
                    "selection must be a braced GraphQL selection set".to_string(),
                ));
            }
            trimmed.to_string()
        }
        _ => operation.default_selection.clone(),
    };

    let present: Vec<&String> = operation
        .arg_types
        .keys()
        .filter(|name| arguments.contains_key(*name))
        .collect();

    let mut variables = Map::new();
    for name in &present {
        if let Some(value) = arguments.get(*name) {
            variables.insert((*name).clone(), value.clone());
        }
    }

    let query = render_field(
        operation.operation_type.keyword(),
        &operation.field_name,
        &present
            .iter()
            .map(|name| {
                let ty = operation
                    .arg_types
                    .get(*name)
                    .cloned()
                    .unwrap_or_else(|| "String".to_string());
                ((*name).clone(), ty)
            })
            .collect::<Vec<_>>(),
        &selection,
    );

    Ok(GraphQlRequest {
        query,
        variables: Value::Object(variables),
    })
}

/// Build the request for one composite step, given the caller's arguments
/// and the resolved entity id.
pub fn build_step_request(
    composite_field: &CompositeField,
    id_arg: &str,
    id_value: Option<&Value>,
    arguments: &Map<String, Value>,
) -> GraphQlRequest {
    let mut variables = Map::new();
    let mut declared = Vec::new();
    for (name, ty) in &composite_field.arg_types {
        let value = if name == id_arg {
            id_value.cloned()
        } else {
            arguments.get(name).cloned()
        };
        if let Some(value) = value {
            variables.insert(name.clone(), value);
            declared.push((name.clone(), ty.clone()));
        }
    }
    let query = render_field(
        "mutation",
        &composite_field.field_name,
        &declared,
        &composite_field.default_selection,
    );
    GraphQlRequest {
        query,
        variables: Value::Object(variables),
    }
}

/// Decide which composite steps to run for this set of arguments.
///
/// Create runs only when the id is absent; update runs when any update-only
/// argument is present; each set-op runs when any argument of its group is
/// present. Order is fixed: create, update, then set-ops in declaration
/// order.
pub fn plan_steps(
    composite: &CompositeOperation,
    id_arg: &str,
    arguments: &Map<String, Value>,
) -> Vec<PlannedStep> {
    let has_id = arguments.get(id_arg).is_some_and(|v| !v.is_null());
    let mut steps = Vec::new();

    // Arguments consumed by set-ops never trigger the update step.
    let set_op_args: Vec<&String> = composite
        .set_ops
        .iter()
        .flat_map(|op| op.arg_group.iter())
        .collect();

    if !has_id {
        if let Some(create) = &composite.create {
            steps.push(PlannedStep {
                kind: StepKind::Create,
                field_name: create.field_name.clone(),
                args: present_args(create, arguments),
                selection: create.default_selection.clone(),
            });
        }
    }

    if let Some(update) = &composite.update {
        let update_args: Vec<String> = update
            .arg_group
            .iter()
            .filter(|name| {
                arguments.contains_key(*name) && !set_op_args.contains(name)
            })
            .cloned()
            .collect();
        // A fresh create already carried every argument it understands.
        let already_created = steps.iter().any(|s| s.kind == StepKind::Create);
        if !update_args.is_empty() && !already_created {
            steps.push(PlannedStep {
                kind: StepKind::Update,
                field_name: update.field_name.clone(),
                args: update_args,
                selection: update.default_selection.clone(),
            });
        }
    }

    for set_op in &composite.set_ops {
        let present: Vec<String> = set_op
            .arg_group
            .iter()
            .filter(|name| arguments.contains_key(*name))
            .cloned()
            .collect();
        if !present.is_empty() {
            steps.push(PlannedStep {
                kind: StepKind::SetOp,
                field_name: set_op.field_name.clone(),
                args: present,
                selection: set_op.default_selection.clone(),
            });
        }
    }

    steps
}

/// The name of the entity id argument within a composite group.
pub fn id_arg_name(operation: &GraphQlOperation) -> String {
    operation
        .arg_types
        .keys()
        .find(|name| matches!(name.as_str(), "id" | "uid" | "key"))
        .cloned()
        .unwrap_or_else(|| "id".to_string())
}

/// A response counts as failed when it carries errors and no usable data;
/// partial results with errors still flow back to the caller.
pub fn is_error_response(body: &Value) -> bool {
    let has_errors = body.get("errors").is_some_and(|e| !e.is_null());
    let has_data = body.get("data").is_some_and(|d| !d.is_null());
    has_errors && !has_data
}

/// Depth-first search for the first `id` value in a response payload.
pub fn find_id(value: &Value) -> Option<Value> {
    match value {
        Value::Object(map) => {
            if let Some(id) = map.get("id").filter(|v| v.is_string() || v.is_number()) {
                return Some(id.clone());
            }
            map.values().find_map(find_id)
        }
        Value::Array(items) => items.iter().find_map(find_id),
        _ => None,
    }
}

fn present_args(field: &CompositeField, arguments: &Map<String, Value>) -> Vec<String> {
    field
        .arg_group
        .iter()
        .filter(|name| arguments.contains_key(*name))
        .cloned()
        .collect()
}

fn render_field(
    keyword: &str,
    field_name: &str,
    declared: &[(String, String)],
    selection: &str,
) -> String {
    let var_decls = declared
        .iter()
        .map(|(name, ty)| format!("${name}: {ty}"))
        .collect::<Vec<_>>()
        .join(", ");
    let arg_refs = declared
        .iter()
        .map(|(name, _)| format!("{name}: ${name}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut query = String::from(keyword);
    if !var_decls.is_empty() {
        query.push_str(&format!(" ({var_decls})"));
    }
    query.push_str(" { ");
    query.push_str(field_name);
    if !arg_refs.is_empty() {
        query.push_str(&format!("({arg_refs})"));
    }
    if !selection.is_empty() {
        query.push(' ');
        query.push_str(selection);
    }
    query.push_str(" }");
    query
}
