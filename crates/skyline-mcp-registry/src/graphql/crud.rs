//! CRUD pattern detection over a GraphQL schema.
//!
//! When grouping is enabled, mutations that follow the conventional
//! `createX` / `updateX` / `deleteX` (or `destroyX`) naming, plus set-style
//! mutations `xSetY` / `xAddY`, are folded per base type into a single
//! composite `{base}_manage` tool. Query fields are never grouped.

use std::collections::{BTreeMap, HashSet};

use super::selection::default_selection;
use super::{FieldDef, SchemaModel, TypeRef};
use crate::model::{CompositeField, CompositeOperation};

/// Result of scanning a schema for CRUD groups.
#[derive(Debug, Default)]
pub struct CrudGroups {
    /// One entry per detected base type, in first-appearance order.
    pub composites: Vec<DetectedComposite>,

    /// Mutation field names consumed by a group. These are not exposed as
    /// standalone tools when grouping is enabled.
    pub grouped_fields: HashSet<String>,
}

/// A detected group plus the information needed to build its tool.
#[derive(Debug)]
pub struct DetectedComposite {
    pub operation: CompositeOperation,

    /// Name and GraphQL type of the entity id argument, taken from the
    /// singular query when one exists.
    pub id_arg: (String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Create,
    Update,
    Delete,
}

/// Scan the schema's mutations for CRUD groups.
pub fn detect_crud_groups(model: &SchemaModel) -> CrudGroups {
    let mutations = model.mutation_fields();
    if mutations.is_empty() {
        return CrudGroups::default();
    }

    // Pass 1: verb-prefixed mutations establish candidate base types.
    let mut order: Vec<String> = Vec::new();
    let mut verbs: BTreeMap<String, BTreeMap<&str, &FieldDef>> = BTreeMap::new();
    for field in mutations {
        if let Some((verb, base)) = split_verb(&field.name, field) {
            let slot = match verb {
                Verb::Create => "create",
                Verb::Update => "update",
                Verb::Delete => "delete",
            };
            let entry = verbs.entry(base.clone()).or_default();
            // First declaration wins on duplicate verbs for a base.
            entry.entry(slot).or_insert(field);
            if !order.contains(&base) {
                order.push(base);
            }
        }
    }

    let mut groups = CrudGroups::default();
    for base in order {
        let Some(members) = verbs.get(base.as_str()) else {
            continue;
        };

        // Pass 2: set-ops for this base, in declaration order.
        let prefix = lower_first(&base);
        let set_ops: Vec<&FieldDef> = mutations
            .iter()
            .filter(|field| is_set_op(&field.name, &prefix))
            .collect();

        // A single verb with no companions is not a pattern.
        if members.len() + set_ops.len() < 2 {
            continue;
        }

        let id_arg = singular_query_id_arg(model, &prefix, &base)
            .unwrap_or_else(|| ("id".to_string(), "ID".to_string()));

        let composite = CompositeOperation {
            base_type: base.clone(),
            create: members
                .get("create")
                .map(|field| composite_field(model, field, &id_arg.0)),
            update: members
                .get("update")
                .map(|field| composite_field(model, field, &id_arg.0)),
            delete: members
                .get("delete")
                .map(|field| composite_field(model, field, &id_arg.0)),
            set_ops: set_ops
                .iter()
                .map(|field| composite_field(model, field, &id_arg.0))
                .collect(),
        };

        for field in members.values() {
            groups.grouped_fields.insert(field.name.clone());
        }
        for field in &set_ops {
            groups.grouped_fields.insert(field.name.clone());
        }
        groups.composites.push(DetectedComposite {
            operation: composite,
            id_arg,
        });
    }

    groups
}

fn composite_field(model: &SchemaModel, field: &FieldDef, id_arg: &str) -> CompositeField {
    let arg_types: BTreeMap<String, String> = field
        .args
        .iter()
        .map(|arg| (arg.name.clone(), arg.ty.to_string()))
        .collect();
    let arg_group = field
        .args
        .iter()
        .filter(|arg| arg.name != id_arg && !is_id_name(&arg.name))
        .map(|arg| arg.name.clone())
        .collect();
    CompositeField {
        field_name: field.name.clone(),
        arg_types,
        arg_group,
        default_selection: default_selection(model, &field.ty).unwrap_or_default(),
    }
}

/// Split a mutation name into its CRUD verb and base type, when it has one.
///
/// `createIssue` → (Create, "Issue"). A bare verb (`create`) falls back to
/// the `...Payload` suffix of the return type to name the base.
fn split_verb(name: &str, field: &FieldDef) -> Option<(Verb, String)> {
    const VERBS: [(&str, Verb); 4] = [
        ("create", Verb::Create),
        ("update", Verb::Update),
        ("delete", Verb::Delete),
        ("destroy", Verb::Delete),
    ];
    for (prefix, verb) in VERBS {
        if let Some(rest) = name.strip_prefix(prefix) {
            if rest.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
                return Some((verb, rest.to_string()));
            }
            if rest.is_empty() {
                if let Some(base) = payload_base(&field.ty) {
                    return Some((verb, base));
                }
            }
        }
    }
    None
}

/// `IssuePayload` → `Issue`.
fn payload_base(ty: &TypeRef) -> Option<String> {
    ty.base_name()
        .strip_suffix("Payload")
        .filter(|base| !base.is_empty())
        .map(str::to_string)
}

/// `issueSetLabels` / `issueAddAssignees` style mutations for a base type.
fn is_set_op(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|rest| {
            for marker in ["Set", "Add"] {
                if let Some(suffix) = rest.strip_prefix(marker) {
                    return suffix.chars().next().is_some_and(|c| c.is_ascii_uppercase());
                }
            }
            false
        })
}

/// Find the singular lookup query for a base type: a query field named after
/// the entity whose only required argument is a non-null `id`/`uid`/`key`.
fn singular_query_id_arg(
    model: &SchemaModel,
    singular_name: &str,
    base: &str,
) -> Option<(String, String)> {
    model
        .query_fields()
        .iter()
        .find(|field| field.name == singular_name && field.ty.base_name() == base)
        .and_then(|field| {
            let required: Vec<_> = field.args.iter().filter(|arg| arg.is_required()).collect();
            match required.as_slice() {
                [only] if is_id_name(&only.name) && only.ty.is_non_null() => {
                    Some((only.name.clone(), only.ty.to_string()))
                }
                _ => None,
            }
        })
}

fn is_id_name(name: &str) -> bool {
    matches!(name, "id" | "uid" | "key")
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
