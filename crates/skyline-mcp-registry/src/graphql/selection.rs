//! Default selection sets.
//!
//! A tool backed by a GraphQL field needs a selection set even when the
//! caller supplies none. The default selection collects scalar and enum
//! leaves by recursing the type graph to a bounded depth; a branch that
//! revisits a type already on the path, or exhausts the depth budget,
//! degrades to `{ __typename }` instead of recursing forever.

use std::collections::HashSet;

use super::{SchemaModel, TypeKind, TypeRef};

/// Maximum recursion depth for default selections.
pub const MAX_SELECTION_DEPTH: usize = 8;

/// Compute the default selection set for a field returning `ty`.
///
/// Returns `None` when the return type is a leaf and needs no selection set.
pub fn default_selection(model: &SchemaModel, ty: &TypeRef) -> Option<String> {
    let base = ty.base_name();
    if model.is_leaf(base) {
        return None;
    }
    let mut on_path = HashSet::new();
    Some(selection_for_type(model, base, MAX_SELECTION_DEPTH, &mut on_path))
}

/// True when the selection carries no real data, only the cycle fallback.
pub fn is_degenerate(selection: &str) -> bool {
    selection
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .trim()
        == "__typename"
}

fn selection_for_type(
    model: &SchemaModel,
    type_name: &str,
    depth: usize,
    on_path: &mut HashSet<String>,
) -> String {
    let Some(def) = model.get(type_name) else {
        return "{ __typename }".to_string();
    };
    if depth == 0 || on_path.contains(type_name) {
        return "{ __typename }".to_string();
    }
    match def.kind {
        TypeKind::Union | TypeKind::Interface => "{ __typename }".to_string(),
        TypeKind::Object => {
            on_path.insert(type_name.to_string());
            let mut parts = Vec::new();
            for field in &def.fields {
                // Fields that demand arguments cannot be selected by default.
                if field.args.iter().any(|arg| arg.is_required()) {
                    continue;
                }
                let base = field.ty.base_name();
                if model.is_leaf(base) {
                    parts.push(field.name.clone());
                } else if depth > 1 {
                    let nested = selection_for_type(model, base, depth - 1, on_path);
                    parts.push(format!("{} {}", field.name, nested));
                }
            }
            on_path.remove(type_name);
            if parts.is_empty() {
                "{ __typename }".to_string()
            } else {
                format!("{{ {} }}", parts.join(" "))
            }
        }
        // Leaves never reach here through default_selection, but keep a safe
        // answer for direct calls.
        _ => "{ __typename }".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::sdl::parse_sdl;

    #[test]
    fn scalar_returns_need_no_selection() {
        let model = parse_sdl("t", "type Query { version: String }").unwrap();
        let ty = &model.query_fields()[0].ty;
        assert!(default_selection(&model, ty).is_none());
    }

    #[test]
    fn collects_scalar_leaves() {
        let model = parse_sdl(
            "t",
            r#"
            type Query { issue: Issue }
            type Issue { id: ID! title: String! author: User }
            type User { id: ID! login: String! }
            "#,
        )
        .unwrap();
        let ty = &model.query_fields()[0].ty;
        let selection = default_selection(&model, ty).unwrap();
        assert_eq!(selection, "{ id title author { id login } }");
        assert!(!is_degenerate(&selection));
    }

    #[test]
    fn cycles_break_with_typename() {
        let model = parse_sdl(
            "t",
            r#"
            type Query { node: Node }
            type Node { next: Node }
            "#,
        )
        .unwrap();
        let ty = &model.query_fields()[0].ty;
        let selection = default_selection(&model, ty).unwrap();
        // The only field recurses into the type itself, so the nested branch
        // collapses and the outer selection keeps the fallback.
        assert_eq!(selection, "{ next { __typename } }");
    }

    #[test]
    fn fields_with_required_args_are_skipped() {
        let model = parse_sdl(
            "t",
            r#"
            type Query { report: Report }
            type Report { title: String! section(name: String!): String }
            "#,
        )
        .unwrap();
        let ty = &model.query_fields()[0].ty;
        assert_eq!(default_selection(&model, ty).unwrap(), "{ title }");
    }

    #[test]
    fn depth_bound_degrades_to_typename() {
        let sdl = r#"
            type Query { a: A }
            type A { b: B } type B { c: C } type C { d: D } type D { e: E }
            type E { f: F } type F { g: G } type G { h: H } type H { i: I }
            type I { leaf: String }
        "#;
        let model = parse_sdl("t", sdl).unwrap();
        let ty = &model.query_fields()[0].ty;
        let selection = default_selection(&model, ty).unwrap();
        assert!(selection.contains("__typename"));
        assert!(!selection.contains("leaf"));
    }

    #[test]
    fn union_returns_typename_only() {
        let model = parse_sdl(
            "t",
            r#"
            type Query { thing: Thing }
            union Thing = A | B
            type A { id: ID }
            type B { id: ID }
            "#,
        )
        .unwrap();
        let ty = &model.query_fields()[0].ty;
        let selection = default_selection(&model, ty).unwrap();
        assert!(is_degenerate(&selection));
    }
}
