//! Internal GraphQL schema model.
//!
//! SDL documents (parsed with `apollo-compiler`) and introspection JSON both
//! convert into this model, so the selection builder and the CRUD analyser
//! run over a single representation regardless of how the schema arrived.

use std::collections::BTreeMap;
use std::fmt;

pub mod crud;
pub mod introspection;
pub mod sdl;
pub mod selection;

/// A normalised GraphQL schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaModel {
    pub query_type: Option<String>,
    pub mutation_type: Option<String>,
    pub types: BTreeMap<String, TypeDef>,
}

impl SchemaModel {
    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Fields of the root query type, in declaration order.
    pub fn query_fields(&self) -> &[FieldDef] {
        self.root_fields(self.query_type.as_deref())
    }

    /// Fields of the root mutation type, in declaration order.
    pub fn mutation_fields(&self) -> &[FieldDef] {
        self.root_fields(self.mutation_type.as_deref())
    }

    fn root_fields(&self, root: Option<&str>) -> &[FieldDef] {
        root.and_then(|name| self.types.get(name))
            .map(|def| def.fields.as_slice())
            .unwrap_or(&[])
    }

    /// True when the named type resolves to a scalar or enum.
    pub fn is_leaf(&self, name: &str) -> bool {
        match self.types.get(name) {
            Some(def) => matches!(def.kind, TypeKind::Scalar | TypeKind::Enum),
            // Unknown types are treated as custom scalars.
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    pub description: Option<String>,
    /// Output fields (objects and interfaces).
    pub fields: Vec<FieldDef>,
    /// Input fields (input objects).
    pub input_fields: Vec<InputValueDef>,
    pub enum_values: Vec<String>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            fields: Vec::new(),
            input_fields: Vec::new(),
            enum_values: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub args: Vec<InputValueDef>,
    pub ty: TypeRef,
}

#[derive(Debug, Clone)]
pub struct InputValueDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub has_default: bool,
}

impl InputValueDef {
    pub fn is_required(&self) -> bool {
        matches!(self.ty, TypeRef::NonNull(_)) && !self.has_default
    }
}

/// A type reference as written in the schema (`[Issue!]!`, `ID`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    NonNull(Box<TypeRef>),
    List(Box<TypeRef>),
}

impl TypeRef {
    /// The innermost named type.
    pub fn base_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::NonNull(inner) | Self::List(inner) => inner.base_name(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
            Self::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// JSON schema for a GraphQL input type reference.
///
/// Nullability is expressed through the `required` list of the enclosing
/// object schema rather than in the per-property schema.
pub fn input_type_to_json_schema(model: &SchemaModel, ty: &TypeRef) -> serde_json::Value {
    use serde_json::json;
    match ty {
        TypeRef::NonNull(inner) => input_type_to_json_schema(model, inner),
        TypeRef::List(inner) => {
            json!({"type": "array", "items": input_type_to_json_schema(model, inner)})
        }
        TypeRef::Named(name) => match name.as_str() {
            "Int" => json!({"type": "integer"}),
            "Float" => json!({"type": "number"}),
            "Boolean" => json!({"type": "boolean"}),
            "ID" | "String" => json!({"type": "string"}),
            other => match model.types.get(other) {
                Some(def) if def.kind == TypeKind::Enum => {
                    json!({"type": "string", "enum": def.enum_values})
                }
                Some(def) if def.kind == TypeKind::InputObject => {
                    let mut properties = serde_json::Map::new();
                    let mut required = Vec::new();
                    for field in &def.input_fields {
                        properties.insert(
                            field.name.clone(),
                            input_type_to_json_schema(model, &field.ty),
                        );
                        if field.is_required() {
                            required.push(field.name.clone());
                        }
                    }
                    crate::model::object_schema(properties, required)
                }
                // Custom scalar with no further structure.
                _ => json!({}),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_ref_display_round_trips_shape() {
        let ty = TypeRef::NonNull(Box::new(TypeRef::List(Box::new(TypeRef::NonNull(
            Box::new(TypeRef::Named("Issue".into())),
        )))));
        assert_eq!(ty.to_string(), "[Issue!]!");
        assert_eq!(ty.base_name(), "Issue");
        assert!(ty.is_non_null());
    }

    #[test]
    fn enum_becomes_string_enum_schema() {
        let mut model = SchemaModel::default();
        let mut def = TypeDef::new("Color", TypeKind::Enum);
        def.enum_values = vec!["RED".into(), "BLUE".into()];
        model.types.insert("Color".into(), def);

        let schema = input_type_to_json_schema(&model, &TypeRef::Named("Color".into()));
        assert_eq!(
            schema,
            serde_json::json!({"type": "string", "enum": ["RED", "BLUE"]})
        );
    }
}
