//! SDL to [`SchemaModel`] conversion.

use apollo_compiler::Schema;
use apollo_compiler::ast::Type;
use apollo_compiler::schema::ExtendedType;

use super::{FieldDef, InputValueDef, SchemaModel, TypeDef, TypeKind, TypeRef};
use crate::error::SpecError;

/// Parse an SDL document into the internal schema model.
pub fn parse_sdl(api_name: &str, sdl: &str) -> Result<SchemaModel, SpecError> {
    let schema = Schema::parse(sdl, "schema.graphql")
        .map_err(|e| SpecError::parse(api_name, e.errors.to_string()))?;
    Ok(convert_schema(&schema))
}

fn convert_schema(schema: &Schema) -> SchemaModel {
    let mut model = SchemaModel {
        query_type: schema
            .schema_definition
            .query
            .as_ref()
            .map(|name| name.name.to_string()),
        mutation_type: schema
            .schema_definition
            .mutation
            .as_ref()
            .map(|name| name.name.to_string()),
        ..Default::default()
    };

    for (name, ty) in &schema.types {
        if ty.is_built_in() {
            continue;
        }
        let def = match ty {
            ExtendedType::Scalar(scalar) => {
                let mut def = TypeDef::new(name.as_str(), TypeKind::Scalar);
                def.description = scalar.description.as_ref().map(|d| d.to_string());
                def
            }
            ExtendedType::Object(object) => {
                let mut def = TypeDef::new(name.as_str(), TypeKind::Object);
                def.description = object.description.as_ref().map(|d| d.to_string());
                def.fields = object
                    .fields
                    .iter()
                    .map(|(field_name, field)| FieldDef {
                        name: field_name.to_string(),
                        description: field.description.as_ref().map(|d| d.to_string()),
                        args: field
                            .arguments
                            .iter()
                            .map(|arg| convert_input_value(arg))
                            .collect(),
                        ty: convert_type(&field.ty),
                    })
                    .collect();
                def
            }
            ExtendedType::Interface(interface) => {
                let mut def = TypeDef::new(name.as_str(), TypeKind::Interface);
                def.description = interface.description.as_ref().map(|d| d.to_string());
                def.fields = interface
                    .fields
                    .iter()
                    .map(|(field_name, field)| FieldDef {
                        name: field_name.to_string(),
                        description: field.description.as_ref().map(|d| d.to_string()),
                        args: field
                            .arguments
                            .iter()
                            .map(|arg| convert_input_value(arg))
                            .collect(),
                        ty: convert_type(&field.ty),
                    })
                    .collect();
                def
            }
            ExtendedType::Union(union_type) => {
                let mut def = TypeDef::new(name.as_str(), TypeKind::Union);
                def.description = union_type.description.as_ref().map(|d| d.to_string());
                def
            }
            ExtendedType::Enum(enum_type) => {
                let mut def = TypeDef::new(name.as_str(), TypeKind::Enum);
                def.description = enum_type.description.as_ref().map(|d| d.to_string());
                def.enum_values = enum_type
                    .values
                    .keys()
                    .map(|value| value.to_string())
                    .collect();
                def
            }
            ExtendedType::InputObject(input) => {
                let mut def = TypeDef::new(name.as_str(), TypeKind::InputObject);
                def.description = input.description.as_ref().map(|d| d.to_string());
                def.input_fields = input
                    .fields
                    .iter()
                    .map(|(_, field)| convert_input_value(field))
                    .collect();
                def
            }
        };
        model.types.insert(name.to_string(), def);
    }

    // Fall back to the conventional root names when no schema definition block
    // named them explicitly.
    if model.query_type.is_none() && model.types.contains_key("Query") {
        model.query_type = Some("Query".to_string());
    }
    if model.mutation_type.is_none() && model.types.contains_key("Mutation") {
        model.mutation_type = Some("Mutation".to_string());
    }

    model
}

fn convert_input_value(
    value: &apollo_compiler::ast::InputValueDefinition,
) -> InputValueDef {
    InputValueDef {
        name: value.name.to_string(),
        description: value.description.as_ref().map(|d| d.to_string()),
        ty: convert_type(&value.ty),
        has_default: value.default_value.is_some(),
    }
}

fn convert_type(ty: &Type) -> TypeRef {
    match ty {
        Type::Named(name) => TypeRef::Named(name.to_string()),
        Type::NonNullNamed(name) => {
            TypeRef::NonNull(Box::new(TypeRef::Named(name.to_string())))
        }
        Type::List(inner) => TypeRef::List(Box::new(convert_type(inner))),
        Type::NonNullList(inner) => {
            TypeRef::NonNull(Box::new(TypeRef::List(Box::new(convert_type(inner)))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDL: &str = r#"
        type Query {
            issue(id: ID!): Issue
            issues(first: Int = 20): [Issue!]!
        }

        type Mutation {
            createIssue(title: String!, body: String): IssuePayload
        }

        type Issue {
            id: ID!
            title: String!
            state: IssueState!
        }

        type IssuePayload {
            issue: Issue
        }

        enum IssueState {
            OPEN
            CLOSED
        }
    "#;

    #[test]
    fn converts_roots_and_fields() {
        let model = parse_sdl("tracker", SDL).unwrap();
        assert_eq!(model.query_type.as_deref(), Some("Query"));
        assert_eq!(model.mutation_type.as_deref(), Some("Mutation"));

        let queries = model.query_fields();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].name, "issue");
        assert!(queries[0].args[0].is_required());
        assert_eq!(queries[0].args[0].ty.to_string(), "ID!");

        // A defaulted argument is not required even though its shape allows null.
        assert!(!queries[1].args[0].is_required());
    }

    #[test]
    fn converts_enums_and_leaf_detection() {
        let model = parse_sdl("tracker", SDL).unwrap();
        assert!(model.is_leaf("IssueState"));
        assert!(model.is_leaf("ID"));
        assert!(!model.is_leaf("Issue"));
        let state = model.get("IssueState").unwrap();
        assert_eq!(state.enum_values, vec!["OPEN", "CLOSED"]);
    }

    #[test]
    fn rejects_invalid_sdl() {
        assert!(matches!(
            parse_sdl("broken", "type Query {{ nope"),
            Err(SpecError::Parse { .. })
        ));
    }
}
