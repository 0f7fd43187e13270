//! Introspection JSON to [`SchemaModel`] conversion.
//!
//! Accepts either a bare `{"__schema": ...}` object or a full GraphQL
//! response `{"data": {"__schema": ...}}`.

use serde::Deserialize;

use super::{FieldDef, InputValueDef, SchemaModel, TypeDef, TypeKind, TypeRef};
use crate::error::SpecError;

pub fn parse_introspection(api_name: &str, raw: &[u8]) -> Result<SchemaModel, SpecError> {
    let document: IntrospectionDocument =
        serde_json::from_slice(raw).map_err(|e| SpecError::parse(api_name, e.to_string()))?;
    let schema = document
        .schema()
        .ok_or_else(|| SpecError::parse(api_name, "missing __schema in introspection result"))?;
    convert(api_name, schema)
}

#[derive(Deserialize)]
struct IntrospectionDocument {
    #[serde(rename = "__schema")]
    schema: Option<IntrospectionSchema>,
    data: Option<IntrospectionData>,
}

#[derive(Deserialize)]
struct IntrospectionData {
    #[serde(rename = "__schema")]
    schema: Option<IntrospectionSchema>,
}

impl IntrospectionDocument {
    fn schema(self) -> Option<IntrospectionSchema> {
        self.schema.or(self.data.and_then(|data| data.schema))
    }
}

#[derive(Deserialize)]
struct IntrospectionSchema {
    #[serde(rename = "queryType")]
    query_type: Option<NamedTypeRef>,
    #[serde(rename = "mutationType")]
    mutation_type: Option<NamedTypeRef>,
    types: Vec<IntrospectionType>,
}

#[derive(Deserialize)]
struct NamedTypeRef {
    name: String,
}

#[derive(Deserialize)]
struct IntrospectionType {
    kind: String,
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    fields: Option<Vec<IntrospectionField>>,
    #[serde(rename = "inputFields", default)]
    input_fields: Option<Vec<IntrospectionInputValue>>,
    #[serde(rename = "enumValues", default)]
    enum_values: Option<Vec<IntrospectionEnumValue>>,
}

#[derive(Deserialize)]
struct IntrospectionField {
    name: String,
    description: Option<String>,
    #[serde(default)]
    args: Vec<IntrospectionInputValue>,
    #[serde(rename = "type")]
    ty: IntrospectionTypeRef,
}

#[derive(Deserialize)]
struct IntrospectionInputValue {
    name: String,
    description: Option<String>,
    #[serde(rename = "type")]
    ty: IntrospectionTypeRef,
    #[serde(rename = "defaultValue")]
    default_value: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct IntrospectionEnumValue {
    name: String,
}

#[derive(Deserialize)]
struct IntrospectionTypeRef {
    kind: String,
    name: Option<String>,
    #[serde(rename = "ofType")]
    of_type: Option<Box<IntrospectionTypeRef>>,
}

fn convert(api_name: &str, schema: IntrospectionSchema) -> Result<SchemaModel, SpecError> {
    let mut model = SchemaModel {
        query_type: schema.query_type.map(|t| t.name),
        mutation_type: schema.mutation_type.map(|t| t.name),
        ..Default::default()
    };

    for ty in schema.types {
        let Some(name) = ty.name.clone() else {
            continue;
        };
        if name.starts_with("__") {
            continue;
        }
        let kind = match ty.kind.as_str() {
            "SCALAR" => TypeKind::Scalar,
            "OBJECT" => TypeKind::Object,
            "INTERFACE" => TypeKind::Interface,
            "UNION" => TypeKind::Union,
            "ENUM" => TypeKind::Enum,
            "INPUT_OBJECT" => TypeKind::InputObject,
            other => {
                return Err(SpecError::parse(
                    api_name,
                    format!("unknown introspection kind '{other}' for type '{name}'"),
                ));
            }
        };
        let mut def = TypeDef::new(name.clone(), kind);
        def.description = ty.description;
        def.fields = ty
            .fields
            .unwrap_or_default()
            .into_iter()
            .map(|field| {
                Ok(FieldDef {
                    name: field.name,
                    description: field.description,
                    args: field
                        .args
                        .into_iter()
                        .map(|arg| convert_input_value(api_name, arg))
                        .collect::<Result<_, _>>()?,
                    ty: convert_type_ref(api_name, &field.ty)?,
                })
            })
            .collect::<Result<_, SpecError>>()?;
        def.input_fields = ty
            .input_fields
            .unwrap_or_default()
            .into_iter()
            .map(|field| convert_input_value(api_name, field))
            .collect::<Result<_, _>>()?;
        def.enum_values = ty
            .enum_values
            .unwrap_or_default()
            .into_iter()
            .map(|value| value.name)
            .collect();
        model.types.insert(name, def);
    }

    Ok(model)
}

fn convert_input_value(
    api_name: &str,
    value: IntrospectionInputValue,
) -> Result<InputValueDef, SpecError> {
    Ok(InputValueDef {
        name: value.name,
        description: value.description,
        ty: convert_type_ref(api_name, &value.ty)?,
        has_default: value
            .default_value
            .map(|v| !v.is_null())
            .unwrap_or(false),
    })
}

fn convert_type_ref(
    api_name: &str,
    ty: &IntrospectionTypeRef,
) -> Result<TypeRef, SpecError> {
    match ty.kind.as_str() {
        "NON_NULL" => {
            let inner = ty.of_type.as_deref().ok_or_else(|| {
                SpecError::parse(api_name, "NON_NULL type reference missing ofType")
            })?;
            Ok(TypeRef::NonNull(Box::new(convert_type_ref(api_name, inner)?)))
        }
        "LIST" => {
            let inner = ty.of_type.as_deref().ok_or_else(|| {
                SpecError::parse(api_name, "LIST type reference missing ofType")
            })?;
            Ok(TypeRef::List(Box::new(convert_type_ref(api_name, inner)?)))
        }
        _ => {
            let name = ty.name.clone().ok_or_else(|| {
                SpecError::parse(api_name, "named type reference missing name")
            })?;
            Ok(TypeRef::Named(name))
        }
    }
}
