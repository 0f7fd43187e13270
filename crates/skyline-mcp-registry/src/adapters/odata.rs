//! OData v4 `$metadata` adapter.
//!
//! Entity sets in the metadata document enumerate into the standard OData
//! access methods: list, read by key, create, update (PATCH), delete.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::{Map, Value, json};

use super::{ParseInput, SpecAdapter, SpecType, contains_bytes};
use crate::error::SpecError;
use crate::model::{
    Operation, Parameter, ParameterLocation, RequestBody, Service, object_schema,
};
use crate::sanitize::tool_name;

pub struct ODataAdapter;

#[derive(Debug, Clone, Default)]
struct EntityType {
    key: Option<String>,
    properties: Vec<(String, String, bool)>,
}

impl SpecAdapter for ODataAdapter {
    fn spec_type(&self) -> SpecType {
        SpecType::Odata
    }

    fn detect(&self, raw: &[u8]) -> bool {
        contains_bytes(raw, "edmx:Edmx")
    }

    fn parse(&self, input: &ParseInput<'_>) -> Result<Service, SpecError> {
        let base_url = input
            .base_url_override
            .cloned()
            .ok_or_else(|| SpecError::MissingBaseUrl(input.api_name.to_string()))?;

        let (entity_sets, entity_types) = parse_metadata(input.api_name, input.raw)?;

        let mut operations = Vec::new();
        for (set_name, type_name) in &entity_sets {
            let ty = entity_types.get(local_name(type_name)).cloned().unwrap_or_default();
            operations.extend(entity_set_operations(input.api_name, set_name, &ty));
        }

        Ok(Service {
            name: input.api_name.to_string(),
            base_url,
            operations,
        })
    }
}

/// Pull entity sets and entity types out of the metadata XML.
#[allow(clippy::type_complexity)]
fn parse_metadata(
    api_name: &str,
    raw: &[u8],
) -> Result<(Vec<(String, String)>, BTreeMap<String, EntityType>), SpecError> {
    let mut reader = Reader::from_reader(raw);
    reader.config_mut().trim_text(true);

    let mut entity_sets = Vec::new();
    let mut entity_types: BTreeMap<String, EntityType> = BTreeMap::new();
    let mut current_type: Option<String> = None;
    let mut in_key = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"EntitySet" => {
                        let mut set_name = None;
                        let mut type_name = None;
                        for attr in e.attributes().flatten() {
                            let value = String::from_utf8_lossy(&attr.value).to_string();
                            match attr.key.local_name().as_ref() {
                                b"Name" => set_name = Some(value),
                                b"EntityType" => type_name = Some(value),
                                _ => {}
                            }
                        }
                        if let (Some(set), Some(ty)) = (set_name, type_name) {
                            entity_sets.push((set, ty));
                        }
                    }
                    b"EntityType" => {
                        let type_name = e.attributes().flatten().find_map(|attr| {
                            (attr.key.local_name().as_ref() == b"Name")
                                .then(|| String::from_utf8_lossy(&attr.value).to_string())
                        });
                        if let Some(type_name) = type_name {
                            entity_types.entry(type_name.clone()).or_default();
                            current_type = Some(type_name);
                        }
                    }
                    b"Key" => in_key = true,
                    b"PropertyRef" if in_key => {
                        if let (Some(ty), Some(key)) = (
                            current_type.as_ref(),
                            e.attributes().flatten().find_map(|attr| {
                                (attr.key.local_name().as_ref() == b"Name")
                                    .then(|| String::from_utf8_lossy(&attr.value).to_string())
                            }),
                        ) {
                            if let Some(entry) = entity_types.get_mut(ty) {
                                entry.key.get_or_insert(key);
                            }
                        }
                    }
                    b"Property" => {
                        if let Some(ty) = current_type.as_ref() {
                            let mut prop_name = None;
                            let mut prop_type = "Edm.String".to_string();
                            let mut nullable = true;
                            for attr in e.attributes().flatten() {
                                let value = String::from_utf8_lossy(&attr.value).to_string();
                                match attr.key.local_name().as_ref() {
                                    b"Name" => prop_name = Some(value),
                                    b"Type" => prop_type = value,
                                    b"Nullable" => nullable = value != "false",
                                    _ => {}
                                }
                            }
                            if let (Some(prop_name), Some(entry)) =
                                (prop_name, entity_types.get_mut(ty))
                            {
                                entry.properties.push((prop_name, prop_type, nullable));
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"EntityType" => current_type = None,
                b"Key" => in_key = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(SpecError::parse(api_name, e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok((entity_sets, entity_types))
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

fn edm_to_json_schema(edm: &str) -> Value {
    match edm {
        "Edm.Int16" | "Edm.Int32" | "Edm.Int64" | "Edm.Byte" | "Edm.SByte" => {
            json!({"type": "integer"})
        }
        "Edm.Double" | "Edm.Single" | "Edm.Decimal" => json!({"type": "number"}),
        "Edm.Boolean" => json!({"type": "boolean"}),
        _ => json!({"type": "string"}),
    }
}

fn entity_set_operations(api_name: &str, set: &str, ty: &EntityType) -> Vec<Operation> {
    let key = ty.key.clone().unwrap_or_else(|| "id".to_string());
    let key_schema = ty
        .properties
        .iter()
        .find(|(name, _, _)| *name == key)
        .map(|(_, edm, _)| edm_to_json_schema(edm))
        .unwrap_or(json!({"type": "string"}));

    let mut body_properties = Map::new();
    let mut body_required = Vec::new();
    for (name, edm, nullable) in &ty.properties {
        if name == &key {
            continue;
        }
        body_properties.insert(name.clone(), edm_to_json_schema(edm));
        if !nullable {
            body_required.push(name.clone());
        }
    }
    let body_schema = object_schema(body_properties.clone(), body_required.clone());

    let key_param = Parameter {
        name: key.clone(),
        location: ParameterLocation::Path,
        required: true,
        schema: key_schema.clone(),
    };
    let body_params = || {
        body_properties
            .iter()
            .map(|(name, schema)| Parameter {
                name: name.clone(),
                location: ParameterLocation::Body,
                required: body_required.contains(name),
                schema: schema.clone(),
            })
            .collect::<Vec<_>>()
    };

    let mut make = |id: String, method: &str, path: String, summary: String, params: Vec<Parameter>, with_body: bool| {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &params {
            properties.insert(param.name.clone(), param.schema.clone());
            if param.required {
                required.push(param.name.clone());
            }
        }
        Operation {
            service_name: api_name.to_string(),
            id: id.clone(),
            tool_name: tool_name(api_name, &id),
            http_method: method.to_string(),
            path,
            summary: Some(summary),
            description: None,
            parameters: params,
            request_body: with_body.then(|| RequestBody {
                required: true,
                content_type: "application/json".to_string(),
                schema: body_schema.clone(),
            }),
            static_headers: BTreeMap::new(),
            input_schema: object_schema(properties, required),
            response_schema: None,
            content_type: with_body.then(|| "application/json".to_string()),
            graphql: None,
            json_rpc: None,
        }
    };

    vec![
        make(
            format!("list{set}"),
            "GET",
            format!("/{set}"),
            format!("List {set}"),
            vec![
                Parameter {
                    name: "$filter".to_string(),
                    location: ParameterLocation::Query,
                    required: false,
                    schema: json!({"type": "string"}),
                },
                Parameter {
                    name: "$top".to_string(),
                    location: ParameterLocation::Query,
                    required: false,
                    schema: json!({"type": "integer"}),
                },
                Parameter {
                    name: "$skip".to_string(),
                    location: ParameterLocation::Query,
                    required: false,
                    schema: json!({"type": "integer"}),
                },
            ],
            false,
        ),
        make(
            format!("get{set}"),
            "GET",
            format!("/{set}({{{key}}})"),
            format!("Read one of {set} by key"),
            vec![key_param.clone()],
            false,
        ),
        make(
            format!("create{set}"),
            "POST",
            format!("/{set}"),
            format!("Create in {set}"),
            body_params(),
            true,
        ),
        make(
            format!("update{set}"),
            "PATCH",
            format!("/{set}({{{key}}})"),
            format!("Update one of {set}"),
            {
                let mut params = vec![key_param.clone()];
                params.extend(body_params().into_iter().map(|mut p| {
                    p.required = false;
                    p
                }));
                params
            },
            true,
        ),
        make(
            format!("delete{set}"),
            "DELETE",
            format!("/{set}({{{key}}})"),
            format!("Delete one of {set}"),
            vec![key_param],
            false,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    const METADATA: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx" Version="4.0">
  <edmx:DataServices>
    <Schema xmlns="http://docs.oasis-open.org/odata/ns/edm" Namespace="Acme">
      <EntityType Name="Product">
        <Key><PropertyRef Name="ID"/></Key>
        <Property Name="ID" Type="Edm.Int32" Nullable="false"/>
        <Property Name="Name" Type="Edm.String" Nullable="false"/>
        <Property Name="Price" Type="Edm.Decimal"/>
      </EntityType>
      <EntityContainer Name="Container">
        <EntitySet Name="Products" EntityType="Acme.Product"/>
      </EntityContainer>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    #[test]
    fn detects_edmx() {
        assert!(ODataAdapter.detect(METADATA.as_bytes()));
        assert!(!ODataAdapter.detect(br#"{"openapi": "3"}"#));
    }

    #[test]
    fn entity_sets_enumerate_crud_operations() {
        let url = Url::parse("https://odata.example.com/v4").unwrap();
        let service = ODataAdapter
            .parse(&ParseInput {
                raw: METADATA.as_bytes(),
                api_name: "acme",
                base_url_override: Some(&url),
                crud_grouping: false,
            })
            .unwrap();

        let ids: Vec<_> = service.operations.iter().map(|op| op.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "listProducts",
                "getProducts",
                "createProducts",
                "updateProducts",
                "deleteProducts",
            ]
        );

        let get = &service.operations[1];
        assert_eq!(get.path, "/Products({ID})");
        assert_eq!(get.parameters[0].schema, json!({"type": "integer"}));

        let create = &service.operations[2];
        assert_eq!(create.input_schema["required"], json!(["Name"]));
    }

    #[test]
    fn requires_base_url_override() {
        let result = ODataAdapter.parse(&ParseInput {
            raw: METADATA.as_bytes(),
            api_name: "acme",
            base_url_override: None,
            crud_grouping: false,
        });
        assert!(matches!(result, Err(SpecError::MissingBaseUrl(_))));
    }
}
