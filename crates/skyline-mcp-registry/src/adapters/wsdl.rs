//! WSDL 1.1 adapter.
//!
//! Operations are enumerated from the portType; each becomes a POST tool
//! that takes its SOAP body as a single XML string argument. The service
//! address comes from the soap:address binding when present.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::{Map, json};
use url::Url;

use super::{ParseInput, SpecAdapter, SpecType, contains_bytes};
use crate::error::SpecError;
use crate::model::{Operation, Parameter, ParameterLocation, Service, object_schema};
use crate::sanitize::tool_name;

pub struct WsdlAdapter;

impl SpecAdapter for WsdlAdapter {
    fn spec_type(&self) -> SpecType {
        SpecType::Wsdl
    }

    fn detect(&self, raw: &[u8]) -> bool {
        contains_bytes(raw, "wsdl:definitions")
            || (contains_bytes(raw, "<definitions") && contains_bytes(raw, "schemas.xmlsoap.org"))
    }

    fn parse(&self, input: &ParseInput<'_>) -> Result<Service, SpecError> {
        let (operation_names, address) = scan_wsdl(input.api_name, input.raw)?;

        let base_url = match input.base_url_override {
            Some(url) => url.clone(),
            None => address
                .and_then(|a| Url::parse(&a).ok())
                .ok_or_else(|| SpecError::MissingBaseUrl(input.api_name.to_string()))?,
        };

        let operations = operation_names
            .into_iter()
            .map(|name| {
                let mut properties = Map::new();
                properties.insert(
                    "body".to_string(),
                    json!({
                        "type": "string",
                        "description": "XML payload for the SOAP operation body"
                    }),
                );
                Operation {
                    service_name: input.api_name.to_string(),
                    id: name.clone(),
                    tool_name: tool_name(input.api_name, &name),
                    http_method: "POST".to_string(),
                    path: String::new(),
                    summary: Some(format!("SOAP operation {name}")),
                    description: None,
                    parameters: vec![Parameter {
                        name: "body".to_string(),
                        location: ParameterLocation::Body,
                        required: true,
                        schema: json!({"type": "string"}),
                    }],
                    request_body: None,
                    static_headers: BTreeMap::from([(
                        "SOAPAction".to_string(),
                        name.clone(),
                    )]),
                    input_schema: object_schema(properties, vec!["body".to_string()]),
                    response_schema: None,
                    content_type: Some("text/xml".to_string()),
                    graphql: None,
                    json_rpc: None,
                }
            })
            .collect();

        Ok(Service {
            name: input.api_name.to_string(),
            base_url,
            operations,
        })
    }
}

/// Collect portType operation names and the first soap:address location.
fn scan_wsdl(api_name: &str, raw: &[u8]) -> Result<(Vec<String>, Option<String>), SpecError> {
    let mut reader = Reader::from_reader(raw);
    reader.config_mut().trim_text(true);

    let mut operations = Vec::new();
    let mut address = None;
    let mut in_port_type = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"portType" => in_port_type = true,
                b"operation" if in_port_type => {
                    let name = e.attributes().flatten().find_map(|attr| {
                        (attr.key.local_name().as_ref() == b"name")
                            .then(|| String::from_utf8_lossy(&attr.value).to_string())
                    });
                    if let Some(name) = name {
                        if !operations.contains(&name) {
                            operations.push(name);
                        }
                    }
                }
                b"address" => {
                    if address.is_none() {
                        address = e.attributes().flatten().find_map(|attr| {
                            (attr.key.local_name().as_ref() == b"location")
                                .then(|| String::from_utf8_lossy(&attr.value).to_string())
                        });
                    }
                }
                _ => {}
            },
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"portType" {
                    in_port_type = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SpecError::parse(api_name, e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok((operations, address))
}
