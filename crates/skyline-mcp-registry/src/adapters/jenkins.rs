//! Jenkins JSON API adapter.
//!
//! Jenkins has no machine-readable spec, so the adapter enumerates the
//! standard per-job remote-access endpoints from a `/api/json` listing.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use url::Url;

use super::{ParseInput, SpecAdapter, SpecType, contains_bytes, parse_json_or_yaml};
use crate::error::SpecError;
use crate::model::{Operation, Parameter, ParameterLocation, Service, object_schema};
use crate::sanitize::tool_name;

pub struct JenkinsAdapter;

impl SpecAdapter for JenkinsAdapter {
    fn spec_type(&self) -> SpecType {
        SpecType::Jenkins
    }

    fn detect(&self, raw: &[u8]) -> bool {
        contains_bytes(raw, "\"_class\"")
            && (contains_bytes(raw, "hudson.") || contains_bytes(raw, "jenkins."))
    }

    fn parse(&self, input: &ParseInput<'_>) -> Result<Service, SpecError> {
        let document = parse_json_or_yaml(input.api_name, input.raw)?;

        let base_url = match input.base_url_override {
            Some(url) => url.clone(),
            None => document
                .get("url")
                .and_then(Value::as_str)
                .and_then(|url| Url::parse(url).ok())
                .ok_or_else(|| SpecError::MissingBaseUrl(input.api_name.to_string()))?,
        };

        let mut operations = vec![listing_operation(input.api_name)];
        for job in document
            .get("jobs")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let Some(name) = job.get("name").and_then(Value::as_str) else {
                continue;
            };
            operations.extend(job_operations(input.api_name, name));
        }

        Ok(Service {
            name: input.api_name.to_string(),
            base_url,
            operations,
        })
    }
}

fn listing_operation(api_name: &str) -> Operation {
    simple_operation(
        api_name,
        "listJobs".to_string(),
        "GET",
        "/api/json".to_string(),
        "List all jobs".to_string(),
        vec![],
    )
}

fn job_operations(api_name: &str, job: &str) -> Vec<Operation> {
    let build_params = vec![Parameter {
        name: "parameters".to_string(),
        location: ParameterLocation::Query,
        required: false,
        schema: json!({
            "type": "object",
            "description": "Build parameters passed as query arguments"
        }),
    }];
    vec![
        simple_operation(
            api_name,
            format!("{job}_info"),
            "GET",
            format!("/job/{job}/api/json"),
            format!("Job details for {job}"),
            vec![],
        ),
        simple_operation(
            api_name,
            format!("{job}_build"),
            "POST",
            format!("/job/{job}/build"),
            format!("Trigger a build of {job}"),
            build_params,
        ),
        simple_operation(
            api_name,
            format!("{job}_lastBuild"),
            "GET",
            format!("/job/{job}/lastBuild/api/json"),
            format!("Status of the last build of {job}"),
            vec![],
        ),
    ]
}

fn simple_operation(
    api_name: &str,
    id: String,
    method: &str,
    path: String,
    summary: String,
    parameters: Vec<Parameter>,
) -> Operation {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in &parameters {
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
        parameters,
        request_body: None,
        static_headers: BTreeMap::new(),
        input_schema: object_schema(properties, required),
        response_schema: None,
        content_type: None,
        graphql: None,
        json_rpc: None,
    }
}
