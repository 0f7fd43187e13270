//! Tool registry: canonical services in, named tools out.
//!
//! Construction is pure. The registry owns the mapping from client-facing
//! tool names to operations and guarantees name uniqueness across every
//! service in a profile.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use skyline_mcp_registry::model::{Operation, Service};
use skyline_mcp_registry::sanitize::short_hash;
use tracing::debug;

/// An operation packaged for an agent client.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
    pub operation: Operation,
}

/// A read-only resource exposed alongside the tools.
#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    pub name: String,
    pub description: String,
    pub uri: String,
}

#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Tool>,
    resources: BTreeMap<String, Resource>,
}

impl ToolRegistry {
    pub fn build(services: &[Service]) -> Self {
        let mut registry = Self::default();
        for service in services {
            registry.resources.insert(
                service.name.clone(),
                Resource {
                    name: service.name.clone(),
                    description: format!(
                        "API '{}' at {} ({} operations)",
                        service.name,
                        service.base_url,
                        service.operations.len()
                    ),
                    uri: format!("skyline://services/{}", service.name),
                },
            );
            for operation in &service.operations {
                let name = registry.unique_name(service, operation);
                let tool = Tool {
                    name: name.clone(),
                    description: operation.tool_description(),
                    input_schema: operation.input_schema.clone(),
                    output_schema: operation.response_schema.clone(),
                    operation: operation.clone(),
                };
                registry.tools.insert(name, tool);
            }
        }
        debug!(
            tools = registry.tools.len(),
            resources = registry.resources.len(),
            "registry built"
        );
        registry
    }

    /// The operation's own tool name, suffixed with a short fingerprint hash
    /// when another service already claimed it.
    fn unique_name(&self, service: &Service, operation: &Operation) -> String {
        if !self.tools.contains_key(&operation.tool_name) {
            return operation.tool_name.clone();
        }
        let fingerprint = short_hash(&format!("{}:{}", service.name, operation.id));
        format!("{}_{fingerprint}", operation.tool_name)
    }

    pub fn tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn tools(&self) -> impl Iterator<Item = &Tool> {
        self.tools.values()
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
