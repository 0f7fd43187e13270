//! Argument validation at the executor boundary.
//!
//! Tool arguments arrive as free-form JSON; a compiled validator per tool
//! checks required fields, types, enums, and formats before any network
//! traffic happens.

use jsonschema::JSONSchema;
use serde_json::{Map, Value};

use crate::errors::GatewayError;

/// How many schema violations to include in one error message.
const MAX_REPORTED_ERRORS: usize = 5;

pub struct ArgumentValidator {
    schema: JSONSchema,
}

impl ArgumentValidator {
    pub fn compile(input_schema: &Value) -> Result<Self, GatewayError> {
        let schema = JSONSchema::compile(input_schema).map_err(|e| {
            GatewayError::Internal(format!("tool input schema does not compile: {e}"))
        })?;
        Ok(Self { schema })
    }

    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<(), GatewayError> {
        let instance = Value::Object(arguments.clone());
        if let Err(errors) = self.schema.validate(&instance) {
            let mut messages: Vec<String> = errors
                .take(MAX_REPORTED_ERRORS)
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{path}: {error}")
                    }
                })
                .collect();
            messages.sort();
            return Err(GatewayError::BadArguments(messages.join("; ")));
        }
        Ok(())
    }
}
