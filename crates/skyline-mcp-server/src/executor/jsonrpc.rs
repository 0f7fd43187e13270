//! JSON-RPC 2.0 upstream dispatch.

use serde_json::{Map, Value, json};
use skyline_mcp_registry::model::Operation;

use crate::errors::GatewayError;

/// Build the JSON-RPC envelope for an operation call.
///
/// Arguments are passed as named params; an explicit `params` argument
/// (array or object) is passed through positionally-or-named as given.
pub fn build_envelope(operation: &Operation, arguments: &Map<String, Value>) -> Value {
    let method = operation
        .json_rpc
        .as_ref()
        .map(|rpc| rpc.method_name.clone())
        .unwrap_or_else(|| operation.id.clone());
    let params = match arguments.get("params") {
        Some(explicit @ (Value::Array(_) | Value::Object(_))) => explicit.clone(),
        _ => Value::Object(arguments.clone()),
    };
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    })
}

/// Unwrap `result` or surface the `error` object.
pub fn unwrap_response(body: &Value) -> Result<Value, GatewayError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        let mut detail = json!({"code": code, "message": message});
        if let Some(data) = error.get("data").filter(|d| !d.is_null()) {
            if let Some(obj) = detail.as_object_mut() {
                obj.insert("data".to_string(), data.clone());
            }
        }
        return Err(GatewayError::Upstream {
            status: 502,
            body: detail.to_string(),
        });
    }
    Ok(body.get("result").cloned().unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyline_mcp_registry::model::{JsonRpcOperation, object_schema};
    use std::collections::BTreeMap;

    fn operation(method: &str) -> Operation {
        Operation {
            service_name: "rpc".into(),
            id: method.into(),
            tool_name: format!("rpc_{method}"),
            http_method: "POST".into(),
            path: String::new(),
            summary: None,
            description: None,
            parameters: vec![],
            request_body: None,
            static_headers: BTreeMap::new(),
            input_schema: object_schema(serde_json::Map::new(), vec![]),
            response_schema: None,
            content_type: Some("application/json".into()),
            graphql: None,
            json_rpc: Some(JsonRpcOperation {
                method_name: method.into(),
            }),
        }
    }

    #[test]
    fn builds_named_params_envelope() {
        let mut args = Map::new();
        args.insert("address".into(), json!("0xabc"));
        let envelope = build_envelope(&operation("eth_getBalance"), &args);
        assert_eq!(envelope["jsonrpc"], "2.0");
        assert_eq!(envelope["method"], "eth_getBalance");
        assert_eq!(envelope["params"], json!({"address": "0xabc"}));
    }

    #[test]
    fn explicit_params_array_is_positional() {
        let mut args = Map::new();
        args.insert("params".into(), json!(["0xabc", "latest"]));
        let envelope = build_envelope(&operation("eth_getBalance"), &args);
        assert_eq!(envelope["params"], json!(["0xabc", "latest"]));
    }

    #[test]
    fn unwraps_result() {
        let body = json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}});
        assert_eq!(unwrap_response(&body).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn surfaces_error_code_message_data() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32000, "message": "nope", "data": {"k": 1}}
        });
        match unwrap_response(&body) {
            Err(GatewayError::Upstream { body, .. }) => {
                let detail: Value = serde_json::from_str(&body).unwrap();
                assert_eq!(detail["code"], -32000);
                assert_eq!(detail["message"], "nope");
                assert_eq!(detail["data"], json!({"k": 1}));
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }
}
