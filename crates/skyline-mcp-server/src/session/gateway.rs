//! WebSocket JSON-RPC gateway.
//!
//! Bidirectional JSON-RPC 2.0 over a WebSocket per profile. Every inbound
//! request runs on its own task; closing the socket cancels in-flight calls
//! and runs each subscription's cancel function exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::CacheEntry;
use crate::session::hooks::ToolCallHooks;
use crate::session::{SessionTracker, run_tool_call};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const PARSE_ERROR: i32 = -32700;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

type CancelFn = Box<dyn FnOnce() + Send>;

pub struct GatewayContext {
    pub profile: String,
    pub entry: Arc<CacheEntry>,
    pub hooks: Arc<dyn ToolCallHooks>,
    pub tracker: Arc<SessionTracker>,
    pub client_addr: Option<String>,
}

/// Drive one WebSocket session until the client disconnects.
pub async fn serve(socket: WebSocket, ctx: GatewayContext) {
    let session = ctx
        .tracker
        .register(&ctx.profile, "websocket", ctx.client_addr.clone());
    ctx.hooks.on_connect(&session);
    let session_id = session.id;

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Value>(64);
    let cancel = CancellationToken::new();
    let subscriptions: Arc<Mutex<HashMap<String, CancelFn>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if sink.send(Message::Text(message.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    let ctx = Arc::new(ctx);
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let request: JsonRpcRequest = match serde_json::from_str(&message) {
            Ok(request) => request,
            Err(e) => {
                let _ = out_tx
                    .send(error_response(
                        Value::Null,
                        PARSE_ERROR,
                        &format!("invalid JSON-RPC message: {e}"),
                    ))
                    .await;
                continue;
            }
        };

        let ctx = ctx.clone();
        let out_tx = out_tx.clone();
        let cancel = cancel.clone();
        let subscriptions = subscriptions.clone();
        tokio::spawn(async move {
            let id = request.id.clone().unwrap_or(Value::Null);
            let response = tokio::select! {
                response = dispatch(&ctx, session_id, &subscriptions, request) => response,
                _ = cancel.cancelled() => {
                    debug!("request cancelled by disconnect");
                    return;
                }
            };
            if let Some(body) = response {
                let _ = out_tx.send(with_id(body, id)).await;
            }
        });
    }

    // Disconnect: cancel in-flight calls, run subscription cancels exactly
    // once, then emit lifecycle events.
    cancel.cancel();
    let cancels: Vec<CancelFn> = {
        let mut subs = subscriptions.lock();
        subs.drain().map(|(_, f)| f).collect()
    };
    for cancel_fn in cancels {
        cancel_fn();
    }
    writer.abort();
    if let Some(session) = ctx.tracker.unregister(session_id) {
        ctx.hooks.on_disconnect(&session);
    }
}

/// Route one request. Returns None for notifications that need no reply.
async fn dispatch(
    ctx: &Arc<GatewayContext>,
    session_id: Uuid,
    subscriptions: &Arc<Mutex<HashMap<String, CancelFn>>>,
    request: JsonRpcRequest,
) -> Option<Value> {
    let is_notification = request.id.is_none();
    let response = match request.method.as_str() {
        "initialize" => {
            if let Some(client) = request
                .params
                .get("clientInfo")
                .and_then(|info| info.get("name"))
                .and_then(Value::as_str)
            {
                ctx.tracker.set_client_info(session_id, client.to_string());
            }
            result_response(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": "Skyline MCP Gateway",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": {"tools": {}},
            }))
        }
        "tools/list" => {
            let tools: Vec<Value> = ctx
                .entry
                .registry
                .tools()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "inputSchema": tool.input_schema,
                        "outputSchema": tool.output_schema,
                    })
                })
                .collect();
            result_response(json!({"tools": tools}))
        }
        "execute" | "tools/call" => {
            let tool_name = request
                .params
                .get("tool_name")
                .or_else(|| request.params.get("name"))
                .and_then(Value::as_str);
            let Some(tool_name) = tool_name else {
                return Some(error_body(INVALID_PARAMS, "missing tool_name"));
            };
            let arguments: Map<String, Value> = request
                .params
                .get("arguments")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();

            let result = run_tool_call(
                &ctx.entry,
                &ctx.hooks,
                session_id,
                &ctx.profile,
                ctx.client_addr.clone(),
                tool_name,
                arguments,
            )
            .await;
            match result {
                Ok(res) => {
                    let body: Value = serde_json::from_str(&res.body)
                        .unwrap_or(Value::String(res.body.clone()));
                    result_response(json!({
                        "status": res.status,
                        "content_type": res.content_type,
                        "body": body,
                        "truncated": res.truncated,
                    }))
                }
                Err(e) => error_body(e.json_rpc_code(), &e.to_string()),
            }
        }
        // Reserved: acknowledged, no stream is delivered yet. The cancel
        // function is bookkeeping so disconnect semantics already hold.
        "subscribe" => {
            let subscription_id = Uuid::new_v4().to_string();
            let sub_id = subscription_id.clone();
            subscriptions.lock().insert(
                subscription_id.clone(),
                Box::new(move || debug!(subscription = %sub_id, "subscription cancelled")),
            );
            result_response(json!({"subscribed": true, "subscription_id": subscription_id}))
        }
        "unsubscribe" => {
            let subscription_id = request
                .params
                .get("subscription_id")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let removed = subscriptions.lock().remove(subscription_id);
            let found = removed.is_some();
            if let Some(cancel_fn) = removed {
                cancel_fn();
            }
            result_response(json!({"unsubscribed": found}))
        }
        other => {
            warn!(method = other, "unknown gateway method");
            error_body(METHOD_NOT_FOUND, &format!("method not found: {other}"))
        }
    };
    if is_notification {
        None
    } else {
        Some(response)
    }
}

fn result_response(result: Value) -> Value {
    json!({"jsonrpc": "2.0", "result": result})
}

fn error_body(code: i32, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "error": {"code": code, "message": message}})
}

fn error_response(id: Value, code: i32, message: &str) -> Value {
    with_id(error_body(code, message), id)
}

fn with_id(mut body: Value, id: Value) -> Value {
    if let Some(obj) = body.as_object_mut() {
        obj.insert("id".to_string(), id);
    }
    body
}
