//! Session tracking and the tool-call pipeline shared by every transport.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time::Instant;
use uuid::Uuid;

use crate::cache::CacheEntry;
use crate::errors::GatewayError;
use crate::executor::ExecuteResult;
use crate::session::hooks::{ToolCallEnd, ToolCallHooks, ToolCallStart, contain};

pub mod gateway;
pub mod hooks;
pub mod mcp;
pub mod stdio;

/// A connected client session on any transport.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub profile: String,
    pub transport: String,
    pub client_info: Option<String>,
    pub client_addr: Option<String>,
    pub started_at: DateTime<Utc>,
    pub active_tool_calls: u32,
}

#[derive(Default)]
pub struct SessionTracker {
    sessions: RwLock<HashMap<Uuid, SessionInfo>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        profile: &str,
        transport: &str,
        client_addr: Option<String>,
    ) -> SessionInfo {
        let info = SessionInfo {
            id: Uuid::new_v4(),
            profile: profile.to_string(),
            transport: transport.to_string(),
            client_info: None,
            client_addr,
            started_at: Utc::now(),
            active_tool_calls: 0,
        };
        self.sessions.write().insert(info.id, info.clone());
        info
    }

    pub fn set_client_info(&self, id: Uuid, client_info: String) {
        if let Some(session) = self.sessions.write().get_mut(&id) {
            session.client_info = Some(client_info);
        }
    }

    pub fn unregister(&self, id: Uuid) -> Option<SessionInfo> {
        self.sessions.write().remove(&id)
    }

    pub fn tool_call_started(&self, id: Uuid) {
        if let Some(session) = self.sessions.write().get_mut(&id) {
            session.active_tool_calls += 1;
        }
    }

    pub fn tool_call_finished(&self, id: Uuid) {
        if let Some(session) = self.sessions.write().get_mut(&id) {
            session.active_tool_calls = session.active_tool_calls.saturating_sub(1);
        }
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self.sessions.read().values().cloned().collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }
}

/// Execute one tool call with the start/end hooks fired around it.
///
/// All transports funnel through here so audit, metrics, and live events
/// stay consistent regardless of how the call arrived.
pub async fn run_tool_call(
    entry: &Arc<CacheEntry>,
    hooks: &Arc<dyn ToolCallHooks>,
    session_id: Uuid,
    profile: &str,
    client_addr: Option<String>,
    tool_name: &str,
    arguments: Map<String, Value>,
) -> Result<ExecuteResult, GatewayError> {
    let tool = entry
        .registry
        .tool(tool_name)
        .ok_or_else(|| GatewayError::UnknownTool(tool_name.to_string()))?;

    let start = ToolCallStart {
        session_id,
        profile,
        tool: tool_name,
        api_name: &tool.operation.service_name,
        arguments: &arguments,
    };
    contain("on_start", || hooks.on_start(&start));

    let started = Instant::now();
    let result = entry.executor.execute(&tool.operation, &arguments).await;
    let duration = started.elapsed();

    let (success, status_code, error, request_size, response_size) = match &result {
        Ok(res) => (
            res.status < 400,
            Some(res.status),
            None,
            res.request_size as u64,
            res.response_size as u64,
        ),
        Err(e) => (false, None, Some(e.to_string()), 0, 0),
    };
    let end = ToolCallEnd {
        session_id,
        profile,
        tool: tool_name,
        api_name: &tool.operation.service_name,
        client_addr,
        duration,
        success,
        status_code,
        error,
        request_size,
        response_size,
    };
    contain("on_end", || hooks.on_end(&end));

    result
}
