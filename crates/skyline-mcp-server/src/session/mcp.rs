//! MCP protocol handler and per-profile streamable HTTP services.

use std::collections::HashMap;
use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorCode, Implementation,
    InitializeRequestParam, InitializeResult, ListToolsResult, PaginatedRequestParam,
    ServerCapabilities, ServerInfo, Tool as McpTool,
};
use rmcp::service::RequestContext;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::StreamableHttpService;
use rmcp::{RoleServer, ServerHandler};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::cache::CacheEntry;
use crate::errors::{GatewayError, McpError};
use crate::session::hooks::ToolCallHooks;
use crate::session::{SessionTracker, run_tool_call};

/// One MCP session bound to a profile's cached artefacts.
#[derive(Clone)]
pub struct ProfileMcpHandler(Arc<HandlerState>);

struct HandlerState {
    profile: String,
    entry: Arc<CacheEntry>,
    hooks: Arc<dyn ToolCallHooks>,
    tracker: Arc<SessionTracker>,
    session_id: Uuid,
}

impl ProfileMcpHandler {
    pub fn new(
        profile: String,
        entry: Arc<CacheEntry>,
        hooks: Arc<dyn ToolCallHooks>,
        tracker: Arc<SessionTracker>,
    ) -> Self {
        let session = tracker.register(&profile, "mcp", None);
        hooks.on_connect(&session);
        Self(Arc::new(HandlerState {
            profile,
            entry,
            hooks,
            tracker,
            session_id: session.id,
        }))
    }
}

impl Drop for HandlerState {
    fn drop(&mut self) {
        if let Some(session) = self.tracker.unregister(self.session_id) {
            self.hooks.on_disconnect(&session);
        }
    }
}

impl ServerHandler for ProfileMcpHandler {
    async fn initialize(
        &self,
        request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        self.0.tracker.set_client_info(
            self.0.session_id,
            format!("{} {}", request.client_info.name, request.client_info.version),
        );
        Ok(self.get_info())
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = request.arguments.clone().unwrap_or_default();
        let result = run_tool_call(
            &self.0.entry,
            &self.0.hooks,
            self.0.session_id,
            &self.0.profile,
            None,
            request.name.as_ref(),
            arguments,
        )
        .await;

        match result {
            Ok(res) => {
                let is_error = res.status >= 400;
                let content = match serde_json::from_str::<Value>(&res.body) {
                    Ok(json) => Content::json(&json).unwrap_or(Content::text(res.body)),
                    Err(_) => Content::text(res.body),
                };
                Ok(CallToolResult {
                    content: vec![content],
                    is_error: Some(is_error),
                })
            }
            Err(e) => Err(mcp_error(e)),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = self
            .0
            .entry
            .registry
            .tools()
            .map(|tool| {
                let schema = tool
                    .input_schema
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
                McpTool::new(tool.name.clone(), tool.description.clone(), schema)
            })
            .collect();
        Ok(ListToolsResult {
            next_cursor: None,
            tools,
        })
    }

    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "Skyline MCP Gateway".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Map a gateway error onto the MCP error codes.
pub fn mcp_error(error: GatewayError) -> McpError {
    let code = match error.json_rpc_code() {
        -32602 => ErrorCode::INVALID_PARAMS,
        -32601 => ErrorCode::METHOD_NOT_FOUND,
        _ => ErrorCode::INTERNAL_ERROR,
    };
    McpError::new(code, error.to_string(), None)
}

type ProfileService = StreamableHttpService<ProfileMcpHandler, LocalSessionManager>;

struct ServiceSlot {
    config_hash: String,
    service: Arc<ProfileService>,
}

/// Per-profile streamable HTTP services.
///
/// A service owns its transport sessions, so it must outlive individual
/// requests; it is rebuilt only when the profile's config hash changes and
/// dropped when the profile is evicted.
#[derive(Default)]
pub struct McpServiceMap {
    services: RwLock<HashMap<String, ServiceSlot>>,
}

impl McpServiceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn service_for(
        &self,
        profile: &str,
        entry: &Arc<CacheEntry>,
        hooks: Arc<dyn ToolCallHooks>,
        tracker: Arc<SessionTracker>,
    ) -> Arc<ProfileService> {
        {
            let services = self.services.read().await;
            if let Some(slot) = services.get(profile) {
                if slot.config_hash == entry.config_hash {
                    return slot.service.clone();
                }
            }
        }

        let mut services = self.services.write().await;
        // Re-check under the write lock; another request may have won.
        if let Some(slot) = services.get(profile) {
            if slot.config_hash == entry.config_hash {
                return slot.service.clone();
            }
        }
        debug!(profile, "building MCP service");
        let profile_name = profile.to_string();
        let entry_for_factory = entry.clone();
        let service = Arc::new(StreamableHttpService::new(
            move || {
                Ok(ProfileMcpHandler::new(
                    profile_name.clone(),
                    entry_for_factory.clone(),
                    hooks.clone(),
                    tracker.clone(),
                ))
            },
            LocalSessionManager::default().into(),
            Default::default(),
        ));
        services.insert(
            profile.to_string(),
            ServiceSlot {
                config_hash: entry.config_hash.clone(),
                service: service.clone(),
            },
        );
        service
    }

    /// Drop the service (and its sessions) for a mutated or deleted profile.
    pub async fn evict(&self, profile: &str) {
        self.services.write().await.remove(profile);
    }
}
