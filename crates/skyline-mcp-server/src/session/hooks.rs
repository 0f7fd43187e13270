//! Tool-call lifecycle hooks.
//!
//! The session layer fires a start and an end hook around every tool call
//! and connect/disconnect hooks around every session. The composite
//! implementation fans out to audit, metrics, the live event hub, and the
//! session tracker in one place, so transports carry a single hook object.
//! Hooks run synchronously on the request path and must not block; a panic
//! inside a hook is contained and logged, never surfaced to the transport.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::error;
use uuid::Uuid;

use super::{SessionInfo, SessionTracker};
use crate::observe::audit::{self, AuditEventType, AuditLog};
use crate::observe::{EventHub, LiveEvent, Metrics};

pub struct ToolCallStart<'a> {
    pub session_id: Uuid,
    pub profile: &'a str,
    pub tool: &'a str,
    pub api_name: &'a str,
    pub arguments: &'a Map<String, Value>,
}

pub struct ToolCallEnd<'a> {
    pub session_id: Uuid,
    pub profile: &'a str,
    pub tool: &'a str,
    pub api_name: &'a str,
    pub client_addr: Option<String>,
    pub duration: Duration,
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub request_size: u64,
    pub response_size: u64,
}

pub trait ToolCallHooks: Send + Sync {
    fn on_start(&self, info: &ToolCallStart<'_>);
    fn on_end(&self, info: &ToolCallEnd<'_>);
    fn on_connect(&self, session: &SessionInfo);
    fn on_disconnect(&self, session: &SessionInfo);
}

/// Run a hook with panic containment. The request path survives any hook.
pub fn contain(name: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(hook = name, "hook panicked; contained");
    }
}

/// The production hook set: audit + metrics + live events + tracker.
pub struct GatewayHooks {
    pub audit: Arc<AuditLog>,
    pub metrics: Arc<Metrics>,
    pub hub: Arc<EventHub>,
    pub tracker: Arc<SessionTracker>,
}

impl ToolCallHooks for GatewayHooks {
    fn on_start(&self, info: &ToolCallStart<'_>) {
        self.tracker.tool_call_started(info.session_id);
        self.hub.publish(LiveEvent::ToolStart {
            session_id: info.session_id.to_string(),
            profile: info.profile.to_string(),
            tool: info.tool.to_string(),
        });
    }

    fn on_end(&self, info: &ToolCallEnd<'_>) {
        self.tracker.tool_call_finished(info.session_id);
        self.metrics
            .record_request(info.profile, info.tool, info.duration, info.success);
        self.audit.append(audit::execute_event(
            info.profile,
            Some(info.api_name.to_string()),
            info.tool,
            None,
            info.duration,
            info.status_code,
            info.success,
            info.error.clone(),
            info.client_addr.clone(),
            info.request_size,
            info.response_size,
        ));
        self.hub.publish(LiveEvent::ToolEnd {
            session_id: info.session_id.to_string(),
            profile: info.profile.to_string(),
            tool: info.tool.to_string(),
            duration_ms: info.duration.as_millis().min(u128::from(u64::MAX)) as u64,
            success: info.success,
        });
    }

    fn on_connect(&self, session: &SessionInfo) {
        self.metrics.connection_opened();
        self.audit.append(audit::session_event(
            &session.profile,
            AuditEventType::Connect,
            session.client_addr.clone(),
        ));
        self.hub.publish(LiveEvent::SessionConnected {
            session_id: session.id.to_string(),
            profile: session.profile.clone(),
            transport: session.transport.clone(),
        });
    }

    fn on_disconnect(&self, session: &SessionInfo) {
        self.metrics.connection_closed();
        self.audit.append(audit::session_event(
            &session.profile,
            AuditEventType::Disconnect,
            session.client_addr.clone(),
        ));
        self.hub.publish(LiveEvent::SessionDisconnected {
            session_id: session.id.to_string(),
            profile: session.profile.clone(),
        });
    }
}
