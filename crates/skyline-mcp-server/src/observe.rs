//! Observability sinks: audit log, metrics collector, live event hub.

pub mod audit;
pub mod hub;
pub mod metrics;

pub use audit::{AuditEvent, AuditEventType, AuditLog, AuditQuery};
pub use hub::{EventHub, LiveEvent};
pub use metrics::Metrics;
