//! Audit log.
//!
//! Events buffer in memory (bounded) and flush in batches: every five
//! seconds in the background, immediately when the buffer fills, and once
//! more on shutdown. The flushed store is queryable and drives the admin
//! aggregations. When a file path is configured, batches also append to a
//! JSON-lines file.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

/// Flush when the buffer reaches this many entries.
const BUFFER_LIMIT: usize = 100;

/// Background flush interval.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Cap on the queryable in-memory store; oldest entries fall off.
const STORE_LIMIT: usize = 10_000;

/// How many entries the top-N aggregations report.
const TOP_N: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Execute,
    Connect,
    Disconnect,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub profile: String,
    pub event_type: AuditEventType,
    pub api_name: Option<String>,
    pub tool_name: Option<String>,
    pub arguments: Option<Value>,
    pub duration_ms: u64,
    pub status_code: Option<u16>,
    pub success: bool,
    pub error: Option<String>,
    pub client_addr: Option<String>,
    pub request_size: u64,
    pub response_size: u64,
}

/// Filters for audit queries; unset fields match everything.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AuditQuery {
    pub profile: Option<String>,
    pub event_type: Option<AuditEventType>,
    pub api_name: Option<String>,
    pub tool_name: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Serialize)]
pub struct AuditStats {
    pub total_events: u64,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub calls_by_profile: BTreeMap<String, u64>,
    pub calls_by_tool: BTreeMap<String, u64>,
    pub latency_min_ms: u64,
    pub latency_avg_ms: u64,
    pub latency_max_ms: u64,
    pub request_bytes: u64,
    pub response_bytes: u64,
    pub top_tools_by_calls: Vec<(String, u64)>,
    pub top_tools_by_errors: Vec<(String, u64)>,
}

pub struct AuditLog {
    buffer: Mutex<Vec<AuditEvent>>,
    store: RwLock<Vec<AuditEvent>>,
    file: Option<PathBuf>,
}

impl AuditLog {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(BUFFER_LIMIT)),
            store: RwLock::new(Vec::new()),
            file,
        }
    }

    /// Append one event. Never blocks on I/O: a full buffer is swapped out
    /// under the lock and inserted as a batch.
    pub fn append(&self, event: AuditEvent) {
        let batch = {
            let mut buffer = self.buffer.lock();
            buffer.push(event);
            if buffer.len() >= BUFFER_LIMIT {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };
        if let Some(batch) = batch {
            self.insert_batch(batch);
        }
    }

    /// Flush whatever is buffered.
    pub fn flush(&self) {
        let batch = std::mem::take(&mut *self.buffer.lock());
        if !batch.is_empty() {
            self.insert_batch(batch);
        }
    }

    /// Spawn the 5-second background flusher. The task exits when the log
    /// is dropped.
    pub fn spawn_flusher(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(log) => log.flush(),
                    None => break,
                }
            }
        })
    }

    fn insert_batch(&self, batch: Vec<AuditEvent>) {
        if let Some(path) = &self.file {
            let mut lines = String::new();
            for event in &batch {
                match serde_json::to_string(event) {
                    Ok(line) => {
                        lines.push_str(&line);
                        lines.push('\n');
                    }
                    Err(e) => warn!("failed to encode audit event: {e}"),
                }
            }
            if let Err(e) = append_file(path, &lines) {
                warn!(path = %path.display(), "failed to append audit batch: {e}");
            }
        }
        let mut store = self.store.write();
        store.extend(batch);
        if store.len() > STORE_LIMIT {
            let excess = store.len() - STORE_LIMIT;
            store.drain(..excess);
        }
    }

    /// Query flushed events, newest first.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        let store = self.store.read();
        let mut matches: Vec<AuditEvent> = store
            .iter()
            .filter(|event| {
                query.profile.as_deref().is_none_or(|p| event.profile == p)
                    && query.event_type.is_none_or(|t| event.event_type == t)
                    && query
                        .api_name
                        .as_deref()
                        .is_none_or(|a| event.api_name.as_deref() == Some(a))
                    && query
                        .tool_name
                        .as_deref()
                        .is_none_or(|t| event.tool_name.as_deref() == Some(t))
                    && query.since.is_none_or(|s| event.timestamp >= s)
                    && query.until.is_none_or(|u| event.timestamp <= u)
                    && query.success.is_none_or(|s| event.success == s)
            })
            .cloned()
            .collect();
        matches.reverse();
        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }
        matches
    }

    /// Aggregations over every flushed event.
    pub fn stats(&self) -> AuditStats {
        let store = self.store.read();
        let mut stats = AuditStats {
            total_events: store.len() as u64,
            latency_min_ms: u64::MAX,
            ..Default::default()
        };
        let mut latency_sum = 0u64;
        let mut errors_by_tool: BTreeMap<String, u64> = BTreeMap::new();

        for event in store.iter() {
            stats.request_bytes += event.request_size;
            stats.response_bytes += event.response_size;
            if event.event_type != AuditEventType::Execute {
                continue;
            }
            stats.total_calls += 1;
            if event.success {
                stats.successful_calls += 1;
            } else {
                stats.failed_calls += 1;
                if let Some(tool) = &event.tool_name {
                    *errors_by_tool.entry(tool.clone()).or_default() += 1;
                }
            }
            *stats.calls_by_profile.entry(event.profile.clone()).or_default() += 1;
            if let Some(tool) = &event.tool_name {
                *stats.calls_by_tool.entry(tool.clone()).or_default() += 1;
            }
            latency_sum += event.duration_ms;
            stats.latency_min_ms = stats.latency_min_ms.min(event.duration_ms);
            stats.latency_max_ms = stats.latency_max_ms.max(event.duration_ms);
        }

        if stats.total_calls > 0 {
            stats.latency_avg_ms = latency_sum / stats.total_calls;
        } else {
            stats.latency_min_ms = 0;
        }

        stats.top_tools_by_calls = top_n(&stats.calls_by_tool);
        stats.top_tools_by_errors = top_n(&errors_by_tool);
        stats
    }
}

fn top_n(counts: &BTreeMap<String, u64>) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> =
        counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(TOP_N);
    entries
}

fn append_file(path: &std::path::Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

/// Convenience constructor for execute events.
#[allow(clippy::too_many_arguments)]
pub fn execute_event(
    profile: &str,
    api_name: Option<String>,
    tool_name: &str,
    arguments: Option<Value>,
    duration: Duration,
    status_code: Option<u16>,
    success: bool,
    error: Option<String>,
    client_addr: Option<String>,
    request_size: u64,
    response_size: u64,
) -> AuditEvent {
    AuditEvent {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        profile: profile.to_string(),
        event_type: AuditEventType::Execute,
        api_name,
        tool_name: Some(tool_name.to_string()),
        arguments,
        duration_ms: duration.as_millis().min(u128::from(u64::MAX)) as u64,
        status_code,
        success,
        error,
        client_addr,
        request_size,
        response_size,
    }
}

/// Convenience constructor for session lifecycle events.
pub fn session_event(
    profile: &str,
    event_type: AuditEventType,
    client_addr: Option<String>,
) -> AuditEvent {
    AuditEvent {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        profile: profile.to_string(),
        event_type,
        api_name: None,
        tool_name: None,
        arguments: None,
        duration_ms: 0,
        status_code: None,
        success: true,
        error: None,
        client_addr,
        request_size: 0,
        response_size: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(profile: &str, tool: &str, success: bool, duration_ms: u64) -> AuditEvent {
        execute_event(
            profile,
            Some("api".into()),
            tool,
            None,
            Duration::from_millis(duration_ms),
            Some(if success { 200 } else { 500 }),
            success,
            (!success).then(|| "boom".to_string()),
            None,
            10,
            20,
        )
    }

    #[test]
    fn full_buffer_forces_a_flush() {
        let log = AuditLog::new(None);
        for n in 0..BUFFER_LIMIT {
            log.append(call("p", &format!("t{n}"), true, 1));
        }
        // The batch insert happened without an explicit flush.
        assert_eq!(log.query(&AuditQuery::default()).len(), BUFFER_LIMIT);
    }

    #[test]
    fn queries_filter_and_order_newest_first() {
        let log = AuditLog::new(None);
        log.append(call("a", "tool_one", true, 5));
        log.append(call("a", "tool_two", false, 9));
        log.append(call("b", "tool_one", true, 7));
        log.flush();

        let for_a = log.query(&AuditQuery {
            profile: Some("a".into()),
            ..Default::default()
        });
        assert_eq!(for_a.len(), 2);
        assert_eq!(for_a[0].tool_name.as_deref(), Some("tool_two"));

        let failures = log.query(&AuditQuery {
            success: Some(false),
            ..Default::default()
        });
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn stats_aggregate_latency_and_top_tools() {
        let log = AuditLog::new(None);
        log.append(call("a", "hot", true, 10));
        log.append(call("a", "hot", true, 30));
        log.append(call("a", "cold", false, 50));
        log.flush();

        let stats = log.stats();
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.successful_calls, 2);
        assert_eq!(stats.failed_calls, 1);
        assert_eq!(stats.latency_min_ms, 10);
        assert_eq!(stats.latency_avg_ms, 30);
        assert_eq!(stats.latency_max_ms, 50);
        assert_eq!(stats.request_bytes, 30);
        assert_eq!(stats.top_tools_by_calls[0], ("hot".to_string(), 2));
        assert_eq!(stats.top_tools_by_errors[0], ("cold".to_string(), 1));
    }

    #[tokio::test(start_paused = true)]
    async fn background_flusher_drains_the_buffer() {
        let log = Arc::new(AuditLog::new(None));
        let _task = log.spawn_flusher();
        log.append(call("p", "t", true, 1));
        assert!(log.query(&AuditQuery::default()).is_empty());

        tokio::time::sleep(FLUSH_INTERVAL + Duration::from_millis(100)).await;
        assert_eq!(log.query(&AuditQuery::default()).len(), 1);
    }

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::new(Some(path.clone()));
        log.append(call("p", "t", true, 1));
        log.flush();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        let event: AuditEvent = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(event.profile, "p");
    }
}
