//! Metrics collection and Prometheus text exposition.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::warn;

/// Fixed histogram buckets for call durations, in milliseconds.
const DURATION_BUCKETS_MS: [u64; 10] = [10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000];

pub struct Metrics {
    started_at: Instant,
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_connections: AtomicU64,
    active_connections: AtomicI64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    per_profile: RwLock<BTreeMap<String, u64>>,
    per_tool: RwLock<BTreeMap<String, u64>>,
    duration: Histogram,
}

struct Histogram {
    buckets: [AtomicU64; DURATION_BUCKETS_MS.len()],
    sum_ms: AtomicU64,
    count: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicI64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            per_profile: RwLock::new(BTreeMap::new()),
            per_tool: RwLock::new(BTreeMap::new()),
            duration: Histogram {
                buckets: Default::default(),
                sum_ms: AtomicU64::new(0),
                count: AtomicU64::new(0),
            },
        }
    }

    pub fn record_request(&self, profile: &str, tool: &str, duration: Duration, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        *self.per_profile.write().entry(profile.to_string()).or_default() += 1;
        *self.per_tool.write().entry(tool.to_string()).or_default() += 1;
        self.duration.record(duration);
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Render the Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();

        let counter = |out: &mut String, name: &str, help: &str, value: u64| {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        };

        counter(
            &mut out,
            "skyline_requests_total",
            "Total tool call requests",
            self.total_requests.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "skyline_requests_success_total",
            "Successful tool call requests",
            self.successful_requests.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "skyline_requests_failed_total",
            "Failed tool call requests",
            self.failed_requests.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "skyline_connections_total",
            "Total client connections",
            self.total_connections.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "skyline_cache_hits_total",
            "Profile cache hits",
            self.cache_hits.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "skyline_cache_misses_total",
            "Profile cache misses",
            self.cache_misses.load(Ordering::Relaxed),
        );

        out.push_str("# HELP skyline_connections_active Currently open client connections\n");
        out.push_str("# TYPE skyline_connections_active gauge\n");
        out.push_str(&format!(
            "skyline_connections_active {}\n",
            self.active_connections.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP skyline_uptime_seconds Seconds since server start\n");
        out.push_str("# TYPE skyline_uptime_seconds gauge\n");
        out.push_str(&format!(
            "skyline_uptime_seconds {}\n",
            self.uptime().as_secs()
        ));

        out.push_str(
            "# HELP skyline_requests_by_profile_total Tool call requests per profile\n",
        );
        out.push_str("# TYPE skyline_requests_by_profile_total counter\n");
        for (profile, count) in self.per_profile.read().iter() {
            out.push_str(&format!(
                "skyline_requests_by_profile_total{{profile=\"{profile}\"}} {count}\n"
            ));
        }

        out.push_str("# HELP skyline_requests_by_tool_total Tool call requests per tool\n");
        out.push_str("# TYPE skyline_requests_by_tool_total counter\n");
        for (tool, count) in self.per_tool.read().iter() {
            out.push_str(&format!(
                "skyline_requests_by_tool_total{{tool=\"{tool}\"}} {count}\n"
            ));
        }

        out.push_str(
            "# HELP skyline_call_duration_milliseconds Tool call duration distribution\n",
        );
        out.push_str("# TYPE skyline_call_duration_milliseconds histogram\n");
        let mut cumulative = 0u64;
        for (le, bucket) in DURATION_BUCKETS_MS.iter().zip(self.duration.buckets.iter()) {
            cumulative += bucket.load(Ordering::Relaxed);
            out.push_str(&format!(
                "skyline_call_duration_milliseconds_bucket{{le=\"{le}\"}} {cumulative}\n"
            ));
        }
        let count = self.duration.count.load(Ordering::Relaxed);
        out.push_str(&format!(
            "skyline_call_duration_milliseconds_bucket{{le=\"+Inf\"}} {count}\n"
        ));
        out.push_str(&format!(
            "skyline_call_duration_milliseconds_sum {}\n",
            self.duration.sum_ms.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "skyline_call_duration_milliseconds_count {count}\n"
        ));

        out
    }

    /// Push the rendered text to a remote-write endpoint at a fixed
    /// interval. Runs until the task is dropped.
    pub async fn push_loop(&self, endpoint: url::Url, interval: Duration) {
        let client = reqwest::Client::new();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let body = self.render_prometheus();
            if let Err(e) = client.post(endpoint.clone()).body(body).send().await {
                warn!("metrics push failed: {e}");
            }
        }
    }
}

impl Histogram {
    fn record(&self, duration: Duration) {
        let ms = duration.as_millis().min(u128::from(u64::MAX)) as u64;
        self.sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        for (le, bucket) in DURATION_BUCKETS_MS.iter().zip(self.buckets.iter()) {
            if ms <= *le {
                bucket.fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }
}
