//! Per-profile artefact cache.
//!
//! Building a profile's registry and executor means fetching and parsing
//! every configured spec, so the result is cached keyed by the SHA-256 of
//! the profile's config YAML. Entries live for a TTL and are evicted on
//! profile mutation. Concurrent misses for the same (name, hash) are
//! single-flighted: one build runs, the rest await its result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use skyline_mcp_registry::{Service, SpecLoader};
use tokio::sync::{RwLock, watch};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::errors::GatewayError;
use crate::executor::Executor;
use crate::observe::Metrics;
use crate::profile::Profile;
use crate::redact::Redactor;
use crate::registry::ToolRegistry;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

pub struct CacheEntry {
    pub services: Vec<Service>,
    pub registry: Arc<ToolRegistry>,
    pub executor: Arc<Executor>,
    pub config_hash: String,
    created_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() <= ttl
    }
}

pub struct ProfileCache {
    ttl: Duration,
    loader: SpecLoader,
    redactor: Arc<Redactor>,
    metrics: Arc<Metrics>,
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    /// In-progress builds keyed by `name:hash`; waiters hold the receiver.
    in_flight: Mutex<HashMap<String, watch::Receiver<()>>>,
}

impl ProfileCache {
    pub fn new(ttl: Duration, redactor: Arc<Redactor>, metrics: Arc<Metrics>) -> Self {
        Self {
            ttl,
            loader: SpecLoader::new(),
            redactor,
            metrics,
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached entry for this profile, building it when missing,
    /// stale, or built from a different config.
    pub async fn get_or_build(
        &self,
        profile: &Profile,
    ) -> Result<Arc<CacheEntry>, GatewayError> {
        let hash = config_hash(&profile.config_yaml);
        let key = format!("{}:{hash}", profile.name);

        loop {
            if let Some(entry) = self.lookup(&profile.name, &hash).await {
                self.metrics.record_cache_hit();
                return Ok(entry);
            }

            enum Claim {
                Build(watch::Sender<()>),
                Wait(watch::Receiver<()>),
            }
            let claim = {
                let mut in_flight = self.in_flight.lock();
                match in_flight.get(&key) {
                    Some(rx) => Claim::Wait(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(());
                        in_flight.insert(key.clone(), rx);
                        Claim::Build(tx)
                    }
                }
            };

            match claim {
                Claim::Wait(mut rx) => {
                    // Wake when the builder finishes (or is dropped), then
                    // re-check the cache.
                    let _ = rx.changed().await;
                }
                Claim::Build(tx) => {
                    let result = self.build(profile, &hash).await;
                    if let Ok(entry) = &result {
                        self.entries
                            .write()
                            .await
                            .insert(profile.name.clone(), entry.clone());
                    }
                    self.in_flight.lock().remove(&key);
                    drop(tx);
                    self.metrics.record_cache_miss();
                    return result;
                }
            }
        }
    }

    async fn lookup(&self, name: &str, hash: &str) -> Option<Arc<CacheEntry>> {
        let entries = self.entries.read().await;
        entries
            .get(name)
            .filter(|entry| entry.config_hash == hash && entry.is_fresh(self.ttl))
            .cloned()
    }

    /// Drop any cached entry for this profile, whatever hash it was built
    /// from. Called on profile upsert and delete.
    pub async fn evict(&self, name: &str) {
        if self.entries.write().await.remove(name).is_some() {
            info!(profile = name, "cache entry evicted");
        }
    }

    /// Names of currently cached profiles, for admin reporting.
    pub async fn cached_profiles(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Circuit-breaker state across every cached profile.
    pub async fn breaker_snapshots(&self) -> Vec<crate::breaker::BreakerSnapshot> {
        self.entries
            .read()
            .await
            .values()
            .flat_map(|entry| entry.executor.breaker_snapshots())
            .collect()
    }

    async fn build(
        &self,
        profile: &Profile,
        hash: &str,
    ) -> Result<Arc<CacheEntry>, GatewayError> {
        let config = profile.config()?;
        config.validate()?;
        self.redactor.register_all(config.secrets());

        let mut services = Vec::new();
        for api in &config.apis {
            match self.loader.load(&api.to_spec_source()).await {
                Ok(service) => services.push(service),
                // One broken API must not take down the profile's other
                // tools; it is logged and skipped.
                Err(e) => {
                    warn!(profile = %profile.name, api = %api.name, "failed to load spec: {e}");
                }
            }
        }

        let registry = Arc::new(ToolRegistry::build(&services));
        let executor = Arc::new(Executor::new(&services, &config, self.redactor.clone())?);
        info!(
            profile = %profile.name,
            services = services.len(),
            tools = registry.len(),
            "profile artefacts built"
        );
        Ok(Arc::new(CacheEntry {
            services,
            registry,
            executor,
            config_hash: hash.to_string(),
            created_at: Instant::now(),
        }))
    }
}

pub fn config_hash(config_yaml: &str) -> String {
    let digest = Sha256::digest(config_yaml.as_bytes());
    hex::encode(digest)
}
