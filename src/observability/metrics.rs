use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Process-wide execution metrics. Counter updates are single-word atomics;
/// the maps shard their locks, so recording from concurrent invocations is
/// cheap and never blocks an executor for long.
#[derive(Default)]
pub struct MetricsRegistry {
    /// Completed invocations per component
    invocations: DashMap<String, AtomicU64>,
    /// Dispatch attempts per component, including retries
    attempts: DashMap<String, AtomicU64>,
    /// Errors keyed by (component, platform, error kind)
    errors: DashMap<(String, String, &'static str), AtomicU64>,
    /// Duration aggregates per component
    durations: DashMap<String, DurationAggregate>,
    /// Successful computations whose lineage vertex could not be written
    lineage_loss: AtomicU64,
}

#[derive(Default)]
struct DurationAggregate {
    count: AtomicU64,
    total_micros: AtomicU64,
    max_micros: AtomicU64,
}

/// Point-in-time copy of the registry for summaries and assertions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub invocations: Vec<(String, u64)>,
    pub attempts: Vec<(String, u64)>,
    pub errors: Vec<(String, String, &'static str, u64)>,
    pub lineage_loss: u64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_invocation(&self, component: &str, duration: Duration) {
        bump(&self.invocations, component.to_string());

        let aggregate = self
            .durations
            .entry(component.to_string())
            .or_default();
        let micros = duration.as_micros() as u64;
        aggregate.count.fetch_add(1, Ordering::Relaxed);
        aggregate.total_micros.fetch_add(micros, Ordering::Relaxed);
        aggregate.max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn record_attempt(&self, component: &str) {
        bump(&self.attempts, component.to_string());
    }

    pub fn record_error(&self, component: &str, platform: &str, kind: &'static str) {
        bump(
            &self.errors,
            (component.to_string(), platform.to_string(), kind),
        );
    }

    pub fn record_lineage_loss(&self) {
        self.lineage_loss.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invocation_count(&self, component: &str) -> u64 {
        read(&self.invocations, component)
    }

    pub fn attempt_count(&self, component: &str) -> u64 {
        read(&self.attempts, component)
    }

    pub fn error_count(&self, component: &str, platform: &str, kind: &'static str) -> u64 {
        self.errors
            .get(&(component.to_string(), platform.to_string(), kind))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn lineage_loss_count(&self) -> u64 {
        self.lineage_loss.load(Ordering::Relaxed)
    }

    pub fn mean_duration(&self, component: &str) -> Option<Duration> {
        self.durations.get(component).and_then(|agg| {
            let count = agg.count.load(Ordering::Relaxed);
            if count == 0 {
                None
            } else {
                Some(Duration::from_micros(
                    agg.total_micros.load(Ordering::Relaxed) / count,
                ))
            }
        })
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot {
            invocations: collect(&self.invocations),
            attempts: collect(&self.attempts),
            errors: self
                .errors
                .iter()
                .map(|entry| {
                    let (component, platform, kind) = entry.key().clone();
                    (component, platform, kind, entry.value().load(Ordering::Relaxed))
                })
                .collect(),
            lineage_loss: self.lineage_loss.load(Ordering::Relaxed),
        };
        snapshot.invocations.sort();
        snapshot.attempts.sort();
        snapshot.errors.sort();
        snapshot
    }
}

fn bump<K: std::hash::Hash + Eq>(map: &DashMap<K, AtomicU64>, key: K) {
    map.entry(key)
        .or_insert_with(|| AtomicU64::new(0))
        .fetch_add(1, Ordering::Relaxed);
}

fn read(map: &DashMap<String, AtomicU64>, key: &str) -> u64 {
    map.get(key).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
}

fn collect(map: &DashMap<String, AtomicU64>) -> Vec<(String, u64)> {
    map.iter()
        .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
        .collect()
}

static GLOBAL_METRICS: OnceCell<Arc<MetricsRegistry>> = OnceCell::new();

/// The process-wide registry. Runners take an explicit `Arc` so tests can
/// isolate their own; this is the shared default.
pub fn global_metrics() -> Arc<MetricsRegistry> {
    GLOBAL_METRICS
        .get_or_init(|| Arc::new(MetricsRegistry::new()))
        .clone()
}
