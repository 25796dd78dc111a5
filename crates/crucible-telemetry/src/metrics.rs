use ahash::AHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// A label set is a sorted list of key=value pairs, used to distinguish
/// counter families (e.g. per-language execution counts).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut v: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        Self(v)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Format labels as `{key="value",key2="value2"}` for Prometheus output.
    pub fn prometheus_str(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let inner: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect();
        format!("{{{}}}", inner.join(","))
    }
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

/// Counter names used by the session drivers.
pub const INTERP_EXECUTIONS_TOTAL: &str = "interp_executions_total";
pub const INTERP_RESTARTS_TOTAL: &str = "interp_restarts_total";
pub const SHELL_COMMANDS_TOTAL: &str = "shell_commands_total";
pub const SHELL_TIMEOUTS_TOTAL: &str = "shell_timeouts_total";

/// Thread-safe counter collector (`RwLock` for dynamic registration,
/// `AtomicU64` for values).
#[derive(Debug, Default)]
pub struct MetricsCollector {
    counters: RwLock<AHashMap<(String, Labels), AtomicU64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by 1.
    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_counter_by(name, labels, 1);
    }

    /// Increment a counter by an arbitrary amount.
    pub fn increment_counter_by(&self, name: &str, labels: &[(&str, &str)], amount: u64) {
        let key = (name.to_string(), Labels::new(labels));
        // Fast-path: read lock
        {
            let map = self.counters.read().unwrap_or_else(|e| e.into_inner());
            if let Some(c) = map.get(&key) {
                c.fetch_add(amount, Ordering::Relaxed);
                return;
            }
        }
        // Slow-path: write lock to insert
        let mut map = self.counters.write().unwrap_or_else(|e| e.into_inner());
        let c = map.entry(key).or_insert_with(|| AtomicU64::new(0));
        c.fetch_add(amount, Ordering::Relaxed);
    }

    /// Get the current value of a counter.
    pub fn get_counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = (name.to_string(), Labels::new(labels));
        let map = self.counters.read().unwrap_or_else(|e| e.into_inner());
        map.get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Export all counters in Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();
        let map = self.counters.read().unwrap_or_else(|e| e.into_inner());

        let mut grouped: AHashMap<&str, Vec<(&Labels, u64)>> = AHashMap::new();
        for ((name, labels), val) in map.iter() {
            let v = val.load(Ordering::Relaxed);
            grouped.entry(name.as_str()).or_default().push((labels, v));
        }
        let mut names: Vec<&&str> = grouped.keys().collect();
        names.sort();
        for name in names {
            out.push_str(&format!("# TYPE {} counter\n", name));
            for (labels, value) in &grouped[name] {
                out.push_str(&format!("{}{} {}\n", name, labels.prometheus_str(), value));
            }
        }
        out
    }
}

/// The process-wide collector used by the session drivers.
pub fn global() -> &'static MetricsCollector {
    static COLLECTOR: OnceLock<MetricsCollector> = OnceLock::new();
    COLLECTOR.get_or_init(MetricsCollector::new)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
