//! Per-component, per-version usage and error counters

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{SecondsFormat, Utc};
#[cfg(test)]
use mockall::automock;
use parking_lot::RwLock;
use serde::Serialize;

use crate::version::error::VersioningError;
use crate::version::semver::{Version, parse_version};

/// Sink for usage and error events raised during dispatch
#[cfg_attr(test, automock)]
pub trait MetricsCollector: Send + Sync {
    fn record_request(&self, component: &str, version: &Version);

    /// Count an error; the error itself is not retained
    fn record_error(&self, component: &str, version: &Version, error: &VersioningError);

    /// Snapshot of one component's counters
    fn metrics(&self, component: &str) -> Option<ComponentMetrics>;

    fn all_metrics(&self) -> HashMap<String, ComponentMetrics>;

    fn usage_stats(&self, component: &str) -> Option<VersionUsageStats> {
        self.metrics(component).map(|metrics| metrics.usage_stats())
    }
}

/// Raw counters for one component, keyed by version string
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComponentMetrics {
    pub component: String,
    pub version_metrics: BTreeMap<String, u64>,
    /// RFC 3339 UTC, seconds precision
    pub last_accessed: BTreeMap<String, String>,
    pub error_counts: BTreeMap<String, u64>,
}

/// Usage summary derived from [`ComponentMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VersionUsageStats {
    pub component: String,
    pub total_requests: u64,
    pub total_errors: u64,
    /// Version -> share of requests in percent
    pub version_breakdown: BTreeMap<String, f64>,
    pub error_rate: f64,
    pub most_used_version: Option<String>,
    pub least_used_version: Option<String>,
    /// Deprecated version -> request count
    pub deprecated_usage: BTreeMap<String, u64>,
    pub last_activity: Option<String>,
}

impl ComponentMetrics {
    fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            ..Default::default()
        }
    }

    pub fn usage_stats(&self) -> VersionUsageStats {
        let total_requests: u64 = self.version_metrics.values().sum();
        let total_errors: u64 = self.error_counts.values().sum();

        let error_rate = if total_requests > 0 {
            total_errors as f64 / total_requests as f64
        } else {
            0.0
        };

        let version_breakdown = if total_requests > 0 {
            self.version_metrics
                .iter()
                .map(|(version, count)| {
                    (
                        version.clone(),
                        *count as f64 / total_requests as f64 * 100.0,
                    )
                })
                .collect()
        } else {
            BTreeMap::new()
        };

        // Equal counts: the higher version is "most used", the lower "least used"
        let most_used_version = self
            .version_metrics
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| compare_keys(a.0, b.0)))
            .map(|(version, _)| version.clone());
        let least_used_version = self
            .version_metrics
            .iter()
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| compare_keys(a.0, b.0)))
            .map(|(version, _)| version.clone());

        // Fixed-width timestamps sort chronologically as strings
        let last_activity = self.last_accessed.values().max().cloned();

        VersionUsageStats {
            component: self.component.clone(),
            total_requests,
            total_errors,
            version_breakdown,
            error_rate,
            most_used_version,
            least_used_version,
            deprecated_usage: BTreeMap::new(),
            last_activity,
        }
    }
}

fn compare_keys(a: &str, b: &str) -> Ordering {
    let (va, vb) = (parse_version(a), parse_version(b));
    va.compare(&vb)
        .then_with(|| va.compare_precedence(&vb))
        .then_with(|| a.cmp(b))
}

/// In-memory collector guarded by a reader/writer lock
#[derive(Debug, Default)]
pub struct DefaultMetricsCollector {
    metrics: RwLock<HashMap<String, ComponentMetrics>>,
}

impl DefaultMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all counters
    pub fn reset(&self) {
        self.metrics.write().clear();
    }

    pub fn reset_component(&self, component: &str) {
        self.metrics.write().remove(component);
    }

    pub fn all_usage_stats(&self) -> HashMap<String, VersionUsageStats> {
        self.metrics
            .read()
            .iter()
            .map(|(name, metrics)| (name.clone(), metrics.usage_stats()))
            .collect()
    }
}

impl MetricsCollector for DefaultMetricsCollector {
    fn record_request(&self, component: &str, version: &Version) {
        let key = version.to_string();
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut metrics = self.metrics.write();
        let entry = metrics
            .entry(component.to_string())
            .or_insert_with(|| ComponentMetrics::new(component));
        *entry.version_metrics.entry(key.clone()).or_default() += 1;
        entry.last_accessed.insert(key, now);
    }

    fn record_error(&self, component: &str, version: &Version, _error: &VersioningError) {
        let mut metrics = self.metrics.write();
        let entry = metrics
            .entry(component.to_string())
            .or_insert_with(|| ComponentMetrics::new(component));
        *entry.error_counts.entry(version.to_string()).or_default() += 1;
    }

    fn metrics(&self, component: &str) -> Option<ComponentMetrics> {
        self.metrics.read().get(component).cloned()
    }

    fn all_metrics(&self) -> HashMap<String, ComponentMetrics> {
        self.metrics.read().clone()
    }
}
