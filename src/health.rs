//! Health and Status Module
//!
//! Read-only status surface for operational probes: liveness of the backing
//! store and a snapshot of the cache counters, individually or combined.

use serde::Serialize;

use crate::cache::{CacheEngine, StatsSnapshot};

// == Health Status ==
/// Liveness classification of the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

// == Health Report ==
/// Result of one liveness probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Probe outcome
    pub status: HealthStatus,
    /// Round-trip latency in milliseconds (present when healthy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Failure description (present when unhealthy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// == Status Report ==
/// Combined health and statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub health: HealthReport,
    pub stats: StatsSnapshot,
}

// == Status Reporter ==
/// Stateless wrapper exposing the engine's health probe and stats as one
/// status surface.
#[derive(Clone)]
pub struct StatusReporter {
    engine: CacheEngine,
}

impl StatusReporter {
    // == Constructor ==
    /// Creates a reporter over the given engine.
    pub fn new(engine: CacheEngine) -> Self {
        Self { engine }
    }

    /// Probes the backing store.
    pub async fn health(&self) -> HealthReport {
        self.engine.health_check().await
    }

    /// Snapshots the cache counters and store introspection.
    pub async fn stats(&self) -> StatsSnapshot {
        self.engine.get_stats().await
    }

    // == Combined Report ==
    /// Runs both probes and returns them as one report.
    pub async fn report(&self) -> StatusReport {
        StatusReport {
            health: self.health().await,
            stats: self.stats().await,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_report_over_live_store() {
        let engine = CacheEngine::new(Arc::new(MemoryStore::new()));
        engine.set("k", &1u64, None).await;
        let _: Option<u64> = engine.get("k").await;

        let reporter = StatusReporter::new(engine);
        let report = reporter.report().await;

        assert_eq!(report.health.status, HealthStatus::Healthy);
        assert_eq!(report.stats.hits, 1);
        assert_eq!(report.stats.total_keys, 1);
    }

    #[test]
    fn test_health_report_serialization() {
        let report = HealthReport {
            status: HealthStatus::Healthy,
            latency_ms: Some(2),
            error: None,
        };
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["status"], "healthy");
        assert_eq!(json["latency_ms"], 2);
        assert!(json.get("error").is_none());
    }
}
