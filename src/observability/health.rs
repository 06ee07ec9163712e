use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::idempotency::storage::KeyValueCache;

/// Latency above which a reachable cache is reported as degraded.
const CACHE_LATENCY_THRESHOLD_MS: f64 = 50.0;

/// Health status of a service or dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy)
    }
}

/// Health status of a single dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthStatus,
    pub latency_ms: Option<f64>,
    pub message: Option<String>,
}

impl DependencyHealth {
    pub fn healthy(name: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            latency_ms: Some(latency_ms),
            message: None,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            latency_ms: None,
            message: Some(message.into()),
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(message.into()),
        }
    }
}

/// Aggregated health check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedHealth {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: Vec<DependencyHealth>,
}

impl AggregatedHealth {
    pub fn new(version: String, uptime_seconds: u64, dependencies: Vec<DependencyHealth>) -> Self {
        let status = Self::aggregate_status(&dependencies);
        Self {
            status,
            version,
            uptime_seconds,
            dependencies,
        }
    }

    fn aggregate_status(dependencies: &[DependencyHealth]) -> HealthStatus {
        let has_unhealthy = dependencies.iter().any(|d| d.status.is_unhealthy());
        let has_degraded = dependencies.iter().any(|d| d.status.is_degraded());

        if has_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Health checker for the idempotency cache backend.
///
/// An unreachable cache only disables replay protection, so it is reported
/// as degraded rather than unhealthy.
pub struct HealthChecker {
    cache: Arc<dyn KeyValueCache>,
    start_time: std::time::Instant,
}

impl HealthChecker {
    pub fn new(cache: Arc<dyn KeyValueCache>) -> Self {
        Self {
            cache,
            start_time: std::time::Instant::now(),
        }
    }

    /// Performs a full health check of all dependencies.
    pub async fn check_all(&self) -> AggregatedHealth {
        let dependencies = vec![self.check_cache().await];

        AggregatedHealth::new(
            env!("CARGO_PKG_VERSION").to_string(),
            self.uptime_seconds(),
            dependencies,
        )
    }

    /// Checks cache connectivity.
    pub async fn check_cache(&self) -> DependencyHealth {
        let name = format!("cache:{}", self.cache.name());
        let start = std::time::Instant::now();

        match tokio::time::timeout(Duration::from_secs(5), self.cache.ping()).await {
            Ok(Ok(())) => {
                let latency = start.elapsed().as_secs_f64() * 1000.0;
                if latency > CACHE_LATENCY_THRESHOLD_MS {
                    DependencyHealth {
                        name,
                        status: HealthStatus::Degraded,
                        latency_ms: Some(latency),
                        message: Some("High latency detected".to_string()),
                    }
                } else {
                    DependencyHealth::healthy(name, latency)
                }
            }
            Ok(Err(e)) => DependencyHealth::degraded(name, format!("PING failed: {}", e)),
            Err(_) => DependencyHealth::degraded(name, "PING timeout"),
        }
    }

    /// Returns uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
