// Health-check fan-out workflow
use crate::adapters::notify::{Notification, Notifier};
use crate::error::PipelineError;
use crate::store::VideoStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    NotConfigured,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::NotConfigured => "not_configured",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub service_name: String,
    pub status: HealthStatus,
    pub latency_ms: Option<i64>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    fn not_configured(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            status: HealthStatus::NotConfigured,
            latency_ms: None,
            error: None,
            checked_at: Utc::now(),
        }
    }
}

/// A reachability probe for one external dependency.
#[async_trait]
pub trait ServiceProbe: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self) -> Result<(), String>;
}

/// Aggregate individual checks into one overall status.
///
/// Services that are not configured are excluded: all remaining healthy →
/// healthy, some healthy → degraded, none healthy → unhealthy. With nothing
/// configured at all, there is nothing to be unhealthy about.
pub fn aggregate(results: &[HealthCheckResult]) -> HealthStatus {
    let considered: Vec<&HealthCheckResult> = results
        .iter()
        .filter(|r| r.status != HealthStatus::NotConfigured)
        .collect();

    if considered.is_empty() {
        return HealthStatus::Healthy;
    }
    let healthy = considered
        .iter()
        .filter(|r| r.status == HealthStatus::Healthy)
        .count();
    if healthy == considered.len() {
        HealthStatus::Healthy
    } else if healthy > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

/// Fan-out workflow: run the three dependency probes concurrently, aggregate,
/// persist all four results in one batch, and alert operators for unhealthy
/// services only.
pub struct HealthCheckWorkflow {
    pub database: Option<Arc<dyn ServiceProbe>>,
    pub storage: Option<Arc<dyn ServiceProbe>>,
    pub generation: Option<Arc<dyn ServiceProbe>>,
    pub store: Arc<dyn VideoStore>,
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl HealthCheckWorkflow {
    pub async fn run(&self) -> Result<HealthCheckResult, PipelineError> {
        info!("🩺 Running health checks");

        // No ordering dependency between the three checks; each is wrapped so
        // one failure never aborts the others.
        let individual = futures::future::join_all([
            run_probe("database", &self.database),
            run_probe("object_storage", &self.storage),
            run_probe("generation", &self.generation),
        ])
        .await;
        let overall_status = aggregate(&individual);
        let overall = HealthCheckResult {
            service_name: "overall".to_string(),
            status: overall_status,
            latency_ms: None,
            error: None,
            checked_at: Utc::now(),
        };

        let mut batch = individual.clone();
        batch.push(overall.clone());
        self.store.save_health_results(&batch).await?;

        for result in &individual {
            if result.status == HealthStatus::Unhealthy {
                warn!(
                    "🚨 Service unhealthy: {} ({})",
                    result.service_name,
                    result.error.as_deref().unwrap_or("no detail")
                );
                if let Some(notifier) = &self.notifier {
                    let notification = Notification::ServiceUnhealthy {
                        service_name: result.service_name.clone(),
                        error: result.error.clone().unwrap_or_default(),
                    };
                    if let Err(e) = notifier.notify(&notification).await {
                        warn!("⚠️ Failed to deliver unhealthy alert: {}", e);
                    }
                }
            }
        }

        info!("🩺 Overall health: {}", overall.status.as_str());
        Ok(overall)
    }
}

async fn run_probe(
    name: &str,
    probe: &Option<Arc<dyn ServiceProbe>>,
) -> HealthCheckResult {
    let Some(probe) = probe else {
        return HealthCheckResult::not_configured(name);
    };

    let started = Instant::now();
    match probe.check().await {
        Ok(()) => HealthCheckResult {
            service_name: name.to_string(),
            status: HealthStatus::Healthy,
            latency_ms: Some(started.elapsed().as_millis() as i64),
            error: None,
            checked_at: Utc::now(),
        },
        Err(e) => HealthCheckResult {
            service_name: name.to_string(),
            status: HealthStatus::Unhealthy,
            latency_ms: Some(started.elapsed().as_millis() as i64),
            error: Some(e),
            checked_at: Utc::now(),
        },
    }
}

/// Probe over the Postgres pool (`SELECT 1`).
pub struct DatabaseProbe {
    pub pool: sqlx::PgPool,
}

#[async_trait]
impl ServiceProbe for DatabaseProbe {
    fn name(&self) -> &str {
        "database"
    }

    async fn check(&self) -> Result<(), String> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| format!("database unreachable: {}", e))
    }
}
