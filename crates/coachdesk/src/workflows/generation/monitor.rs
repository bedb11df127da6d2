//! Advisory queue health. Reads counters only and never touches job state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, warn};

use super::clock::{offset, Clock};
use super::domain::JobCounts;
use super::store::{JobStore, StoreError};
use crate::config::MonitorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    BackedUp,
    HighFailureRate,
    Stalled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthIssue {
    pub kind: IssueKind,
    pub severity: HealthStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<HealthIssue>,
    pub counts: JobCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_rate: Option<f64>,
    pub checked_at: DateTime<Utc>,
}

pub struct QueueMonitor<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
}

impl<S> QueueMonitor<S>
where
    S: JobStore + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: MonitorConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn check_health(&self) -> Result<HealthReport, StoreError> {
        let now = self.clock.now();
        let counts = self.store.counts(now)?;
        let window_start = now
            .checked_sub_signed(offset(self.config.failure_window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let tally = self.store.outcomes_since(window_start)?;

        let mut issues = Vec::new();

        let backlog = counts.pending + counts.retrying;
        let high_water = self.config.backlog_high_water;
        if backlog > high_water {
            let severity = if backlog > high_water.saturating_mul(2) {
                HealthStatus::Critical
            } else {
                HealthStatus::Warning
            };
            issues.push(HealthIssue {
                kind: IssueKind::BackedUp,
                severity,
                message: format!("{backlog} jobs waiting (high-water mark {high_water})"),
            });
        }

        let failure_rate = tally.failure_rate();
        if let Some(rate) = failure_rate.filter(|_| tally.total() >= self.config.min_sample) {
            let threshold = self.config.failure_rate_threshold;
            if rate > threshold {
                let severity = if rate >= 1.0 || rate > threshold * 2.0 {
                    HealthStatus::Critical
                } else {
                    HealthStatus::Warning
                };
                issues.push(HealthIssue {
                    kind: IssueKind::HighFailureRate,
                    severity,
                    message: format!(
                        "{} of {} recent jobs failed ({:.0}%)",
                        tally.failed,
                        tally.total(),
                        rate * 100.0
                    ),
                });
            }
        }

        if counts.pending > 0 && counts.active == 0 {
            if let Some(since) = counts.oldest_pending_since {
                let waited = now.signed_duration_since(since);
                if waited > offset(self.config.stall_grace) {
                    issues.push(HealthIssue {
                        kind: IssueKind::Stalled,
                        severity: HealthStatus::Critical,
                        message: format!(
                            "{} jobs pending with no active worker for {}s",
                            counts.pending,
                            waited.num_seconds()
                        ),
                    });
                }
            }
        }

        let status = issues
            .iter()
            .map(|issue| issue.severity)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        Ok(HealthReport {
            status,
            issues,
            counts,
            failure_rate,
            checked_at: now,
        })
    }
}

/// Check health on a fixed cadence and log anything that is not healthy.
pub async fn run_periodic<S>(monitor: Arc<QueueMonitor<S>>, mut shutdown: watch::Receiver<bool>)
where
    S: JobStore + 'static,
{
    let period = monitor.config.check_interval.max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => log_report(&monitor),
        }
    }
}

fn log_report<S>(monitor: &QueueMonitor<S>)
where
    S: JobStore + 'static,
{
    match monitor.check_health() {
        Ok(report) => {
            for issue in &report.issues {
                match issue.severity {
                    HealthStatus::Critical => error!(
                        kind = ?issue.kind,
                        detail = %issue.message,
                        "generation queue critical"
                    ),
                    HealthStatus::Warning => warn!(
                        kind = ?issue.kind,
                        detail = %issue.message,
                        "generation queue degraded"
                    ),
                    HealthStatus::Healthy => {}
                }
            }
        }
        Err(err) => error!(error = %err, "queue health check failed"),
    }
}
