//! C4 Health Monitor — periodic scan of active servers, the hysteresis state
//! machine over `health_status`, and auto-deregistration.
//!
//! Task shape follows the teacher's periodic-worker idiom: a
//! `tokio::select!` over an interval tick and a cancellation token, with an
//! `AtomicBool` guard against double-start.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::GatewayError;
use crate::registry::{HealthStatus, Patch, Registry, ServerRecord};
use crate::upstream::probe;

/// Demotes a server after a `PreResponseFailure` observed by the request
/// handler (C7) — same hysteresis/auto-deregister threshold as the monitor,
/// but `last_checked_at`/`last_latency_ms` are left untouched since no probe
/// ran (spec.md §4.7 "Server demotion on PreResponseFailure").
pub async fn demote(
    registry: &dyn Registry,
    id: &str,
    max_consecutive_failures: u32,
    auto_deregister: bool,
) -> Result<ServerRecord, GatewayError> {
    let current = registry.get(id)?;
    let patch = Patch {
        health_status: Some(HealthStatus::Unhealthy),
        consecutive_failures: Some(current.consecutive_failures + 1),
        ..Default::default()
    };
    let updated = registry.patch(id, patch).await?;
    if auto_deregister && updated.consecutive_failures >= max_consecutive_failures {
        registry.soft_delete(id).await?;
        crate::controller::metrics::inc_auto_deregistration();
        tracing::error!(
            component = "request_handler",
            registration_id = id,
            consecutive_failures = updated.consecutive_failures,
            "auto-deregistered after consecutive failures"
        );
    }
    Ok(updated)
}

/// Marks a server healthy after a successful forward (spec.md §4.7 step 4c/4d):
/// a 2xx buffered response, or a streaming response that drained cleanly.
pub async fn mark_success(registry: &dyn Registry, id: &str) -> Result<ServerRecord, GatewayError> {
    registry
        .patch(
            id,
            Patch {
                health_status: Some(HealthStatus::Healthy),
                consecutive_failures: Some(0),
                last_checked_at: Some(Some(crate::registry::now_unix())),
                ..Default::default()
            },
        )
        .await
}

pub struct HealthMonitor {
    registry: Arc<dyn Registry>,
    client: crate::http::client::HyperClient,
    interval: Duration,
    probe_timeout: Duration,
    max_consecutive_failures: u32,
    auto_deregister: bool,
    started: AtomicBool,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<dyn Registry>,
        client: crate::http::client::HyperClient,
        interval: Duration,
        probe_timeout: Duration,
        max_consecutive_failures: u32,
        auto_deregister: bool,
    ) -> Self {
        Self {
            registry,
            client,
            interval,
            probe_timeout,
            max_consecutive_failures,
            auto_deregister,
            started: AtomicBool::new(false),
        }
    }

    /// Spawns the monitor loop. Calling this more than once is a no-op: the
    /// task must run exactly once for the life of the process.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return tokio::spawn(async {});
        }
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(component = "health_monitor", "shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.run_cycle(&cancel).await;
                }
            }
        }
    }

    async fn run_cycle(&self, cancel: &CancellationToken) {
        let snapshot = self.registry.list(&crate::registry::ListFilter {
            model_name: None,
            health_status: None,
            include_inactive: false,
        });
        tracing::debug!(component = "health_monitor", servers = snapshot.len(), "cycle start");

        for record in snapshot {
            if cancel.is_cancelled() {
                tracing::info!(component = "health_monitor", "draining: cycle interrupted by shutdown");
                return;
            }
            self.check_one(&record.registration_id, &record.endpoint_url, record.backend_api_key.as_deref(), record.consecutive_failures).await;
        }
    }

    async fn check_one(&self, registration_id: &str, endpoint_url: &str, backend_api_key: Option<&str>, current_failures: u32) {
        let result = probe::probe(&self.client, endpoint_url, self.probe_timeout, backend_api_key).await;

        let patch = if result.ok {
            Patch {
                health_status: Some(HealthStatus::Healthy),
                consecutive_failures: Some(0),
                last_checked_at: Some(Some(crate::registry::now_unix())),
                last_latency_ms: Some(Some(result.latency_ms)),
                ..Default::default()
            }
        } else {
            Patch {
                health_status: Some(HealthStatus::Unhealthy),
                consecutive_failures: Some(current_failures + 1),
                last_checked_at: Some(Some(crate::registry::now_unix())),
                ..Default::default()
            }
        };

        match self.registry.patch(registration_id, patch).await {
            Ok(updated) => {
                if !result.ok {
                    tracing::warn!(
                        component = "health_monitor",
                        registration_id,
                        error = result.error.as_deref().unwrap_or(""),
                        consecutive_failures = updated.consecutive_failures,
                        "probe failed"
                    );
                    if self.auto_deregister && updated.consecutive_failures >= self.max_consecutive_failures {
                        if let Err(e) = self.registry.soft_delete(registration_id).await {
                            tracing::error!(component = "health_monitor", registration_id, error = %e, "auto-deregister failed");
                        } else {
                            crate::controller::metrics::inc_auto_deregistration();
                            tracing::error!(
                                component = "health_monitor",
                                registration_id,
                                consecutive_failures = updated.consecutive_failures,
                                "auto-deregistered after consecutive failures"
                            );
                        }
                    }
                } else {
                    tracing::debug!(component = "health_monitor", registration_id, latency_ms = result.latency_ms, "probe ok");
                }
            }
            Err(e) => {
                // Record may have been concurrently deregistered; not fatal to the cycle.
                tracing::debug!(component = "health_monitor", registration_id, error = %e, "patch skipped");
            }
        }
    }
}
