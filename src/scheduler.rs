//! Scheduler (spec §4.6): paces collection cycles, bounds concurrent
//! probes, and drives the collector's lifecycle from startup through a
//! graceful, signal-triggered shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;

use crate::classifier::StreakTable;
use crate::config::Snapshot;
use crate::errors::RunError;
use crate::records::{CheckResult, CheckType, HostSpec, Measurement, ProbeIdentity, Status};
use crate::store::{FailedCycleCounter, Store};
use crate::{identity, metrics};

/// The collector's coarse lifecycle state, matched on by [`Scheduler::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// Loading config, resolving identity, opening the datastore pool.
    Starting,
    /// Steady-state: running cycles on `interval_sec` pacing.
    Running,
    /// A shutdown signal was received; finishing in-flight work before
    /// exiting.
    Draining,
    /// Clean exit.
    Stopped,
}

/// Owns everything a collection cycle needs: the validated config, the
/// datastore pool, the resolved probe identity, and the per-service streak
/// state.
pub struct Scheduler {
    snapshot: Snapshot,
    store: Store,
    identity: ProbeIdentity,
    streaks: StreakTable,
    last_status: HashMap<String, Status>,
    failed_cycles: FailedCycleCounter,
    state: CollectorState,
    started_at: Instant,
}

impl Scheduler {
    /// Builds a scheduler from a loaded [`Snapshot`]: resolves the probe
    /// identity and opens the datastore pool.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Datastore`] if the connection pool cannot be
    /// constructed.
    pub async fn new(snapshot: Snapshot) -> Result<Self, RunError> {
        let identity = identity::resolve(&snapshot.main.region).await;
        let store = Store::connect(&snapshot.main.db).await?;
        Ok(Self {
            snapshot,
            store,
            identity,
            streaks: StreakTable::new(),
            last_status: HashMap::new(),
            failed_cycles: FailedCycleCounter::new(),
            state: CollectorState::Starting,
            started_at: Instant::now(),
        })
    }

    /// Runs exactly one collection cycle and returns, used by the CLI's
    /// `once` mode.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Datastore`] if the cycle's inserts all failed and
    /// this pushes the scheduler over [`crate::MAX_FAILED_CYCLES`].
    pub async fn run_once(&mut self) -> Result<(), RunError> {
        self.run_cycle().await
    }

    /// Runs continuously on `collector.interval_sec` pacing until a SIGTERM
    /// or Ctrl-C is received, at which point it finishes the in-flight cycle
    /// and returns cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Datastore`] if [`crate::MAX_FAILED_CYCLES`]
    /// consecutive cycles fail to persist a single measurement.
    pub async fn run(&mut self) -> Result<(), RunError> {
        self.state = CollectorState::Running;
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
            self.snapshot.main.collector.interval_sec,
        ));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .map_err(RunError::Io)?;

        loop {
            match self.state {
                CollectorState::Running => {
                    tokio::select! {
                        _ = ticker.tick() => {
                            self.run_cycle().await?;
                        }
                        _ = sigterm.recv() => {
                            tracing::info!("received SIGTERM, draining");
                            self.state = CollectorState::Draining;
                        }
                        _ = tokio::signal::ctrl_c() => {
                            tracing::info!("received Ctrl-C, draining");
                            self.state = CollectorState::Draining;
                        }
                    }
                }
                CollectorState::Draining => {
                    self.state = CollectorState::Stopped;
                }
                CollectorState::Stopped => return Ok(()),
                CollectorState::Starting => self.state = CollectorState::Running,
            }
        }
    }

    async fn run_cycle(&mut self) -> Result<(), RunError> {
        let cycle_start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(
            self.snapshot
                .main
                .collector
                .max_workers
                .min(self.snapshot.services.len().max(1)),
        ));

        let mut tasks = Vec::with_capacity(self.snapshot.services.len());
        for service in self.snapshot.services.iter().filter(|s| s.enabled) {
            let service = service.clone();
            let host = service
                .host_id
                .as_ref()
                .and_then(|id| self.snapshot.host_for(id))
                .cloned();
            let timeouts = self.snapshot.main.collector.timeouts.clone();
            let thresholds = self.snapshot.main.collector.thresholds.clone();
            let permit = Arc::clone(&semaphore);

            tasks.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await;
                let check_type = service.check_type;
                let ts = Utc::now();
                let check_start = Instant::now();
                let budget = timeouts.for_check_type(check_type);
                let outcome = match tokio::time::timeout(
                    budget,
                    CheckType::run(&service, host.as_ref(), &timeouts, &thresholds),
                )
                .await
                {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => CheckResult::hard_failure().with_meta("error", e.to_string()),
                    Err(_) => CheckResult::hard_failure().with_meta("error", "probe exceeded its timeout budget"),
                };
                metrics::record_check(
                    &check_type.to_string(),
                    &format!("{:?}", outcome.raw_status),
                    check_start.elapsed().as_secs_f64(),
                );
                (service, host, ts, outcome)
            }));
        }

        let mut succeeded = 0u32;
        for task in tasks {
            let (service, host, ts, result) = match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    tracing::error!(error = %join_error, "a check task panicked");
                    continue;
                }
            };

            let status = self.streaks.classify(&service.service_id, &result);
            self.log_transition(&service.service_id, status);

            let measurement = self.build_measurement(&service, host.as_ref(), ts, status, &result);
            match self.store.insert_measurement(&measurement).await {
                Ok(()) => succeeded += 1,
                Err(e) => tracing::error!(service_id = %service.service_id, error = %e, "failed to persist measurement"),
            }
        }

        if succeeded == 0 && !self.snapshot.services.is_empty() {
            if self.failed_cycles.record_failure() {
                return Err(RunError::Datastore(crate::errors::StoreError::NonRetryable(
                    sqlx::Error::PoolClosed,
                )));
            }
        } else {
            self.failed_cycles.record_success();
        }

        metrics::record_cycle(cycle_start.elapsed().as_secs_f64());
        metrics::record_uptime(self.started_at);
        Ok(())
    }

    fn build_measurement(
        &self,
        service: &crate::records::ServiceSpec,
        host: Option<&HostSpec>,
        ts: chrono::DateTime<Utc>,
        status: Status,
        result: &CheckResult,
    ) -> Measurement {
        let mut meta = self.identity.meta_fields();
        meta.extend(result.meta.clone());

        Measurement {
            ts,
            region: self.identity.region.clone(),
            project_id: service.project_id,
            target_id: service.service_id.clone(),
            host_id: host.map(|h| h.host_id.clone()),
            check_type: service.check_type,
            status,
            latency_ms: result.latency_ms as i32,
            meta_json: Some(serde_json::Value::Object(meta.into_iter().collect())),
        }
    }

    fn log_transition(&mut self, service_id: &str, new_status: Status) {
        let previous = self.last_status.insert(service_id.to_string(), new_status);
        match previous {
            Some(prev) if prev != new_status => {
                tracing::info!(service_id, from = %prev, to = %new_status, "status transition");
            }
            None => {
                tracing::info!(service_id, status = %new_status, "first observation");
            }
            _ => {}
        }
    }
}
