//! Controller liveness polling.
//!
//! # Responsibilities
//! - Periodically probe the controller
//! - Detect up/down edges and update the status flag
//! - Broadcast status heartbeats and error notifications

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backend::BackendResult;
use crate::events::{Event, Notifier};
use crate::health::StatusFlag;
use crate::observability::metrics;

/// A single liveness check.
///
/// The token is cancelled when the monitor stops; long-running probes
/// should abort their I/O when it fires.
pub trait Probe: Send + Sync + 'static {
    fn probe(&self, cancel: CancellationToken) -> BoxFuture<'_, BackendResult<()>>;
}

impl<F, Fut> Probe for F
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BackendResult<()>> + Send + 'static,
{
    fn probe(&self, cancel: CancellationToken) -> BoxFuture<'_, BackendResult<()>> {
        Box::pin(self(cancel))
    }
}

/// Polls the controller and turns probe results into notifications.
pub struct StatusMonitor {
    status: Arc<StatusFlag>,
    notifier: Arc<Notifier>,
}

impl StatusMonitor {
    pub fn new(status: Arc<StatusFlag>, notifier: Arc<Notifier>) -> Self {
        Self { status, notifier }
    }

    /// Spawn the polling loop. The first probe runs immediately.
    pub fn start<P: Probe>(self, probe: P, period: Duration) -> MonitorHandle {
        self.start_with_token(probe, period, CancellationToken::new())
    }

    /// Spawn the polling loop, stopping when `cancel` fires.
    pub fn start_with_token<P: Probe>(
        self,
        probe: P,
        period: Duration,
        cancel: CancellationToken,
    ) -> MonitorHandle {
        let task = tokio::spawn(self.run(probe, period, cancel.clone()));
        MonitorHandle {
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    async fn run<P: Probe>(self, probe: P, period: Duration, cancel: CancellationToken) {
        tracing::info!(
            component = "status-monitor",
            interval_ms = period.as_millis() as u64,
            "Status monitor starting"
        );

        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = probe.probe(cancel.child_token()) => outcome,
            };
            if cancel.is_cancelled() {
                break;
            }

            self.check(outcome).await;
        }

        tracing::info!(
            component = "status-monitor",
            "Status monitor received shutdown signal, exiting loop"
        );
    }

    /// Apply one probe result: update the flag and broadcast.
    ///
    /// A failure is only reported on the up→down edge; repeated failures
    /// while down stay silent. Every success emits a heartbeat.
    pub async fn check(&self, outcome: BackendResult<()>) {
        match outcome {
            Err(cause) => {
                metrics::record_probe("failure");
                if self.status.is_up() {
                    tracing::warn!(
                        component = "status-monitor",
                        error = %cause,
                        "Controller is down, updating status"
                    );
                    self.notifier
                        .broadcast_batch(vec![Event::error(cause), Event::status(false, false)])
                        .await;
                    self.status.mark_down();
                } else {
                    tracing::debug!(
                        component = "status-monitor",
                        error = %cause,
                        "Controller still down"
                    );
                }
            }
            Ok(()) => {
                metrics::record_probe("success");
                let was_up = self.status.mark_up();
                if !was_up {
                    tracing::info!(
                        component = "status-monitor",
                        "Controller is up, updating status"
                    );
                }
                self.notifier.broadcast(Event::status(true, !was_up)).await;
            }
        }
    }
}

/// Owner of a running polling loop.
#[derive(Debug)]
pub struct MonitorHandle {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorHandle {
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop the loop and wait for its task to exit.
    ///
    /// Idempotent. Once any call returns, the loop emits nothing further.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    tracing::error!(
                        component = "status-monitor",
                        error = %e,
                        "Status monitor panicked"
                    );
                }
            }
        }
    }
}
