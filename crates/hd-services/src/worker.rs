//! # Background workers
//!
//! A worker is a unit of periodic work. The [`WorkerManager`] gives each one its
//! own task driven by a fixed-interval ticker and a one-shot stop channel:
//!
//! ```text
//! Idle --tick--> Sweeping --done--> Idle
//!   \                                 /
//!    +-------- stop signal ----------+--> Stopped (final)
//! ```
//!
//! A stop signal is only observed between ticks, so an in-flight tick always
//! runs to completion. Awaiting the task's `JoinHandle` is the acknowledgment
//! that the loop has exited.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hd_core::error::Result;
use hd_core::models::TicketStatus;
use hd_core::traits::TicketRepo;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[async_trait]
pub trait BackgroundWorker: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Time between two ticks. The first tick fires one full interval after start.
    fn interval(&self) -> Duration;

    /// One unit of work. Failures are the worker's to log; the loop keeps going regardless.
    async fn tick(&self);
}

/// What the expiry worker deletes, and how often it looks.
#[derive(Debug, Clone)]
pub struct ExpiryPolicy {
    pub interval: Duration,
    pub status: TicketStatus,
    pub older_than_days: i64,
}

/// Periodically deletes tickets in `policy.status` created more than `policy.older_than_days` ago.
pub struct TicketExpiryWorker {
    tickets: Arc<dyn TicketRepo>,
    policy: ExpiryPolicy,
}

impl TicketExpiryWorker {
    pub fn new(tickets: Arc<dyn TicketRepo>, policy: ExpiryPolicy) -> Self {
        Self { tickets, policy }
    }

    /// Runs a single sweep and reports how many tickets were removed.
    pub async fn sweep_once(&self) -> Result<u64> {
        self.tickets
            .remove_tickets_with_status(self.policy.status, self.policy.older_than_days)
            .await
    }
}

#[async_trait]
impl BackgroundWorker for TicketExpiryWorker {
    fn name(&self) -> &'static str {
        "ticket-expiry"
    }

    fn interval(&self) -> Duration {
        self.policy.interval
    }

    async fn tick(&self) {
        let started = Instant::now();
        match self.sweep_once().await {
            Ok(removed) => tracing::info!(
                removed,
                status = %self.policy.status,
                older_than_days = self.policy.older_than_days,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "expired tickets swept"
            ),
            Err(e) => tracing::error!(error = %e, status = %self.policy.status, "ticket sweep failed"),
        }
    }
}

struct RunningWorker {
    name: &'static str,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns every background worker of the process.
#[derive(Default)]
pub struct WorkerManager {
    registered: Vec<Arc<dyn BackgroundWorker>>,
    running: Vec<RunningWorker>,
}

impl WorkerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, worker: Arc<dyn BackgroundWorker>) {
        self.registered.push(worker);
    }

    pub fn running(&self) -> usize {
        self.running.len()
    }

    /// Spawns one loop per registered worker. Workers with a zero interval are skipped.
    pub fn start_all(&mut self) {
        for worker in self.registered.drain(..) {
            let period = worker.interval();
            if period.is_zero() {
                tracing::error!(worker = worker.name(), "refusing to start worker with a zero interval");
                continue;
            }
            let Some(first_tick) = Instant::now().checked_add(period) else {
                tracing::error!(worker = worker.name(), "refusing to start worker with an unrepresentable interval");
                continue;
            };

            let (stop, stop_rx) = oneshot::channel();
            let name = worker.name();
            let handle = tokio::spawn(run_loop(worker, first_tick, period, stop_rx));
            tracing::info!(worker = name, interval_secs = period.as_secs(), "worker started");
            self.running.push(RunningWorker { name, stop, handle });
        }
    }

    /// Signals every worker and waits until each loop has exited.
    pub async fn stop_all(&mut self) {
        for worker in self.running.drain(..) {
            // A send error means the loop is already gone; joining still reaps it.
            let _ = worker.stop.send(());
            match worker.handle.await {
                Ok(()) => tracing::info!(worker = worker.name, "worker stopped"),
                Err(e) => tracing::error!(worker = worker.name, error = %e, "worker task ended abnormally"),
            }
        }
    }
}

async fn run_loop(
    worker: Arc<dyn BackgroundWorker>,
    first_tick: Instant,
    period: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = ticker.tick() => worker.tick().await,
        }
    }
}
