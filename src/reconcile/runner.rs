//! Runs reconciliation cycles on a timer.
//!
//! One task owns the [`Reconciler`] and awaits each cycle in-line, so cycles
//! never overlap. A cycle that overruns its interval makes the loop skip the
//! ticks it missed rather than queue them up.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::github::SourceHost;
use crate::notify::Notifier;

use super::cycle::{CycleReport, Reconciler};

/// Messages the loop accepts besides its own timer.
#[derive(Debug)]
enum ReconcileMessage {
    /// Run a cycle now, optionally reporting back when it finishes.
    RunNow(Option<oneshot::Sender<CycleReport>>),
}

/// Handle to a running reconciliation loop.
#[derive(Debug)]
pub struct ReconcileHandle {
    shutdown: CancellationToken,
    tx: mpsc::Sender<ReconcileMessage>,
    task: JoinHandle<()>,
}

pub struct ReconcileService;

impl ReconcileService {
    /// Spawns the loop. The first cycle starts immediately.
    pub fn start<H, N>(reconciler: Reconciler<H, N>, interval: Duration) -> ReconcileHandle
    where
        H: SourceHost + 'static,
        N: Notifier + 'static,
    {
        Self::start_with_token(reconciler, interval, CancellationToken::new())
    }

    /// Like [`ReconcileService::start`], stopping when `shutdown` is cancelled.
    pub fn start_with_token<H, N>(
        reconciler: Reconciler<H, N>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> ReconcileHandle
    where
        H: SourceHost + 'static,
        N: Notifier + 'static,
    {
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run(reconciler, interval, rx, shutdown.clone()));
        ReconcileHandle { shutdown, tx, task }
    }
}

async fn run<H: SourceHost, N: Notifier>(
    mut reconciler: Reconciler<H, N>,
    interval: Duration,
    mut rx: mpsc::Receiver<ReconcileMessage>,
    shutdown: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), "Reconciliation loop started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let reply = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => None,
            msg = rx.recv() => match msg {
                Some(ReconcileMessage::RunNow(reply)) => reply,
                None => {
                    info!("Reconcile handle dropped");
                    break;
                }
            },
        };

        let report = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Shutdown during reconciliation cycle, abandoning it");
                break;
            }
            report = reconciler.run_cycle() => report,
        };
        if let Some(reply) = reply {
            // The requester may have stopped waiting.
            let _ = reply.send(report);
        }
    }

    info!("Reconciliation loop stopped");
}

impl ReconcileHandle {
    /// Runs a cycle as soon as the current one (if any) finishes and returns
    /// its report. `None` if the loop has stopped.
    pub async fn trigger(&self) -> Option<CycleReport> {
        let (reply, report) = oneshot::channel();
        self.tx
            .send(ReconcileMessage::RunNow(Some(reply)))
            .await
            .ok()?;
        report.await.ok()
    }

    /// Asks for a cycle without waiting for it. Returns false if one is
    /// already queued or the loop has stopped.
    pub fn request_cycle(&self) -> bool {
        self.tx.try_send(ReconcileMessage::RunNow(None)).is_ok()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the loop and waits for it to exit. An in-flight cycle is dropped
    /// at its next await point.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Reconciliation task failed");
        }
    }
}
