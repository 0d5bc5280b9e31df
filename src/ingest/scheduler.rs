// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::alert::daily_summary;
use crate::config::MonitorConfig;
use crate::ingest::{Orchestrator, RunOptions};
use crate::notify::NotifierMux;

const DAY: Duration = Duration::from_secs(24 * 3600);

/// Periodic scheduled runs. The first tick fires immediately. Stops when
/// `shutdown` flips to `true` or its sender is dropped; a run in progress
/// is asked to stop after its current source.
pub fn spawn_scheduler(
    orchestrator: Arc<Orchestrator>,
    cfg: MonitorConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(cfg.schedule_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            let run = orchestrator.trigger(RunOptions::scheduled(&cfg));
            tokio::pin!(run);
            let outcome = tokio::select! {
                o = &mut run => o,
                _ = shutdown.changed() => {
                    orchestrator.cancel();
                    run.await
                }
            };

            tracing::info!(
                target: "ingest",
                success = outcome.success,
                run_id = outcome.run_id.as_deref().unwrap_or("-"),
                issues = outcome.issues.len(),
                "scheduled run tick"
            );
            if *shutdown.borrow() {
                break;
            }
        }
        tracing::info!(target: "ingest", "scheduler stopped");
    })
}

/// Daily rollup over recorder history, sent through `notifier`.
pub fn spawn_daily_summary(
    orchestrator: Arc<Orchestrator>,
    notifier: NotifierMux,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let hours = orchestrator.config().summary_window_hours;
        let recorder = orchestrator.recorder();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + DAY, DAY);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            match daily_summary(recorder.as_ref(), hours, Utc::now()).await {
                Ok(msg) => {
                    let res = notifier.notify(&msg).await;
                    if !res.ok {
                        tracing::warn!(target: "notify", error = ?res.error, "daily summary not delivered");
                    }
                }
                Err(e) => tracing::warn!(target: "recorder", error = %e, "daily summary query failed"),
            }
        }
    })
}
