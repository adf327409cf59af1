//! Background poll scheduler.
//!
//! A spawned task owns the loop: an interval ticker plus a command channel,
//! both feeding the same serialized cycle runner. [`PollHandle`] is the
//! cloneable front end used to request a poll, change settings or stop.

use crate::error::AppError;
use crate::models::Settings;
use crate::services::poller::{CycleReport, Poller};
use crate::services::settings_store::SettingsStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

type CycleReply = oneshot::Sender<Result<CycleReport, AppError>>;
type SettingsReply = oneshot::Sender<Result<Settings, AppError>>;

/// Commands that can be sent to the poll engine.
#[derive(Debug)]
pub enum PollCommand {
    /// Run a cycle now and reply with its outcome.
    PollNow(CycleReply),

    /// Persist new settings and reschedule the timer.
    UpdateSettings(Settings, SettingsReply),

    /// Stop the engine.
    Stop,
}

/// Lightweight handle for controlling the background poll engine.
#[derive(Clone)]
pub struct PollHandle {
    command_tx: mpsc::Sender<PollCommand>,

    /// Settings as last applied by the engine.
    settings: Arc<RwLock<Settings>>,
}

impl PollHandle {
    /// Run a cycle as soon as the engine is free and wait for its report.
    ///
    /// Requests queued while a cycle is running share the next cycle.
    pub async fn poll_now(&self) -> Result<CycleReport, AppError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(PollCommand::PollNow(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| AppError::internal("Poll engine stopped before replying"))?
    }

    /// Save settings and restart the timer with the new interval.
    pub async fn update_settings(&self, settings: Settings) -> Result<Settings, AppError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(PollCommand::UpdateSettings(settings, reply_tx))
            .await?;
        reply_rx
            .await
            .map_err(|_| AppError::internal("Poll engine stopped before replying"))?
    }

    pub async fn stop(&self) -> Result<(), AppError> {
        self.send(PollCommand::Stop).await
    }

    /// Get the current settings.
    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    async fn send(&self, command: PollCommand) -> Result<(), AppError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| AppError::internal("Poll engine not running"))
    }
}

/// Background poll engine.
pub struct PollEngine {
    poller: Arc<Poller>,
    settings: Arc<RwLock<Settings>>,
}

impl PollEngine {
    /// Start the background poll loop.
    ///
    /// Spawns a task that runs an initial cycle, then one cycle per interval
    /// and one per coalesced `PollNow` batch. Returns a `PollHandle`.
    pub fn start_background(poller: Arc<Poller>, settings: Settings) -> PollHandle {
        let (tx, rx) = mpsc::channel::<PollCommand>(16);
        let settings_shared = Arc::new(RwLock::new(settings));

        let engine = PollEngine {
            poller,
            settings: settings_shared.clone(),
        };
        tokio::spawn(engine.run(rx));

        PollHandle {
            command_tx: tx,
            settings: settings_shared,
        }
    }

    async fn run(self, mut rx: mpsc::Receiver<PollCommand>) {
        log::info!("[engine] Running initial poll");
        let retry_after = self.cycle("initial").await.ok().and_then(|r| r.retry_after);

        let period = self.settings.read().await.poll_interval();
        let mut interval = match backoff_delay(period, retry_after) {
            Some(delay) => delayed_interval(delay, period),
            None => {
                let mut interval = new_interval(period);
                // Consume the immediate tick; we just polled.
                interval.tick().await;
                interval
            }
        };

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = self.cycle("periodic").await;
                    self.apply_backoff(&outcome, &mut interval).await;
                }
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else {
                        log::info!("[engine] All handles dropped");
                        break;
                    };
                    match cmd {
                        PollCommand::PollNow(reply) => {
                            let mut waiters = vec![reply];
                            let mut deferred = Vec::new();
                            while let Ok(next) = rx.try_recv() {
                                match next {
                                    PollCommand::PollNow(reply) => waiters.push(reply),
                                    other => deferred.push(other),
                                }
                            }
                            log::info!("[engine] Poll requested ({} waiting)", waiters.len());

                            let outcome = self.cycle("on-demand").await;
                            self.apply_backoff(&outcome, &mut interval).await;
                            for waiter in waiters {
                                let _ = waiter.send(outcome.clone());
                            }

                            let mut keep_running = true;
                            for cmd in deferred {
                                keep_running &= self.apply(cmd, &mut interval).await;
                            }
                            if !keep_running {
                                break;
                            }
                        }
                        other => {
                            if !self.apply(other, &mut interval).await {
                                break;
                            }
                        }
                    }
                }
            }
        }
        log::info!("[engine] Poll engine stopped");
    }

    /// Handle a non-poll command. Returns `false` when the loop should exit.
    async fn apply(&self, cmd: PollCommand, interval: &mut Interval) -> bool {
        match cmd {
            PollCommand::PollNow(reply) => {
                let _ = reply.send(self.cycle("on-demand").await);
                true
            }
            PollCommand::UpdateSettings(settings, reply) => {
                let result = self.poller.settings_store().save(settings).await;
                if let Ok(saved) = &result {
                    let period = saved.poll_interval();
                    log::info!(
                        "[engine] Settings updated, interval={}m",
                        period.as_secs() / 60
                    );
                    // Fresh interval ticks immediately, so new settings take effect now.
                    *interval = new_interval(period);
                    *self.settings.write().await = saved.clone();
                }
                let _ = reply.send(result);
                true
            }
            PollCommand::Stop => {
                log::info!("[engine] Poll engine stopping");
                false
            }
        }
    }

    async fn cycle(&self, trigger: &str) -> Result<CycleReport, AppError> {
        let outcome = self.poller.run_cycle(Utc::now()).await;
        if let Err(e) = &outcome {
            log::error!("[engine] {} poll failed: {}", trigger, e);
        }
        outcome
    }

    async fn apply_backoff(
        &self,
        outcome: &Result<CycleReport, AppError>,
        interval: &mut Interval,
    ) {
        let retry_after = outcome.as_ref().ok().and_then(|r| r.retry_after);
        let period = self.settings.read().await.poll_interval();
        if let Some(delay) = backoff_delay(period, retry_after) {
            log::warn!(
                "[engine] Rate limited, next poll in {}s",
                delay.as_secs()
            );
            *interval = delayed_interval(delay, period);
        }
    }
}

/// Watch the settings file and forward edits made outside the engine (for
/// example by another CLI invocation) so the timer is rescheduled.
pub fn spawn_settings_watcher(
    handle: PollHandle,
    store: Arc<SettingsStore>,
    check_every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = new_interval(check_every);
        let mut last_rejected: Option<Settings> = None;

        loop {
            ticker.tick().await;

            let on_disk = match store.load().await {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("[engine] Could not read settings: {}", e);
                    continue;
                }
            };
            if on_disk == handle.settings().await || last_rejected.as_ref() == Some(&on_disk) {
                continue;
            }

            log::info!("[engine] Settings changed on disk");
            match handle.update_settings(on_disk.clone()).await {
                Ok(_) => last_rejected = None,
                Err(AppError::Internal { .. }) => break,
                Err(e) => {
                    log::warn!("[engine] Ignoring invalid settings: {}", e);
                    last_rejected = Some(on_disk);
                }
            }
        }
    })
}

/// Delay before the next tick when a rate-limit hint outlasts the interval.
pub fn backoff_delay(period: Duration, retry_after: Option<Duration>) -> Option<Duration> {
    retry_after.filter(|delay| *delay > period)
}

fn new_interval(period: Duration) -> Interval {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn delayed_interval(delay: Duration, period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + delay, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
