// src/pipeline/scheduler.rs

//! Cycle scheduling.
//!
//! One task owns cycle execution. Timer ticks and manual triggers are
//! funnelled into it; at most one cycle runs at a time and at most one
//! manual trigger waits behind it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::{CycleRun, Trigger};
use crate::pipeline::Pipeline;

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    /// Timer-triggered cycles are suppressed; manual triggers still run.
    Paused,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
        })
    }
}

/// Result of requesting a manual cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A cycle will run as soon as the scheduler is free.
    Queued,
    /// A manual cycle was already pending; this request was merged into it.
    Coalesced,
    /// The scheduler has shut down.
    Stopped,
}

struct Shared {
    running: AtomicBool,
    paused: AtomicBool,
    last_run: watch::Sender<Option<CycleRun>>,
}

/// Cloneable control surface for a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
    triggers: mpsc::Sender<Trigger>,
}

impl SchedulerHandle {
    /// Request a manual cycle. Never waits for a running cycle.
    pub fn trigger(&self) -> TriggerOutcome {
        match self.triggers.try_send(Trigger::Manual) {
            Ok(()) => TriggerOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => TriggerOutcome::Coalesced,
            Err(mpsc::error::TrySendError::Closed(_)) => TriggerOutcome::Stopped,
        }
    }

    /// Suppress timer-triggered cycles. Returns false if already paused.
    ///
    /// A cycle that is running keeps running; the pause applies after it.
    pub fn pause(&self) -> bool {
        !self.shared.paused.swap(true, Ordering::SeqCst)
    }

    /// Re-enable timer-triggered cycles. Returns false if not paused.
    pub fn resume(&self) -> bool {
        self.shared.paused.swap(false, Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SchedulerState {
        if self.shared.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else if self.is_paused() {
            SchedulerState::Paused
        } else {
            SchedulerState::Idle
        }
    }

    /// The most recently completed cycle.
    pub fn last_run(&self) -> Option<CycleRun> {
        self.shared.last_run.borrow().clone()
    }

    /// Watch completed cycles.
    pub fn subscribe(&self) -> watch::Receiver<Option<CycleRun>> {
        self.shared.last_run.subscribe()
    }
}

/// Drives `Pipeline::run_cycle` on a fixed cadence and on demand.
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    interval: Duration,
    run_on_startup: bool,
    shared: Arc<Shared>,
    trigger_tx: mpsc::Sender<Trigger>,
    trigger_rx: mpsc::Receiver<Trigger>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, interval: Duration) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (last_run, _) = watch::channel(None);
        Self {
            pipeline,
            interval,
            run_on_startup: false,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                last_run,
            }),
            trigger_tx,
            trigger_rx,
        }
    }

    /// Run the first timer cycle immediately instead of after one interval.
    pub fn run_on_startup(mut self, enabled: bool) -> Self {
        self.run_on_startup = enabled;
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::clone(&self.shared),
            triggers: self.trigger_tx.clone(),
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Serve triggers until `cancel` fires. A running cycle is allowed to
    /// finish its current source before the loop exits.
    pub async fn run(self, cancel: CancellationToken) {
        let Self {
            pipeline,
            interval,
            run_on_startup,
            shared,
            trigger_tx,
            mut trigger_rx,
        } = self;
        // Closing the channel on exit makes later triggers report `Stopped`.
        drop(trigger_tx);

        let first_tick = if run_on_startup {
            Instant::now()
        } else {
            Instant::now() + interval
        };
        let mut ticker = tokio::time::interval_at(first_tick, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!("Scheduler started (every {:?})", interval);
        let mut next_id = 1u64;

        loop {
            let trigger = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(trigger) = trigger_rx.recv() => trigger,
                _ = ticker.tick() => {
                    if shared.paused.load(Ordering::SeqCst) {
                        log::debug!("Scheduler paused, skipping timer tick");
                        continue;
                    }
                    Trigger::Timer
                }
            };

            shared.running.store(true, Ordering::SeqCst);
            let run = pipeline.run_cycle(next_id, trigger, &cancel).await;
            shared.running.store(false, Ordering::SeqCst);
            next_id += 1;
            shared.last_run.send_replace(Some(run));

            // Ticks that fell due while the cycle ran are dropped.
            ticker.reset();
        }

        trigger_rx.close();
        log::info!("Scheduler stopped");
    }
}
