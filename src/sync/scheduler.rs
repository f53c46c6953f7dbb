//! Event loop that turns timer ticks, identity changes and explicit requests
//! into refresh cycles.
//!
//! The timer only produces [`SyncEvent::Tick`] messages; it never touches
//! the engine directly. Cycles run on their own tasks so the loop keeps
//! draining events while a slow cycle is in flight.

use super::engine::{RefreshOptions, SyncEngine};
use crate::domain::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Tick,
    /// `forced` also drops the account's cached entries first.
    RefreshRequested { forced: bool },
    AccountChanged(Option<Address>),
    Shutdown,
}

#[derive(Debug)]
pub struct Scheduler {
    engine: Arc<SyncEngine>,
    interval: Duration,
}

/// Sending side of a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    events: mpsc::UnboundedSender<SyncEvent>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Returns false once the scheduler has stopped.
    pub fn send(&self, event: SyncEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<SyncEvent> {
        self.events.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.events.send(SyncEvent::Shutdown);
        let _ = self.task.await;
    }
}

impl Scheduler {
    pub fn new(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Start the loop. Connects `initial_account` if given and always runs
    /// one forced refresh first.
    pub fn spawn(self, initial_account: Option<Address>) -> SchedulerHandle {
        let (events, rx) = mpsc::unbounded_channel();

        let timer_events = events.clone();
        let period = self.interval;
        let timer = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if timer_events.send(SyncEvent::Tick).is_err() {
                    break;
                }
            }
        });

        let engine = self.engine;
        let task = tokio::spawn(async move {
            if initial_account.is_some() {
                engine.set_account(initial_account);
            }
            spawn_refresh(&engine, RefreshOptions::forced());
            run(engine, rx).await;
            timer.abort();
            info!("Scheduler stopped");
        });

        SchedulerHandle { events, task }
    }
}

async fn run(engine: Arc<SyncEngine>, mut rx: mpsc::UnboundedReceiver<SyncEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SyncEvent::Tick => {
                let swept = engine.sweep_expired();
                if swept > 0 {
                    debug!("Tick swept {} expired mutation(s)", swept);
                }
                if engine.account().is_some() {
                    spawn_refresh(&engine, RefreshOptions::background());
                }
            }
            SyncEvent::RefreshRequested { forced: true } => {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    if let Err(e) = engine.force_refresh().await {
                        debug!("Forced refresh failed: {}", e);
                    }
                });
            }
            SyncEvent::RefreshRequested { forced: false } => {
                spawn_refresh(&engine, RefreshOptions::background());
            }
            SyncEvent::AccountChanged(account) => {
                if engine.set_account(account) {
                    spawn_refresh(&engine, RefreshOptions::forced());
                }
            }
            SyncEvent::Shutdown => break,
        }
    }
}

fn spawn_refresh(engine: &Arc<SyncEngine>, options: RefreshOptions) {
    let engine = Arc::clone(engine);
    tokio::spawn(async move {
        match engine.refresh_data(options).await {
            Ok(outcome) => debug!("Refresh {:?}: {:?}", options, outcome),
            Err(e) => debug!("Refresh {:?} failed: {}", options, e),
        }
    });
}
