//! Triggers sync cycles in the background and retries failed ones.

use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::engine::{SyncEngine, SyncOutcome, SyncReport};
use super::SyncError;
use crate::config::SyncConfig;

/// Reports whether the remote store is reachable right now.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Connectivity for remotes that are always reachable, such as an in-process store.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

#[async_trait]
impl Connectivity for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Cycles run per trigger before giving up, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// How often connectivity is re-checked while offline.
    pub connectivity_poll: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(300),
            connectivity_poll: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_secs(config.initial_backoff_secs),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            ..Default::default()
        }
    }

    /// Backoff after the given failed attempt (1-based), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// [`RetryPolicy::base_delay`] plus up to 10% random jitter.
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter_ms = (base.as_millis() / 10) as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Started { attempt: u32 },
    WaitingForNetwork,
    Retrying {
        attempt: u32,
        delay: Duration,
        error: SyncError,
    },
    Succeeded(SyncReport),
    Failed(SyncError),
}

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    pending: bool,
}

struct Inner {
    engine: Arc<SyncEngine>,
    connectivity: Arc<dyn Connectivity>,
    policy: RetryPolicy,
    state: Mutex<RunState>,
    busy: watch::Sender<bool>,
    events: broadcast::Sender<SyncEvent>,
    periodic: Mutex<Option<JoinHandle<()>>>,
}

/// Coordinates background sync for one installation.
///
/// At most one triggered run executes at a time. Requests arriving while a
/// run is in flight collapse into a single follow-up run.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<Inner>,
}

impl SyncScheduler {
    pub fn new(
        engine: Arc<SyncEngine>,
        connectivity: Arc<dyn Connectivity>,
        policy: RetryPolicy,
    ) -> Self {
        let (busy, _) = watch::channel(false);
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                engine,
                connectivity,
                policy,
                state: Mutex::new(RunState::default()),
                busy,
                events,
                periodic: Mutex::new(None),
            }),
        }
    }

    /// Starts a run in the background, or queues one if a run is in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn request_sync(&self) {
        {
            let mut state = self.inner.lock_state();
            if state.running {
                state.pending = true;
                debug!("Sync already running, request queued");
                return;
            }
            state.running = true;
            self.inner.busy.send_replace(true);
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(inner.drain());
    }

    /// Runs one retried sync inline and returns its outcome.
    pub async fn run_now(&self) -> SyncOutcome {
        self.inner.run_with_retry().await
    }

    /// Resolves once no run is in flight or queued.
    pub async fn wait_idle(&self) {
        let mut busy = self.inner.busy.subscribe();
        let _ = busy.wait_for(|busy| !*busy).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Requests a sync every `interval`, starting one interval from now.
    ///
    /// Keeps an existing schedule and returns false if one is active.
    pub fn schedule_periodic(&self, interval: Duration) -> bool {
        if interval.is_zero() {
            warn!("Ignoring periodic sync with zero interval");
            return false;
        }

        let mut periodic = self.inner.lock_periodic();
        if periodic.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("Periodic sync already scheduled, keeping it");
            return false;
        }

        let inner = Arc::downgrade(&self.inner);
        *periodic = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                SyncScheduler { inner }.request_sync();
            }
        }));

        info!(interval_secs = interval.as_secs(), "Scheduled periodic sync");
        true
    }

    /// Stops the periodic schedule. Returns false if none was active.
    pub fn cancel_periodic(&self) -> bool {
        match self.inner.lock_periodic().take() {
            Some(task) => {
                task.abort();
                info!("Cancelled periodic sync");
                true
            }
            None => false,
        }
    }

    /// Syncs once now, then every `interval`, until `shutdown` resolves.
    ///
    /// A schedule started here is cancelled on return. A run still in flight
    /// is left to finish in the background.
    pub async fn run_until<F>(&self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let scheduled = self.schedule_periodic(interval);
        self.request_sync();
        shutdown.await;
        if scheduled {
            self.cancel_periodic();
        }
    }

    pub fn is_periodic_scheduled(&self) -> bool {
        self.inner
            .lock_periodic()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_periodic(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.periodic.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Runs until no request is pending, then marks the scheduler idle.
    async fn drain(self: Arc<Self>) {
        loop {
            // Failures are reported through events and logs
            let _ = self.run_with_retry().await;

            let again = {
                let mut state = self.lock_state();
                if state.pending {
                    state.pending = false;
                    true
                } else {
                    state.running = false;
                    self.busy.send_replace(false);
                    false
                }
            };
            if !again {
                break;
            }
        }
    }

    async fn run_with_retry(&self) -> SyncOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            self.wait_for_network().await;
            self.emit(SyncEvent::Started { attempt });

            match self.engine.sync().await {
                Ok(report) => {
                    self.emit(SyncEvent::Succeeded(report.clone()));
                    return Ok(report);
                }
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Sync failed, retrying: {}",
                        error
                    );
                    self.emit(SyncEvent::Retrying {
                        attempt,
                        delay,
                        error,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    warn!(attempt, "Sync failed: {}", error);
                    self.emit(SyncEvent::Failed(error.clone()));
                    return Err(error);
                }
            }
        }
    }

    /// Defers until the remote is reachable.
    async fn wait_for_network(&self) {
        if self.connectivity.is_online().await {
            return;
        }

        info!("Offline, deferring sync until the server is reachable");
        self.emit(SyncEvent::WaitingForNetwork);
        loop {
            tokio::time::sleep(self.policy.connectivity_poll).await;
            if self.connectivity.is_online().await {
                return;
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let periodic = self
            .periodic
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = periodic.take() {
            task.abort();
        }
    }
}
