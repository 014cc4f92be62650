use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
}

/// What a consumer of a view gets to see.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot<V> {
    pub data: Option<V>,
    /// No pass has finished yet.
    pub loading: bool,
    /// A pass is in flight.
    pub refreshing: bool,
    /// Message of the last failed pass, cleared by the next successful one.
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl<V> Default for ViewSnapshot<V> {
    fn default() -> Self {
        Self {
            data: None,
            loading: true,
            refreshing: false,
            error: None,
            last_updated: None,
        }
    }
}

type PassFn<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V>> + Send + Sync>;

struct Shared<V> {
    name: String,
    // Lock order: state first, then the snapshot channel
    state: Mutex<PollState>,
    snapshot: watch::Sender<ViewSnapshot<V>>,
    pass: PassFn<V>,
}

impl<V: Send + Sync + 'static> Shared<V> {
    fn state(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Idle -> Fetching. Returns false if a pass is already running.
    fn try_begin(&self) -> bool {
        let mut state = self.state();
        if *state == PollState::Fetching {
            return false;
        }
        *state = PollState::Fetching;
        self.snapshot.send_modify(|snapshot| snapshot.refreshing = true);
        true
    }

    /// Publishes the outcome of a pass and goes back to Idle.
    fn finish(&self, result: Result<V>, elapsed: Duration) {
        let mut state = self.state();
        match result {
            Ok(view) => {
                info!(view = %self.name, elapsed_ms = elapsed.as_millis() as u64, "view refreshed");
                self.snapshot.send_modify(|snapshot| {
                    snapshot.data = Some(view);
                    snapshot.error = None;
                    snapshot.last_updated = Some(Utc::now());
                    snapshot.loading = false;
                    snapshot.refreshing = false;
                });
            }
            Err(e) => {
                warn!(view = %self.name, error = %format!("{e:#}"), "view refresh failed");
                self.snapshot.send_modify(|snapshot| {
                    snapshot.error = Some(format!("{e:#}"));
                    snapshot.loading = false;
                    snapshot.refreshing = false;
                });
            }
        }
        *state = PollState::Idle;
    }
}

// Runs one pass on its own task so that nothing short of runtime shutdown
// interrupts it once started.
fn spawn_pass<V: Send + Sync + 'static>(shared: Arc<Shared<V>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        let result = match tokio::spawn((shared.pass)()).await {
            Ok(result) => result,
            Err(e) => Err(anyhow!("aggregation pass did not complete: {}", e)),
        };
        shared.finish(result, started.elapsed());
    })
}

async fn drive<V: Send + Sync + 'static>(
    shared: Arc<Shared<V>>,
    period: Duration,
    initial: JoinHandle<()>,
) {
    let _ = initial.await;

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if shared.try_begin() {
            spawn_pass(shared.clone());
        } else {
            debug!(view = %shared.name, "tick skipped, previous pass still running");
        }
    }
}

/// Re-runs an aggregation pass on a fixed period and on demand, never more
/// than one pass at a time.
///
/// Dropping the poller stops its timer. A pass that is already running is
/// left to finish and still publishes its result.
pub struct Poller<V> {
    shared: Arc<Shared<V>>,
    timer: Option<JoinHandle<()>>,
}

impl<V> Poller<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Starts the first pass right away and arms the timer once it is done.
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(name: impl Into<String>, period: Duration, pass: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let name = name.into();
        let pass: PassFn<V> = Arc::new(move || pass().boxed());
        let (snapshot, _) = watch::channel(ViewSnapshot::default());
        let shared = Arc::new(Shared {
            name,
            state: Mutex::new(PollState::Idle),
            snapshot,
            pass,
        });

        info!(view = %shared.name, period_secs = period.as_secs(), "starting poller");
        shared.try_begin();
        let initial = spawn_pass(shared.clone());
        let timer = tokio::spawn(drive(shared.clone(), period, initial));

        Self {
            shared,
            timer: Some(timer),
        }
    }

    /// Starts a pass now unless one is already running. Returns whether a
    /// pass was started.
    pub fn refresh(&self) -> bool {
        if self.timer.is_none() {
            return false;
        }
        if self.shared.try_begin() {
            debug!(view = %self.shared.name, "manual refresh");
            spawn_pass(self.shared.clone());
            true
        } else {
            debug!(view = %self.shared.name, "manual refresh ignored, pass in flight");
            false
        }
    }

    pub fn state(&self) -> PollState {
        *self.shared.state()
    }

    pub fn snapshot(&self) -> ViewSnapshot<V> {
        self.shared.snapshot.borrow().clone()
    }

    /// Change notifications for the snapshot. Don't keep a borrow of the
    /// receiver alive while calling back into the poller.
    pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot<V>> {
        self.shared.snapshot.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    pub fn shutdown(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            info!(view = %self.shared.name, "poller stopped");
        }
    }
}

impl<V> Drop for Poller<V> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
