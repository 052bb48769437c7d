//! Timed on/off phases
//!
//! A [`PeriodController`] represents one phase such as "trade is open". A
//! period begins, fires every subscriber with `true`, stays open until its
//! duration elapses or someone calls [`PeriodController::stop`], then fires
//! every subscriber with `false`.
//!
//! ```text
//!  begin() ──► subscribers(true) ──► wait ─┬─ duration elapsed ─┐
//!                                          └─ stop() signal ────┴─► subscribers(false)
//! ```
//!
//! Subscribers run synchronously, in registration order, on the task that
//! drives the transition. Later subscribers may rely on earlier ones having
//! already updated shared flags.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, trace, warn};

/// Default bounded wait of [`PeriodController::stop`]
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(1);

/// Callback invoked with `true` on period start and `false` on period end
pub type Subscriber = Arc<dyn Fn(bool) + Send + Sync>;

/// How a period ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodEnd {
    /// The configured duration elapsed
    Elapsed,
    /// `stop()` ended it early
    Stopped,
    /// Another period was already open; nothing happened
    AlreadyRunning,
}

/// What `stop()` achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The running period ended and its `false` subscribers have run
    Stopped,
    /// The stop was signalled but the period did not finish within the grace window
    Requested,
    /// No period was running; subscribers were fired with `false` anyway
    Idle,
}

#[derive(Default)]
struct PeriodState {
    running: bool,
    stop_tx: Option<oneshot::Sender<()>>,
}

/// Reusable timed broadcast gate
pub struct PeriodController {
    name: &'static str,
    duration: Mutex<Duration>,
    stop_grace: Duration,
    subscribers: RwLock<Vec<Subscriber>>,
    state: Mutex<PeriodState>,
    ended: Notify,
}

impl PeriodController {
    /// Create a controller whose periods last `duration`
    pub fn new(name: &'static str, duration: Duration) -> Self {
        Self {
            name,
            duration: Mutex::new(duration),
            stop_grace: DEFAULT_STOP_GRACE,
            subscribers: RwLock::new(Vec::new()),
            state: Mutex::new(PeriodState::default()),
            ended: Notify::new(),
        }
    }

    /// Set how long `stop()` waits for a running period to wind down
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Duration used by the next period; an open period keeps its own
    pub fn set_duration(&self, duration: Duration) {
        trace!(period = self.name, ?duration, "period duration updated");
        *self.duration.lock() = duration;
    }

    pub fn duration(&self) -> Duration {
        *self.duration.lock()
    }

    /// Append a subscriber; it sees every later transition
    pub fn register_subscriber<F>(&self, subscriber: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Arc::new(subscriber));
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Open a period without waiting for it to end.
    ///
    /// Subscribers have been fired with `true` when this returns. The caller
    /// owns the returned [`ActivePeriod`] and must drive it with
    /// [`ActivePeriod::wait`], typically on a spawned task. Returns `None`
    /// when a period is already open.
    pub fn begin(self: &Arc<Self>) -> Option<ActivePeriod> {
        let (stop_tx, stop_rx) = oneshot::channel();
        {
            let mut state = self.state.lock();
            if state.running {
                debug!(period = self.name, "period already running");
                return None;
            }
            state.running = true;
            state.stop_tx = Some(stop_tx);
        }

        let duration = self.duration();
        trace!(period = self.name, ?duration, "period started");
        self.broadcast(true);

        Some(ActivePeriod {
            controller: Arc::clone(self),
            stop_rx: Some(stop_rx),
            duration,
            finished: false,
        })
    }

    /// Run a whole period, blocking the caller until it ends
    pub async fn start(self: &Arc<Self>) -> PeriodEnd {
        match self.begin() {
            Some(period) => period.wait().await,
            None => PeriodEnd::AlreadyRunning,
        }
    }

    /// End the running period, or broadcast `false` when none is running.
    ///
    /// Best-effort: the stop is signalled immediately, then this waits at
    /// most the grace window for the period to finish. Giving up is not an
    /// error, the period still ends as soon as its task observes the signal.
    pub async fn stop(&self) -> StopOutcome {
        let ended = self.ended.notified();

        let signal = {
            let mut state = self.state.lock();
            if state.running {
                Some(state.stop_tx.take())
            } else {
                None
            }
        };

        let Some(stop_tx) = signal else {
            trace!(period = self.name, "stop without running period");
            self.broadcast(false);
            return StopOutcome::Idle;
        };

        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(());
        }

        match tokio::time::timeout(self.stop_grace, ended).await {
            Ok(()) => StopOutcome::Stopped,
            Err(_) => {
                warn!(
                    period = self.name,
                    grace = ?self.stop_grace,
                    "period did not finish within grace window, stop left pending"
                );
                StopOutcome::Requested
            }
        }
    }

    fn finish(&self) {
        {
            let mut state = self.state.lock();
            state.running = false;
            state.stop_tx = None;
        }
        trace!(period = self.name, "period stopped");
        self.broadcast(false);
        self.ended.notify_waiters();
    }

    fn broadcast(&self, active: bool) {
        let subscribers: Vec<Subscriber> = self.subscribers.read().iter().cloned().collect();
        for subscriber in subscribers {
            subscriber(active);
        }
    }
}

/// An open period, ended by [`wait`](Self::wait) or by being dropped
pub struct ActivePeriod {
    controller: Arc<PeriodController>,
    stop_rx: Option<oneshot::Receiver<()>>,
    duration: Duration,
    finished: bool,
}

impl ActivePeriod {
    /// Block until the duration elapses or the controller is stopped
    pub async fn wait(mut self) -> PeriodEnd {
        let end = match self.stop_rx.take() {
            Some(mut stop_rx) => {
                tokio::select! {
                    _ = &mut stop_rx => PeriodEnd::Stopped,
                    _ = tokio::time::sleep(self.duration) => PeriodEnd::Elapsed,
                }
            }
            None => PeriodEnd::Stopped,
        };

        self.finished = true;
        self.controller.finish();
        end
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Drop for ActivePeriod {
    fn drop(&mut self) {
        // an abandoned period still has to close its subscribers
        if !self.finished {
            self.controller.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn recording(controller: &PeriodController) -> Arc<Mutex<Vec<bool>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        controller.register_subscriber(move |active| sink.lock().push(active));
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_period_elapses() {
        let controller = Arc::new(PeriodController::new("trade", Duration::from_secs(60)));
        let events = recording(&controller);

        let end = controller.start().await;

        assert_eq!(end, PeriodEnd::Elapsed);
        assert_eq!(*events.lock(), vec![true, false]);
        assert!(!controller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_period_early() {
        let controller = Arc::new(PeriodController::new("trade", Duration::from_secs(3600)));
        let events = recording(&controller);

        let period = controller.begin().expect("period should open");
        assert!(controller.is_running());
        let handle = tokio::spawn(period.wait());

        let outcome = controller.stop().await;

        assert_eq!(outcome, StopOutcome::Stopped);
        assert_eq!(handle.await.unwrap(), PeriodEnd::Stopped);
        assert_eq!(*events.lock(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_stop_without_period_broadcasts_every_time() {
        let controller = PeriodController::new("registration", Duration::from_secs(1));
        let events = recording(&controller);

        assert_eq!(controller.stop().await, StopOutcome::Idle);
        assert_eq!(controller.stop().await, StopOutcome::Idle);

        assert_eq!(*events.lock(), vec![false, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_begin_is_rejected_while_running() {
        let controller = Arc::new(PeriodController::new("trade", Duration::from_secs(10)));
        let events = recording(&controller);

        let period = controller.begin().unwrap();
        assert!(controller.begin().is_none());
        assert_eq!(controller.start().await, PeriodEnd::AlreadyRunning);

        assert_eq!(period.wait().await, PeriodEnd::Elapsed);
        assert_eq!(*events.lock(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_gives_up_after_grace_window() {
        let controller = Arc::new(
            PeriodController::new("trade", Duration::from_secs(3600))
                .with_stop_grace(Duration::from_millis(50)),
        );
        let events = recording(&controller);

        // nobody drives the period, so the stop signal is never observed
        let period = controller.begin().unwrap();
        assert_eq!(controller.stop().await, StopOutcome::Requested);
        assert!(controller.is_running());

        // once driven, the pending signal ends it immediately
        assert_eq!(period.wait().await, PeriodEnd::Stopped);
        assert_eq!(*events.lock(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_change_applies_to_next_period() {
        let controller = Arc::new(PeriodController::new("trade", Duration::from_secs(10)));

        let period = controller.begin().unwrap();
        controller.set_duration(Duration::from_secs(20));
        assert_eq!(period.duration(), Duration::from_secs(10));
        period.wait().await;

        let next = controller.begin().unwrap();
        assert_eq!(next.duration(), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_dropped_period_closes_subscribers() {
        let controller = Arc::new(PeriodController::new("trade", Duration::from_secs(10)));
        let events = recording(&controller);

        drop(controller.begin().unwrap());

        assert!(!controller.is_running());
        assert_eq!(*events.lock(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_subscribers_run_in_registration_order() {
        let controller = PeriodController::new("trade", Duration::from_secs(1));
        let order = Arc::new(Mutex::new(Vec::new()));
        for id in 0..3 {
            let order = Arc::clone(&order);
            controller.register_subscriber(move |_| order.lock().push(id));
        }

        controller.stop().await;

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }
}
