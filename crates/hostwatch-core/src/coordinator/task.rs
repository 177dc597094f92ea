// ── Periodic task ──
//
// One recurring unit of work with a mutable interval and an explicit
// running flag. Ticks run inline in the task's loop and under a tick
// lock shared with out-of-band refreshes, so two ticks never overlap.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handed to each tick so it can tell whether its result still matters.
#[derive(Debug, Clone)]
pub struct TickGuard {
    cancel: CancellationToken,
}

impl TickGuard {
    /// Guard a run that has no task of its own, stale once `cancel` fires.
    pub(crate) fn from_token(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// The owning task was shut down; discard this tick's result.
    pub fn is_stale(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The update routine invoked once per tick.
#[async_trait]
pub trait Tick: Send + Sync + 'static {
    async fn tick(&self, guard: &TickGuard);
}

pub struct PeriodicTask {
    name: String,
    interval: watch::Sender<Duration>,
    running: watch::Sender<bool>,
    last_tick: watch::Sender<Option<DateTime<Utc>>>,
    ticks: AtomicU64,
    trigger: Notify,
    cancel: CancellationToken,
    tick_lock: AsyncMutex<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    /// Create a stopped task. Nothing runs until [`spawn`](Self::spawn)
    /// and [`start`](Self::start).
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        let (interval, _) = watch::channel(interval);
        let (running, _) = watch::channel(false);
        let (last_tick, _) = watch::channel(None);
        Self {
            name: name.into(),
            interval,
            running,
            last_tick,
            ticks: AtomicU64::new(0),
            trigger: Notify::new(),
            cancel: CancellationToken::new(),
            tick_lock: AsyncMutex::new(()),
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        *self.interval.borrow()
    }

    /// Applies from the next wait; a wait already in progress keeps its
    /// original deadline.
    pub fn set_interval(&self, interval: Duration) {
        self.interval.send_if_modified(|current| {
            let changed = *current != interval;
            *current = interval;
            changed
        });
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        *self.last_tick.borrow()
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn guard(&self) -> TickGuard {
        TickGuard {
            cancel: self.cancel.clone(),
        }
    }

    // ── Control ──────────────────────────────────────────────────────

    /// Idempotent. No effect after shutdown.
    pub fn start(&self) {
        if self.is_shut_down() {
            return;
        }
        if self.running.send_if_modified(|running| !std::mem::replace(running, true)) {
            debug!(task = %self.name, "started");
        }
    }

    /// Idempotent. Accumulated state is kept.
    pub fn stop(&self) {
        if self.running.send_if_modified(|running| std::mem::replace(running, false)) {
            debug!(task = %self.name, "stopped");
        }
    }

    /// Run one tick as soon as the loop is free, outside the normal cadence.
    pub fn trigger_now(&self) {
        self.trigger.notify_one();
    }

    /// Terminal: no tick starts afterwards, and an in-flight tick sees a
    /// stale guard.
    pub fn shutdown(&self) {
        self.stop();
        self.cancel.cancel();
    }

    /// Wait for the loop to exit after [`shutdown`](Self::shutdown).
    pub async fn join(&self) {
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Spawn the scheduling loop for `worker`. Idempotent.
    pub fn spawn(self: &Arc<Self>, worker: Arc<dyn Tick>) {
        let Ok(mut slot) = self.handle.lock() else {
            return;
        };
        if slot.is_none() && !self.is_shut_down() {
            *slot = Some(tokio::spawn(run_loop(Arc::clone(self), worker)));
        }
    }

    /// Run `fut` as a tick: serialized against every other tick of this
    /// task and recorded as the last tick.
    pub async fn exclusive<F: Future>(&self, fut: F) -> F::Output {
        let _serial = self.tick_lock.lock().await;
        self.record_tick();
        fut.await
    }

    /// Scheduled variant of [`exclusive`](Self::exclusive): a stop that
    /// lands while waiting for the lock cancels the tick.
    async fn scheduled<F: Future>(&self, fut: F) -> Option<F::Output> {
        let _serial = self.tick_lock.lock().await;
        if !self.is_running() {
            return None;
        }
        self.record_tick();
        Some(fut.await)
    }

    fn record_tick(&self) {
        self.last_tick.send_replace(Some(Utc::now()));
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

async fn run_loop(task: Arc<PeriodicTask>, worker: Arc<dyn Tick>) {
    let mut running = task.running.subscribe();
    debug!(task = %task.name, "scheduling loop started");

    loop {
        if !*running.borrow_and_update() {
            tokio::select! {
                biased;
                () = task.cancel.cancelled() => break,
                changed = running.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        }

        let period = task.interval();
        tokio::select! {
            biased;
            () = task.cancel.cancelled() => break,
            changed = running.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            () = task.trigger.notified() => {}
            () = tokio::time::sleep(period) => {}
        }

        // A stop issued while this wait was completing wins.
        if !task.is_running() {
            continue;
        }
        let guard = task.guard();
        if task.scheduled(worker.tick(&guard)).await.is_none() {
            debug!(task = %task.name, "stopped while waiting for the tick lock");
        }
    }

    debug!(task = %task.name, "scheduling loop exited");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Default)]
    struct Counter {
        ticks: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        applied: AtomicUsize,
        work: Duration,
    }

    impl Counter {
        fn slow(work: Duration) -> Arc<Self> {
            Arc::new(Self {
                work,
                ..Self::default()
            })
        }

        fn ticks(&self) -> usize {
            self.ticks.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Tick for Counter {
        async fn tick(&self, guard: &TickGuard) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if !guard.is_stale() {
                self.applied.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn spawn_task(interval: Duration, worker: &Arc<Counter>) -> Arc<PeriodicTask> {
        let task = Arc::new(PeriodicTask::new("test", interval));
        task.spawn(worker.clone());
        task
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_on_interval_once_started() {
        let worker = Arc::new(Counter::default());
        let task = spawn_task(Duration::from_secs(10), &worker);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(worker.ticks(), 0, "stopped task must not tick");

        task.start();
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(worker.ticks(), 3);
        assert!(task.last_tick().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_are_idempotent() {
        let worker = Arc::new(Counter::default());
        let task = spawn_task(Duration::from_secs(10), &worker);

        task.start();
        task.start();
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(worker.ticks(), 1);

        task.stop();
        task.stop();
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(worker.ticks(), 1);

        task.start();
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(worker.ticks(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_never_overlap() {
        let worker = Counter::slow(Duration::from_secs(25));
        let task = spawn_task(Duration::from_secs(10), &worker);
        task.start();

        // Out-of-band runs contend with the loop for the tick lock.
        let manual = {
            let task = task.clone();
            let worker = worker.clone();
            tokio::spawn(async move {
                for _ in 0..3 {
                    let guard = task.guard();
                    task.exclusive(worker.tick(&guard)).await;
                }
            })
        };

        tokio::time::sleep(Duration::from_secs(200)).await;
        manual.await.unwrap();
        assert!(worker.ticks() >= 4);
        assert_eq!(worker.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_a_tick_queued_behind_a_refresh() {
        let worker = Arc::new(Counter::default());
        let task = spawn_task(Duration::from_secs(10), &worker);
        task.start();

        // An out-of-band run holds the lock across the t=10 deadline.
        let refresh = {
            let task = task.clone();
            tokio::spawn(async move {
                task.exclusive(tokio::time::sleep(Duration::from_secs(15))).await;
            })
        };
        tokio::time::sleep(Duration::from_secs(12)).await;
        task.stop();
        refresh.await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(worker.ticks(), 0);
        assert_eq!(task.tick_count(), 1, "only the refresh ran");
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_runs_an_immediate_tick() {
        let worker = Arc::new(Counter::default());
        let task = spawn_task(Duration::from_secs(60), &worker);
        task.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        task.trigger_now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(worker.ticks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_interval_applies_to_the_next_wait() {
        let worker = Arc::new(Counter::default());
        let task = spawn_task(Duration::from_secs(30), &worker);
        task.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        // The 30s wait already in progress is not rescheduled.
        task.set_interval(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(worker.ticks(), 0);

        // t=30 tick, then 5s cadence: t=35, t=40.
        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(worker.ticks(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_discards_in_flight_result() {
        let worker = Counter::slow(Duration::from_secs(20));
        let task = spawn_task(Duration::from_secs(10), &worker);
        task.start();

        // First tick starts at t=10 and is mid-flight at t=15.
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(worker.ticks(), 1);
        task.shutdown();

        task.join().await;
        assert_eq!(worker.ticks(), 1);
        assert_eq!(worker.applied.load(Ordering::SeqCst), 0);

        task.start();
        assert!(!task.is_running());
    }
}
