//! Debounced, key-coalescing save scheduler.
//!
//! - `schedule(key, cb)` records (or replaces) the callback under `key` and re-arms
//!   the idle timer.
//! - `reset_timer()` re-arms the timer without adding work (keystrokes).
//! - When the timer fires, or on `manual_save()`, queued callbacks run one after
//!   another in queue order. The queue is taken at batch start, so anything
//!   scheduled while a batch runs lands in the next batch.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::key::{CoalescePolicy, SaveKey};
use super::status::{SaveStatus, SaveStatusBoard};
use crate::config::StoreConfig;
use crate::domain::SaveError;

pub type SaveFuture = Pin<Box<dyn Future<Output = Result<(), SaveError>> + Send>>;
type SaveCallback = Box<dyn FnOnce() -> SaveFuture + Send>;

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Keys whose callback ran, in execution order.
    pub executed: Vec<SaveKey>,
    /// Keys whose callback returned an error (subset of `executed`).
    pub failed: Vec<SaveKey>,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.executed.is_empty()
    }
}

/// Scheduler parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub debounce: Duration,
    pub coalesce: CoalescePolicy,
    pub save_timeout: Option<Duration>,
}

impl From<&StoreConfig> for SchedulerConfig {
    fn from(config: &StoreConfig) -> Self {
        Self {
            debounce: config.debounce(),
            coalesce: config.coalesce,
            save_timeout: config.save_timeout(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

struct Timer {
    generation: u64,
    deadline: Instant,
    join: JoinHandle<()>,
}

#[derive(Default)]
struct QueueState {
    pending: IndexMap<SaveKey, SaveCallback>,
    timer: Option<Timer>,
    generation: u64,
    closed: bool,
}

struct Inner {
    config: SchedulerConfig,
    runtime: Handle,
    state: Mutex<QueueState>,
    /// Serializes batches: a manual save racing a timer batch waits for it.
    batch_gate: tokio::sync::Mutex<()>,
    status: SaveStatusBoard,
}

/// Cloning shares the queue.
#[derive(Clone)]
pub struct SaveScheduler {
    inner: Arc<Inner>,
}

impl SaveScheduler {
    /// The idle timer is spawned on `runtime`.
    pub fn new(config: SchedulerConfig, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                runtime,
                state: Mutex::new(QueueState::default()),
                batch_gate: tokio::sync::Mutex::new(()),
                status: SaveStatusBoard::new(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn status(&self) -> &SaveStatusBoard {
        &self.inner.status
    }

    /// Queue `callback` under `key`, replacing any callback already queued there.
    ///
    /// The callback is only invoked at execution time, so it should read live
    /// state then rather than capture a copy now.
    pub fn schedule<F, Fut>(&self, key: SaveKey, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), SaveError>> + Send + 'static,
    {
        let boxed: SaveCallback = Box::new(move || Box::pin(callback()) as SaveFuture);
        let dirtied = {
            let mut state = self.inner.state.lock();
            if state.closed {
                tracing::warn!(%key, "save scheduled after shutdown, dropping it");
                return;
            }
            let coalesced = match self.inner.config.coalesce {
                CoalescePolicy::MoveToEnd => {
                    let existed = state.pending.shift_remove(&key).is_some();
                    state.pending.insert(key.clone(), boxed);
                    existed
                }
                CoalescePolicy::KeepPosition => state.pending.insert(key.clone(), boxed).is_some(),
            };
            tracing::trace!(%key, coalesced, queued = state.pending.len(), "save scheduled");
            Inner::arm_timer(&self.inner, &mut state);
            self.inner.status.publish(SaveStatus::Save)
        };
        if dirtied {
            self.inner.status.announce(SaveStatus::Save);
        }
    }

    /// Push the idle deadline out by a full window without adding work.
    pub fn reset_timer(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        Inner::arm_timer(&self.inner, &mut state);
    }

    /// Drop the callback queued under `key`. Returns whether one was queued.
    pub fn cancel(&self, key: &SaveKey) -> bool {
        let (removed, settled) = {
            let mut state = self.inner.state.lock();
            let removed = state.pending.shift_remove(key).is_some();
            let settled = removed
                && state.pending.is_empty()
                && self.inner.status.get() == SaveStatus::Save
                && self.inner.status.publish(SaveStatus::Saved);
            (removed, settled)
        };
        if settled {
            self.inner.status.announce(SaveStatus::Saved);
        }
        removed
    }

    /// Send a queued key to the back of the line, whatever the coalescing
    /// policy. Returns whether it was queued.
    pub fn move_to_end(&self, key: &SaveKey) -> bool {
        let mut state = self.inner.state.lock();
        match state.pending.shift_remove_entry(key) {
            Some((key, callback)) => {
                state.pending.insert(key, callback);
                true
            }
            None => false,
        }
    }

    /// Run everything queued now, then restart the idle timer.
    pub async fn manual_save(&self) -> BatchReport {
        self.inner.disarm_any();
        let report = self.inner.run_batch().await;
        {
            let mut state = self.inner.state.lock();
            if !state.closed {
                Inner::arm_timer(&self.inner, &mut state);
            }
        }
        report
    }

    /// Flush what is queued and stop accepting work.
    ///
    /// Work scheduled while the flush runs is flushed too; the queue is only
    /// closed once a batch ends with nothing left behind.
    pub async fn shutdown(&self) -> BatchReport {
        let mut report = BatchReport::default();
        loop {
            self.inner.disarm_any();
            let batch = self.inner.run_batch().await;
            report.executed.extend(batch.executed);
            report.failed.extend(batch.failed);

            let mut state = self.inner.state.lock();
            if state.pending.is_empty() {
                state.closed = true;
                if let Some(timer) = state.timer.take() {
                    timer.join.abort();
                }
                return report;
            }
        }
    }

    pub fn is_pending(&self, key: &SaveKey) -> bool {
        self.inner.state.lock().pending.contains_key(key)
    }

    /// Queued keys in execution order.
    pub fn pending_keys(&self) -> Vec<SaveKey> {
        self.inner.state.lock().pending.keys().cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// When the idle timer fires next, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.state.lock().timer.as_ref().map(|t| t.deadline)
    }
}

impl Inner {
    /// (Re)start the idle timer. The previous one is aborted unless it already fired.
    fn arm_timer(this: &Arc<Self>, state: &mut QueueState) {
        if let Some(timer) = state.timer.take() {
            timer.join.abort();
        }
        state.generation += 1;
        let generation = state.generation;
        let deadline = Instant::now() + this.config.debounce;
        let weak: Weak<Self> = Arc::downgrade(this);
        let join = this.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            // From here on the batch must not be aborted by a later re-arm.
            if !inner.claim_timer(generation) {
                return;
            }
            let report = inner.run_batch().await;
            if !report.is_empty() {
                tracing::debug!(
                    executed = report.executed.len(),
                    failed = report.failed.len(),
                    "idle save batch finished"
                );
            }
        });
        state.timer = Some(Timer {
            generation,
            deadline,
            join,
        });
    }

    fn claim_timer(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        match &state.timer {
            Some(timer) if timer.generation == generation => {
                state.timer = None;
                true
            }
            _ => false,
        }
    }

    fn disarm_any(&self) {
        if let Some(timer) = self.state.lock().timer.take() {
            timer.join.abort();
        }
    }

    async fn run_batch(&self) -> BatchReport {
        let _gate = self.batch_gate.lock().await;

        let (batch, started) = {
            let mut state = self.state.lock();
            let batch = std::mem::take(&mut state.pending);
            let started = !batch.is_empty() && self.status.publish(SaveStatus::Saving);
            (batch, started)
        };
        let mut report = BatchReport::default();
        if batch.is_empty() {
            return report;
        }
        if started {
            self.status.announce(SaveStatus::Saving);
        }
        tracing::debug!(count = batch.len(), "save batch started");

        for (key, callback) in batch {
            let fut = callback();
            let result = match self.config.save_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(SaveError::TimedOut(limit)),
                },
                None => fut.await,
            };
            if let Err(err) = result {
                tracing::warn!(%key, error = %err, "save failed, keeping change in memory only");
                report.failed.push(key.clone());
            }
            report.executed.push(key);
        }

        // Decided and published under the queue lock; `schedule` publishes there too.
        let (status, changed) = {
            let state = self.state.lock();
            let status = if state.pending.is_empty() {
                SaveStatus::Saved
            } else {
                SaveStatus::Save
            };
            (status, self.status.publish(status))
        };
        if changed {
            self.status.announce(status);
        }
        report
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.join.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PersistenceError;

    fn scheduler(debounce_ms: u64, coalesce: CoalescePolicy) -> SaveScheduler {
        SaveScheduler::new(
            SchedulerConfig {
                debounce: Duration::from_millis(debounce_ms),
                coalesce,
                save_timeout: None,
            },
            Handle::current(),
        )
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Arc<Mutex<Vec<String>>>, entry: &str) -> impl FnOnce() -> std::future::Ready<Result<(), SaveError>> + Send + 'static {
        let log = Arc::clone(log);
        let entry = entry.to_string();
        move || {
            log.lock().push(entry);
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_runs_before_the_idle_window() {
        let s = scheduler(10_000, CoalescePolicy::MoveToEnd);
        let ran = log();
        s.schedule("k".into(), push(&ran, "k"));

        tokio::time::sleep(Duration::from_millis(9_999)).await;
        assert!(ran.lock().is_empty());
        assert_eq!(s.status().get(), SaveStatus::Save);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*ran.lock(), vec!["k"]);
        assert_eq!(s.status().get(), SaveStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn coalescing_runs_only_the_last_callback() {
        let s = scheduler(1_000, CoalescePolicy::MoveToEnd);
        let ran = log();
        for i in 0..10 {
            s.schedule("title".into(), push(&ran, &format!("title-{i}")));
        }

        let report = s.manual_save().await;

        assert_eq!(*ran.lock(), vec!["title-9"]);
        assert_eq!(report.executed, vec![SaveKey::named("title")]);
    }

    #[tokio::test(start_paused = true)]
    async fn move_to_end_policy_reorders_coalesced_keys() {
        let s = scheduler(1_000, CoalescePolicy::MoveToEnd);
        let ran = log();
        s.schedule("a".into(), push(&ran, "a1"));
        s.schedule("b".into(), push(&ran, "b"));
        s.schedule("a".into(), push(&ran, "a2"));

        assert_eq!(s.pending_keys(), vec![SaveKey::named("b"), SaveKey::named("a")]);
        s.manual_save().await;
        assert_eq!(*ran.lock(), vec!["b", "a2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn keep_position_policy_keeps_first_slot() {
        let s = scheduler(1_000, CoalescePolicy::KeepPosition);
        let ran = log();
        s.schedule("a".into(), push(&ran, "a1"));
        s.schedule("b".into(), push(&ran, "b"));
        s.schedule("a".into(), push(&ran, "a2"));

        s.manual_save().await;
        assert_eq!(*ran.lock(), vec!["a2", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn callbacks_run_sequentially() {
        let s = scheduler(1_000, CoalescePolicy::MoveToEnd);
        let ran = log();

        let slow = Arc::clone(&ran);
        s.schedule("slow".into(), move || async move {
            slow.lock().push("slow:start".to_string());
            tokio::time::sleep(Duration::from_millis(500)).await;
            slow.lock().push("slow:end".to_string());
            Ok(())
        });
        let fast = Arc::clone(&ran);
        s.schedule("fast".into(), move || async move {
            fast.lock().push("fast:start".to_string());
            Ok(())
        });

        s.manual_save().await;
        assert_eq!(*ran.lock(), vec!["slow:start", "slow:end", "fast:start"]);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_timer_extends_the_window() {
        let s = scheduler(1_000, CoalescePolicy::MoveToEnd);
        let ran = log();
        s.schedule("k".into(), push(&ran, "k"));

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(800)).await;
            s.reset_timer();
        }
        assert!(ran.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(1_001)).await;
        assert_eq!(*ran.lock(), vec!["k"]);
    }

    #[tokio::test(start_paused = true)]
    async fn status_walks_save_saving_saved() {
        let s = scheduler(10_000, CoalescePolicy::MoveToEnd);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        s.status().listen("indicator", move |st| sink.lock().push(st));

        s.schedule("k".into(), || async { Ok(()) });
        assert_eq!(s.status().get(), SaveStatus::Save);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(*seen.lock(), vec![SaveStatus::Save, SaveStatus::Saving, SaveStatus::Saved]);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_save_mid_window_runs_immediately_and_restarts_timer() {
        let s = scheduler(10_000, CoalescePolicy::MoveToEnd);
        let ran = log();
        s.schedule("k".into(), push(&ran, "k"));

        tokio::time::sleep(Duration::from_secs(3)).await;
        let report = s.manual_save().await;

        assert_eq!(report.executed, vec![SaveKey::named("k")]);
        assert_eq!(*ran.lock(), vec!["k"]);
        assert_eq!(s.status().get(), SaveStatus::Saved);
        assert!(s.deadline().is_some());

        // later edits still debounce normally
        s.schedule("k2".into(), push(&ran, "k2"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ran.lock().len(), 1);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(*ran.lock(), vec!["k", "k2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_logged_and_do_not_stop_the_batch() {
        let s = scheduler(1_000, CoalescePolicy::MoveToEnd);
        let ran = log();
        s.schedule("bad".into(), || async {
            Err(SaveError::Persistence(PersistenceError::Unavailable))
        });
        s.schedule("good".into(), push(&ran, "good"));

        let report = s.manual_save().await;

        assert_eq!(report.failed, vec![SaveKey::named("bad")]);
        assert_eq!(*ran.lock(), vec!["good"]);
        assert_eq!(s.status().get(), SaveStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_during_a_batch_starts_a_fresh_batch() {
        let s = scheduler(1_000, CoalescePolicy::MoveToEnd);
        let ran = log();

        let inner = s.clone();
        let inner_log = Arc::clone(&ran);
        s.schedule("first".into(), move || async move {
            inner_log.lock().push("first".to_string());
            inner.schedule("late".into(), push(&inner_log, "late"));
            Ok(())
        });

        let report = s.manual_save().await;
        assert_eq!(report.executed, vec![SaveKey::named("first")]);
        assert_eq!(*ran.lock(), vec!["first"]);
        assert_eq!(s.pending_keys(), vec![SaveKey::named("late")]);
        assert_eq!(s.status().get(), SaveStatus::Save);

        tokio::time::sleep(Duration::from_millis(1_001)).await;
        assert_eq!(*ran.lock(), vec!["first", "late"]);
        assert_eq!(s.status().get(), SaveStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn save_timeout_turns_a_hung_call_into_a_failure() {
        let s = SaveScheduler::new(
            SchedulerConfig {
                debounce: Duration::from_millis(100),
                coalesce: CoalescePolicy::MoveToEnd,
                save_timeout: Some(Duration::from_secs(2)),
            },
            Handle::current(),
        );
        let ran = log();
        s.schedule("hung".into(), || async {
            std::future::pending::<()>().await;
            Ok(())
        });
        s.schedule("next".into(), push(&ran, "next"));

        let report = s.manual_save().await;
        assert_eq!(report.failed, vec![SaveKey::named("hung")]);
        assert_eq!(*ran.lock(), vec!["next"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_the_queued_callback() {
        let s = scheduler(1_000, CoalescePolicy::MoveToEnd);
        let ran = log();
        s.schedule("k".into(), push(&ran, "k"));

        assert!(s.cancel(&"k".into()));
        assert!(!s.cancel(&"k".into()));
        assert_eq!(s.status().get(), SaveStatus::Saved);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(ran.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_and_rejects_new_work() {
        let s = scheduler(10_000, CoalescePolicy::MoveToEnd);
        let ran = log();
        s.schedule("k".into(), push(&ran, "k"));

        let report = s.shutdown().await;
        assert_eq!(report.executed.len(), 1);

        s.schedule("after".into(), push(&ran, "after"));
        assert_eq!(s.pending_len(), 0);
        assert!(s.deadline().is_none());
        assert_eq!(*ran.lock(), vec!["k"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_work_queued_by_its_own_flush() {
        let s = scheduler(10_000, CoalescePolicy::MoveToEnd);
        let ran = log();

        let inner = s.clone();
        let inner_log = Arc::clone(&ran);
        s.schedule("create".into(), move || async move {
            inner_log.lock().push("create".to_string());
            inner.schedule("follow-up".into(), push(&inner_log, "follow-up"));
            Ok(())
        });

        let report = s.shutdown().await;

        assert_eq!(report.executed, vec![SaveKey::named("create"), SaveKey::named("follow-up")]);
        assert_eq!(*ran.lock(), vec!["create", "follow-up"]);
        assert_eq!(s.pending_len(), 0);
        assert_eq!(s.status().get(), SaveStatus::Saved);
    }

    #[rstest::rstest]
    #[case::move_to_end(CoalescePolicy::MoveToEnd)]
    #[case::keep_position(CoalescePolicy::KeepPosition)]
    #[tokio::test(start_paused = true)]
    async fn move_to_end_overrides_the_policy(#[case] coalesce: CoalescePolicy) {
        let s = scheduler(1_000, coalesce);
        let ran = log();
        s.schedule("parent".into(), push(&ran, "parent"));
        s.schedule("child".into(), push(&ran, "child"));

        assert!(s.move_to_end(&"parent".into()));
        assert!(!s.move_to_end(&"missing".into()));

        s.manual_save().await;
        assert_eq!(*ran.lock(), vec!["child", "parent"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn status_never_reads_saved_while_work_is_queued() {
        let s = scheduler(60_000, CoalescePolicy::MoveToEnd);

        for round in 0..200 {
            let writers: Vec<_> = (0..4)
                .map(|n| {
                    let s = s.clone();
                    tokio::spawn(async move {
                        s.schedule(SaveKey::named(format!("w{n}-{round}")), || async {
                            tokio::task::yield_now().await;
                            Ok(())
                        });
                    })
                })
                .collect();
            let saver = {
                let s = s.clone();
                tokio::spawn(async move { s.manual_save().await })
            };
            for writer in writers {
                writer.await.unwrap();
            }
            saver.await.unwrap();

            let status = s.status().get();
            if s.pending_len() > 0 {
                assert_ne!(status, SaveStatus::Saved, "round {round}: queued work reported as saved");
            }
        }

        s.manual_save().await;
        assert_eq!(s.pending_len(), 0);
        assert_eq!(s.status().get(), SaveStatus::Saved);
    }
}
