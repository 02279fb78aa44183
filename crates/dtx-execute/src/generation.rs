//! One wave of unit tasks
//!
//! ```text
//! New -> Running -> Completing -> Finished
//! New -> Running <-> SucceededAll -> Finished
//! Running | Completing -> Aborted -> RolledBack | RollbackFailed
//! Finished | SucceededAll -> Aborted          (rollback from a later wave)
//! ```
//!
//! Every task event is handled in one critical section of the generation's
//! mutex. Executor dispatch and observer callbacks happen after it ends.

use crate::error::{ExecuteError, ExecuteResult};
use crate::executor::TaskExecutor;
use crate::handle::{TaskHandle, TaskStatus};
use dtx_metrics::{names, Metrics};
use dtx_primitives::{GenerationId, TaskId};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Lifecycle of a generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationStatus {
    /// Accepting tasks, not fired
    New,
    /// Tasks dispatched, no successor linked
    Running,
    /// Tasks dispatched, successor linked
    Completing,
    /// Every dispatched task completed, no successor linked
    SucceededAll,
    /// Every task completed and a successor is linked
    Finished,
    /// Rolling back
    Aborted,
    /// Every task that ran was compensated
    RolledBack,
    /// Some compensation failed permanently
    RollbackFailed,
}

impl GenerationStatus {
    /// Whether the generation is aborted or done rolling back
    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            GenerationStatus::Aborted | GenerationStatus::RolledBack | GenerationStatus::RollbackFailed
        )
    }
}

/// Receives generation lifecycle events, usually the book-keeping
pub trait GenerationObserver: Send + Sync {
    /// Every task succeeded and the successor may fire
    fn generation_finished(&self, id: GenerationId);

    /// Every task succeeded and no successor is linked yet
    fn generation_succeeded_all(&self, id: GenerationId);

    /// The generation started rolling back
    fn generation_aborted(&self, _id: GenerationId) {}

    /// Every compensation of the generation settled
    fn generation_rollback_completed(&self, id: GenerationId, success: bool);
}

/// Number of tasks in each bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketCounts {
    /// Waiting for the generation to fire
    pub new: usize,
    /// Dispatched, outcome not processed
    pub running: usize,
    /// Completed normally
    pub normal: usize,
    /// Compensation dispatched
    pub rolling_back: usize,
    /// Compensated
    pub rollback_succeeded: usize,
    /// Compensation failed permanently
    pub rollback_failed: usize,
    /// Cancelled before they started
    pub cancelled: usize,
}

#[derive(Default)]
struct TaskBuckets {
    new: Vec<Arc<TaskHandle>>,
    running: Vec<Arc<TaskHandle>>,
    normal: Vec<Arc<TaskHandle>>,
    rolling_back: Vec<Arc<TaskHandle>>,
    rollback_succeeded: Vec<Arc<TaskHandle>>,
    rollback_failed: Vec<Arc<TaskHandle>>,
    cancelled: Vec<Arc<TaskHandle>>,
}

impl TaskBuckets {
    fn counts(&self) -> BucketCounts {
        BucketCounts {
            new: self.new.len(),
            running: self.running.len(),
            normal: self.normal.len(),
            rolling_back: self.rolling_back.len(),
            rollback_succeeded: self.rollback_succeeded.len(),
            rollback_failed: self.rollback_failed.len(),
            cancelled: self.cancelled.len(),
        }
    }

    fn rollback_settled(&self) -> bool {
        self.running.is_empty() && self.rolling_back.is_empty()
    }
}

fn take(bucket: &mut Vec<Arc<TaskHandle>>, id: TaskId) -> Option<Arc<TaskHandle>> {
    let pos = bucket.iter().position(|h| h.id() == id)?;
    Some(bucket.remove(pos))
}

#[derive(Debug, Clone, Copy)]
enum JobKind {
    Run,
    Rollback,
}

enum Notice {
    Finished,
    SucceededAll,
    Aborted,
    RollbackCompleted(bool),
}

/// Work collected inside a critical section
#[derive(Default)]
struct Effects {
    jobs: Vec<(Arc<TaskHandle>, JobKind)>,
    notices: Vec<Notice>,
}

struct GenerationState {
    status: GenerationStatus,
    prev: Option<GenerationId>,
    next: Option<GenerationId>,
    buckets: TaskBuckets,
}

impl GenerationState {
    fn compensate(&mut self, handle: Arc<TaskHandle>, effects: &mut Effects) {
        handle.prepare_rollback();
        self.buckets.rolling_back.push(Arc::clone(&handle));
        effects.jobs.push((handle, JobKind::Rollback));
    }

    /// Enter `Aborted`, cancel what has not started and compensate what ran
    fn abort(&mut self, inner: bool, effects: &mut Effects) {
        self.status = GenerationStatus::Aborted;
        effects.notices.push(Notice::Aborted);

        for handle in std::mem::take(&mut self.buckets.new) {
            handle.cancel();
            self.buckets.cancelled.push(handle);
        }
        if inner {
            // Tasks already executing stay in `running` and are compensated
            // once their outcome arrives
            let running = std::mem::take(&mut self.buckets.running);
            for handle in running {
                if handle.cancel() {
                    self.buckets.cancelled.push(handle);
                } else {
                    self.buckets.running.push(handle);
                }
            }
        }
        for handle in std::mem::take(&mut self.buckets.normal) {
            self.compensate(handle, effects);
        }
        self.settle_rollback(effects);
    }

    fn settle_rollback(&mut self, effects: &mut Effects) {
        if self.status != GenerationStatus::Aborted || !self.buckets.rollback_settled() {
            return;
        }
        let success = self.buckets.rollback_failed.is_empty();
        self.status = if success {
            GenerationStatus::RolledBack
        } else {
            GenerationStatus::RollbackFailed
        };
        effects.notices.push(Notice::RollbackCompleted(success));
    }
}

/// A wave of unit tasks sharing one priority
pub struct Generation {
    id: GenerationId,
    executor: Arc<dyn TaskExecutor>,
    observer: Weak<dyn GenerationObserver>,
    metrics: Arc<Metrics>,
    state: Mutex<GenerationState>,
}

impl Generation {
    /// Create an unfired generation
    pub fn new(
        id: GenerationId,
        executor: Arc<dyn TaskExecutor>,
        observer: Weak<dyn GenerationObserver>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            executor,
            observer,
            metrics,
            state: Mutex::new(GenerationState {
                status: GenerationStatus::New,
                prev: None,
                next: None,
                buckets: TaskBuckets::default(),
            }),
        })
    }

    /// Generation id, equal to the priority of its tasks
    pub fn id(&self) -> GenerationId {
        self.id
    }

    /// Current status
    pub fn status(&self) -> GenerationStatus {
        self.state.lock().status
    }

    /// Preceding generation
    pub fn prev(&self) -> Option<GenerationId> {
        self.state.lock().prev
    }

    /// Successor generation
    pub fn next(&self) -> Option<GenerationId> {
        self.state.lock().next
    }

    /// Bucket sizes
    pub fn bucket_counts(&self) -> BucketCounts {
        self.state.lock().buckets.counts()
    }

    /// Tasks whose compensation failed permanently
    pub fn rollback_failed_tasks(&self) -> Vec<TaskId> {
        self.state
            .lock()
            .buckets
            .rollback_failed
            .iter()
            .map(|h| h.id())
            .collect()
    }

    pub(crate) fn set_prev(&self, prev: GenerationId) {
        self.state.lock().prev = Some(prev);
    }

    /// Link the successor, closing this generation to new tasks
    ///
    /// Returns true when every task already succeeded, in which case the
    /// generation is `Finished` and the caller fires the successor. No
    /// `generation_finished` event is sent for that transition.
    pub fn set_next(&self, next: GenerationId) -> bool {
        let mut state = self.state.lock();
        state.next = Some(next);
        match state.status {
            GenerationStatus::Running => {
                state.status = GenerationStatus::Completing;
                false
            }
            GenerationStatus::SucceededAll => {
                state.status = GenerationStatus::Finished;
                true
            }
            _ => false,
        }
    }

    /// Add a task
    ///
    /// A `New` generation holds it until fired. A running generation
    /// dispatches it at once and a `SucceededAll` one reopens to `Running`.
    pub fn enqueue(self: &Arc<Self>, handle: Arc<TaskHandle>) -> ExecuteResult<()> {
        let mut effects = Effects::default();
        {
            let mut state = self.state.lock();
            if state.status.is_aborted() {
                return Err(ExecuteError::GenerationAborted(self.id));
            }
            if state.next.is_some() {
                return Err(ExecuteError::GenerationClosed(self.id));
            }
            match state.status {
                GenerationStatus::New => state.buckets.new.push(handle),
                GenerationStatus::Running | GenerationStatus::SucceededAll => {
                    if state.status == GenerationStatus::SucceededAll {
                        debug!("{} reopened by {}", self.id, handle.id());
                        state.status = GenerationStatus::Running;
                    }
                    state.buckets.running.push(Arc::clone(&handle));
                    effects.jobs.push((handle, JobKind::Run));
                }
                _ => return Err(ExecuteError::GenerationClosed(self.id)),
            }
        }
        self.apply(effects);
        Ok(())
    }

    /// Dispatch every queued task in enqueue order
    pub fn fire(self: &Arc<Self>) {
        let mut effects = Effects::default();
        {
            let mut state = self.state.lock();
            if state.status != GenerationStatus::New {
                return;
            }
            state.status = if state.next.is_some() {
                GenerationStatus::Completing
            } else {
                GenerationStatus::Running
            };
            for handle in std::mem::take(&mut state.buckets.new) {
                state.buckets.running.push(Arc::clone(&handle));
                effects.jobs.push((handle, JobKind::Run));
            }
            info!("Firing {} with {} tasks", self.id, effects.jobs.len());
        }
        self.metrics.incr(names::GENERATION_FIRED, 1);
        self.apply(effects);
    }

    /// Process the terminal status of `handle`
    ///
    /// Transient statuses are ignored.
    pub fn task_done(self: &Arc<Self>, handle: &Arc<TaskHandle>) {
        let status = handle.status();
        if !status.is_terminal() {
            return;
        }
        let mut effects = Effects::default();
        {
            let mut state = self.state.lock();
            match status {
                TaskStatus::Normal => self.on_normal(&mut state, handle, &mut effects),
                TaskStatus::Abort => self.on_abort(&mut state, handle, &mut effects),
                TaskStatus::RollbackSucceeded => {
                    self.on_rollback_succeeded(&mut state, handle, &mut effects)
                }
                TaskStatus::RollbackFailed => {
                    self.on_rollback_failed(&mut state, handle, &mut effects)
                }
                _ => {}
            }
        }
        self.apply(effects);
    }

    /// Roll the generation back
    ///
    /// `inner` is true when the abort starts in this generation: tasks that
    /// have not started are cancelled, tasks that ran are compensated. A
    /// rollback demanded by a later generation compensates completed tasks
    /// only.
    pub fn rollback(self: &Arc<Self>, inner: bool) {
        let mut effects = Effects::default();
        {
            let mut state = self.state.lock();
            if state.status.is_aborted() {
                return;
            }
            info!("Rolling back {} (inner: {})", self.id, inner);
            state.abort(inner, &mut effects);
        }
        self.apply(effects);
    }

    fn on_normal(&self, state: &mut GenerationState, handle: &TaskHandle, effects: &mut Effects) {
        let Some(handle) = take(&mut state.buckets.running, handle.id()) else {
            return;
        };
        self.metrics.incr(names::TASK_NORMAL, 1);

        if state.status == GenerationStatus::Aborted {
            debug!("{} completed after abort of {}, compensating", handle.id(), self.id);
            state.compensate(handle, effects);
            return;
        }
        state.buckets.normal.push(handle);
        if !state.buckets.running.is_empty() {
            return;
        }
        match state.status {
            GenerationStatus::Running => {
                state.status = GenerationStatus::SucceededAll;
                effects.notices.push(Notice::SucceededAll);
            }
            GenerationStatus::Completing => {
                state.status = GenerationStatus::Finished;
                effects.notices.push(Notice::Finished);
            }
            _ => {}
        }
    }

    fn on_abort(&self, state: &mut GenerationState, handle: &TaskHandle, effects: &mut Effects) {
        let Some(handle) = take(&mut state.buckets.running, handle.id()) else {
            return;
        };
        self.metrics.incr(names::TASK_ABORTED, 1);
        let reason = handle
            .abort_signal()
            .map(|s| s.message().to_string())
            .unwrap_or_default();

        state.compensate(handle.clone(), effects);
        if state.status == GenerationStatus::Aborted {
            debug!("{} aborted after abort of {}", handle.id(), self.id);
            return;
        }
        warn!("{} aborted {}: {}", handle.id(), self.id, reason);
        state.abort(true, effects);
    }

    fn on_rollback_succeeded(
        &self,
        state: &mut GenerationState,
        handle: &TaskHandle,
        effects: &mut Effects,
    ) {
        assert!(
            state.status == GenerationStatus::Aborted,
            "{} received a rollback outcome in status {:?}",
            self.id,
            state.status
        );
        let Some(handle) = take(&mut state.buckets.rolling_back, handle.id()) else {
            return;
        };
        self.metrics.incr(names::ROLLBACK_SUCCEEDED, 1);
        state.buckets.rollback_succeeded.push(handle);
        state.settle_rollback(effects);
    }

    fn on_rollback_failed(
        &self,
        state: &mut GenerationState,
        handle: &TaskHandle,
        effects: &mut Effects,
    ) {
        assert!(
            state.status == GenerationStatus::Aborted,
            "{} received a rollback outcome in status {:?}",
            self.id,
            state.status
        );
        let Some(handle) = take(&mut state.buckets.rolling_back, handle.id()) else {
            return;
        };
        let failures = handle.rollback_failures();
        if handle.task().should_retry_rollback(failures) {
            debug!("Retrying rollback of {} after {} failures", handle.id(), failures);
            self.metrics.incr(names::ROLLBACK_RETRIED, 1);
            state.compensate(handle, effects);
            return;
        }
        warn!("Rollback of {} failed permanently", handle.id());
        self.metrics.incr(names::ROLLBACK_FAILED, 1);
        state.buckets.rollback_failed.push(handle);
        state.settle_rollback(effects);
    }

    fn apply(self: &Arc<Self>, effects: Effects) {
        for (handle, kind) in effects.jobs {
            self.dispatch(handle, kind);
        }
        if effects.notices.is_empty() {
            return;
        }
        let Some(observer) = self.observer.upgrade() else {
            debug!("{} has no observer, dropping events", self.id);
            return;
        };
        for notice in effects.notices {
            match notice {
                Notice::Finished => observer.generation_finished(self.id),
                Notice::SucceededAll => observer.generation_succeeded_all(self.id),
                Notice::Aborted => observer.generation_aborted(self.id),
                Notice::RollbackCompleted(success) => {
                    info!("{} rollback completed, success: {}", self.id, success);
                    observer.generation_rollback_completed(self.id, success)
                }
            }
        }
    }

    fn dispatch(self: &Arc<Self>, handle: Arc<TaskHandle>, kind: JobKind) {
        let generation = Arc::clone(self);
        self.executor.execute(Box::new(move || {
            let ran = match kind {
                JobKind::Run => handle.execute(),
                JobKind::Rollback => handle.execute_rollback(),
            };
            if ran {
                generation.task_done(&handle);
            }
        }));
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Generation")
            .field("id", &self.id)
            .field("status", &state.status)
            .field("prev", &state.prev)
            .field("next", &state.next)
            .field("buckets", &state.buckets.counts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ManualExecutor;
    use crate::task::{AbortSignal, FnTask, RollbackFailure};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl GenerationObserver for Recorder {
        fn generation_finished(&self, id: GenerationId) {
            self.events.lock().push(format!("finished {}", id));
        }

        fn generation_succeeded_all(&self, id: GenerationId) {
            self.events.lock().push(format!("succeeded {}", id));
        }

        fn generation_aborted(&self, id: GenerationId) {
            self.events.lock().push(format!("aborted {}", id));
        }

        fn generation_rollback_completed(&self, id: GenerationId, success: bool) {
            self.events.lock().push(format!("rollback {} {}", id, success));
        }
    }

    struct Fixture {
        executor: Arc<ManualExecutor>,
        recorder: Arc<Recorder>,
        generation: Arc<Generation>,
        next_task: AtomicU64,
    }

    impl Fixture {
        fn new() -> Self {
            let executor = Arc::new(ManualExecutor::new());
            let recorder = Arc::new(Recorder::default());
            let observer: Arc<dyn GenerationObserver> = recorder.clone();
            let generation = Generation::new(
                GenerationId::new(1),
                executor.clone(),
                Arc::downgrade(&observer),
                Metrics::shared(),
            );
            Self {
                executor,
                recorder,
                generation,
                next_task: AtomicU64::new(1),
            }
        }

        fn handle(&self, task: FnTask) -> Arc<TaskHandle> {
            let id = TaskId::new(self.next_task.fetch_add(1, Ordering::SeqCst));
            TaskHandle::new(id, Arc::new(task))
        }

        fn ok(&self) -> Arc<TaskHandle> {
            self.handle(FnTask::new(1, || Ok(Bytes::new())))
        }
    }

    // ==================== Forward Tests ====================

    #[test]
    fn test_fire_dispatches_in_enqueue_order() {
        let fx = Fixture::new();
        let a = fx.ok();
        let b = fx.ok();
        fx.generation.enqueue(a.clone()).unwrap();
        fx.generation.enqueue(b.clone()).unwrap();
        assert_eq!(fx.executor.pending(), 0);
        assert_eq!(fx.generation.bucket_counts().new, 2);

        fx.generation.fire();
        assert_eq!(fx.generation.status(), GenerationStatus::Running);
        assert_eq!(fx.executor.pending(), 2);

        fx.executor.run_next();
        assert_eq!(a.status(), TaskStatus::Normal);
        assert_eq!(b.status(), TaskStatus::New);

        fx.executor.run_until_idle();
        assert_eq!(fx.generation.status(), GenerationStatus::SucceededAll);
        assert_eq!(fx.recorder.events(), vec!["succeeded gen#1"]);
    }

    #[test]
    fn test_succeeded_all_reopens() {
        let fx = Fixture::new();
        fx.generation.enqueue(fx.ok()).unwrap();
        fx.generation.fire();
        fx.executor.run_until_idle();
        assert_eq!(fx.generation.status(), GenerationStatus::SucceededAll);

        fx.generation.enqueue(fx.ok()).unwrap();
        assert_eq!(fx.generation.status(), GenerationStatus::Running);
        fx.executor.run_until_idle();
        assert_eq!(fx.generation.status(), GenerationStatus::SucceededAll);
        assert_eq!(fx.generation.bucket_counts().normal, 2);
    }

    #[test]
    fn test_set_next_closes_generation() {
        let fx = Fixture::new();
        fx.generation.enqueue(fx.ok()).unwrap();
        fx.generation.fire();

        assert!(!fx.generation.set_next(GenerationId::new(2)));
        assert_eq!(fx.generation.status(), GenerationStatus::Completing);
        assert!(matches!(
            fx.generation.enqueue(fx.ok()),
            Err(ExecuteError::GenerationClosed(_))
        ));

        fx.executor.run_until_idle();
        assert_eq!(fx.generation.status(), GenerationStatus::Finished);
        assert_eq!(fx.recorder.events(), vec!["finished gen#1"]);
    }

    #[test]
    fn test_set_next_after_success_finishes() {
        let fx = Fixture::new();
        fx.generation.enqueue(fx.ok()).unwrap();
        fx.generation.fire();
        fx.executor.run_until_idle();

        assert!(fx.generation.set_next(GenerationId::new(3)));
        assert_eq!(fx.generation.status(), GenerationStatus::Finished);
        assert_eq!(fx.generation.next(), Some(GenerationId::new(3)));
    }

    #[test]
    fn test_fire_with_successor_linked() {
        let fx = Fixture::new();
        fx.generation.enqueue(fx.ok()).unwrap();
        fx.generation.set_next(GenerationId::new(2));
        fx.generation.fire();
        assert_eq!(fx.generation.status(), GenerationStatus::Completing);
        fx.executor.run_until_idle();
        assert_eq!(fx.generation.status(), GenerationStatus::Finished);
    }

    #[test]
    fn test_spurious_notification_ignored() {
        let fx = Fixture::new();
        let handle = fx.ok();
        fx.generation.enqueue(handle.clone()).unwrap();
        fx.generation.fire();

        fx.generation.task_done(&handle);
        assert_eq!(fx.generation.bucket_counts().running, 1);
    }

    // ==================== Rollback Tests ====================

    #[test]
    fn test_abort_cancels_unstarted_and_compensates_ran() {
        let fx = Fixture::new();
        let done = fx.ok();
        let failing = fx.handle(FnTask::new(1, || Err(AbortSignal::new("bad input"))));
        let unstarted = fx.ok();
        for h in [&done, &failing, &unstarted] {
            fx.generation.enqueue((*h).clone()).unwrap();
        }
        fx.generation.fire();

        fx.executor.run_next();
        fx.executor.run_next();
        assert_eq!(fx.generation.status(), GenerationStatus::Aborted);
        assert!(unstarted.was_cancelled());

        fx.executor.run_until_idle();
        assert_eq!(fx.generation.status(), GenerationStatus::RolledBack);
        assert_eq!(done.status(), TaskStatus::RollbackSucceeded);
        assert_eq!(failing.status(), TaskStatus::RollbackSucceeded);
        assert_eq!(unstarted.status(), TaskStatus::Abort);

        let counts = fx.generation.bucket_counts();
        assert_eq!(counts.rollback_succeeded, 2);
        assert_eq!(counts.cancelled, 1);
        assert_eq!(
            fx.recorder.events(),
            vec!["aborted gen#1", "rollback gen#1 true"]
        );
    }

    #[test]
    fn test_outer_rollback_compensates_normal_tasks() {
        let fx = Fixture::new();
        fx.generation.enqueue(fx.ok()).unwrap();
        fx.generation.enqueue(fx.ok()).unwrap();
        fx.generation.fire();
        fx.generation.set_next(GenerationId::new(2));
        fx.executor.run_until_idle();

        fx.generation.rollback(false);
        assert_eq!(fx.generation.bucket_counts().rolling_back, 2);
        fx.executor.run_until_idle();

        assert_eq!(fx.generation.status(), GenerationStatus::RolledBack);
        assert_eq!(fx.generation.bucket_counts().rollback_succeeded, 2);
        fx.generation.rollback(false);
        assert_eq!(fx.executor.pending(), 0);
    }

    #[test]
    fn test_rollback_retry_then_failure() {
        let fx = Fixture::new();
        let stubborn = fx.handle(
            FnTask::new(1, || Ok(Bytes::new()))
                .with_rollback(|| Err(RollbackFailure::new("row locked")))
                .with_rollback_retries(1),
        );
        fx.generation.enqueue(stubborn.clone()).unwrap();
        fx.generation.fire();
        fx.executor.run_until_idle();

        fx.generation.rollback(false);
        fx.executor.run_until_idle();

        assert_eq!(stubborn.rollback_failures(), 2);
        assert_eq!(fx.generation.status(), GenerationStatus::RollbackFailed);
        assert_eq!(fx.generation.rollback_failed_tasks(), vec![stubborn.id()]);
        assert_eq!(fx.recorder.events().last().unwrap(), "rollback gen#1 false");
    }

    #[test]
    fn test_enqueue_after_abort_rejected() {
        let fx = Fixture::new();
        fx.generation.enqueue(fx.ok()).unwrap();
        fx.generation.rollback(true);
        assert!(matches!(
            fx.generation.enqueue(fx.ok()),
            Err(ExecuteError::GenerationAborted(_))
        ));
        assert_eq!(fx.generation.status(), GenerationStatus::RolledBack);
        assert_eq!(fx.generation.bucket_counts().cancelled, 1);
    }

    #[test]
    #[should_panic(expected = "rollback outcome")]
    fn test_rollback_outcome_outside_abort_panics() {
        let fx = Fixture::new();
        let handle = fx.ok();
        fx.generation.enqueue(handle.clone()).unwrap();
        fx.generation.fire();
        fx.executor.run_until_idle();

        handle.prepare_rollback();
        handle.execute_rollback();
        fx.generation.task_done(&handle);
    }
}
