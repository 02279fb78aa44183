//! Generation chain of one transaction

use crate::error::{ExecuteError, ExecuteResult};
use crate::executor::TaskExecutor;
use crate::generation::{Generation, GenerationObserver, GenerationStatus};
use crate::handle::TaskHandle;
use crate::task::UnitTask;
use dtx_metrics::{names, Metrics};
use dtx_primitives::{GenerationId, TaskId, TxnId};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Terminal outcome of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// Every task completed normally
    Committed,
    /// A task aborted and every task that ran was compensated
    RolledBack,
    /// A task aborted and some compensations failed permanently
    RollbackFailed {
        /// Tasks whose compensation failed
        failed_tasks: Vec<TaskId>,
    },
}

impl TransactionOutcome {
    /// Whether the transaction committed
    pub fn is_committed(&self) -> bool {
        matches!(self, TransactionOutcome::Committed)
    }
}

/// Called once with the outcome of a transaction
pub trait OutcomeListener: Send + Sync {
    /// Outcome is known
    fn on_outcome(&self, txn: TxnId, outcome: &TransactionOutcome);
}

impl<F> OutcomeListener for F
where
    F: Fn(TxnId, &TransactionOutcome) + Send + Sync,
{
    fn on_outcome(&self, txn: TxnId, outcome: &TransactionOutcome) {
        self(txn, outcome)
    }
}

#[derive(Default)]
struct BookState {
    generations: BTreeMap<GenerationId, Arc<Generation>>,
    tail: Option<GenerationId>,
    sealed: bool,
    aborted: bool,
    failed_tasks: Vec<TaskId>,
}

impl BookState {
    fn tail(&self) -> Option<&Arc<Generation>> {
        self.tail.and_then(|id| self.generations.get(&id))
    }
}

/// Owns the generations of one transaction
///
/// Tasks are grouped by priority into a chain of generations. The first
/// generation fires on the first submission; each generation fires its
/// successor once all of its tasks succeeded. An abort rolls back the
/// aborting generation and then every earlier one, newest first.
pub struct TransactionBookKeeping {
    txn: TxnId,
    executor: Arc<dyn TaskExecutor>,
    metrics: Arc<Metrics>,
    me: Weak<TransactionBookKeeping>,
    next_task: AtomicU64,
    state: Mutex<BookState>,
    outcome: Mutex<Option<TransactionOutcome>>,
    settled: Condvar,
    listener: Mutex<Option<Box<dyn OutcomeListener>>>,
}

impl TransactionBookKeeping {
    /// Create the book-keeping of `txn`
    pub fn new(txn: TxnId, executor: Arc<dyn TaskExecutor>) -> Arc<Self> {
        Self::with_metrics(txn, executor, Metrics::shared())
    }

    /// Create the book-keeping of `txn` recording into `metrics`
    pub fn with_metrics(
        txn: TxnId,
        executor: Arc<dyn TaskExecutor>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            txn,
            executor,
            metrics,
            me: me.clone(),
            next_task: AtomicU64::new(1),
            state: Mutex::new(BookState::default()),
            outcome: Mutex::new(None),
            settled: Condvar::new(),
            listener: Mutex::new(None),
        })
    }

    /// Transaction id
    pub fn txn(&self) -> TxnId {
        self.txn
    }

    /// Submit a task to the generation of its priority
    ///
    /// Priorities must not decrease. A task with the tail's priority joins
    /// the tail; a higher priority starts a new tail generation.
    pub fn submit_unit_task(&self, task: Arc<dyn UnitTask>) -> ExecuteResult<Arc<TaskHandle>> {
        let priority = task.priority();
        let handle = TaskHandle::new(
            TaskId::new(self.next_task.fetch_add(1, Ordering::Relaxed)),
            task,
        );

        let mut state = self.state.lock();
        if state.sealed {
            return Err(ExecuteError::Sealed(self.txn));
        }
        if state.aborted {
            return Err(ExecuteError::Aborted(self.txn));
        }

        // Generations are enqueued, fired and linked under the book lock so a
        // concurrent submission never observes a created but unfired tail.
        let id = GenerationId::new(priority);
        let current = state.tail;
        match current {
            None => {
                let generation = self.create_generation(&mut state, id, None);
                generation.enqueue(Arc::clone(&handle))?;
                generation.fire();
            }
            Some(tail) if id < tail => {
                return Err(ExecuteError::PriorityRegression {
                    priority,
                    current: tail.priority(),
                });
            }
            Some(tail) if id == tail => {
                if let Some(generation) = state.tail() {
                    generation.enqueue(Arc::clone(&handle))?;
                }
            }
            Some(tail) => {
                let previous = state.tail().cloned();
                if previous.as_ref().is_some_and(|p| p.status().is_aborted()) {
                    return Err(ExecuteError::Aborted(self.txn));
                }
                let generation = self.create_generation(&mut state, id, Some(tail));
                generation.enqueue(Arc::clone(&handle))?;
                if previous.is_some_and(|p| p.set_next(id)) {
                    generation.fire();
                }
            }
        }
        debug!("{} submitted {} at priority {}", self.txn, handle.id(), priority);
        Ok(handle)
    }

    fn create_generation(
        &self,
        state: &mut BookState,
        id: GenerationId,
        prev: Option<GenerationId>,
    ) -> Arc<Generation> {
        let observer: Weak<dyn GenerationObserver> = self.me.clone();
        let generation = Generation::new(
            id,
            Arc::clone(&self.executor),
            observer,
            Arc::clone(&self.metrics),
        );
        if let Some(prev) = prev {
            generation.set_prev(prev);
        }
        state.generations.insert(id, Arc::clone(&generation));
        state.tail = Some(id);
        debug!("{} created {}", self.txn, id);
        generation
    }

    /// Declare that no more tasks will be submitted
    ///
    /// Commits at once when the tail already succeeded or nothing was
    /// submitted.
    pub fn seal(&self) {
        let commit = {
            let mut state = self.state.lock();
            if state.sealed {
                return;
            }
            state.sealed = true;
            match state.tail() {
                None => true,
                Some(tail) => tail.status() == GenerationStatus::SucceededAll,
            }
        };
        debug!("{} sealed", self.txn);
        if commit {
            self.settle(TransactionOutcome::Committed);
        }
    }

    /// Whether [`seal`](Self::seal) was called
    pub fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }

    /// Whether a generation aborted
    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Look up a generation
    pub fn generation(&self, id: GenerationId) -> Option<Arc<Generation>> {
        self.state.lock().generations.get(&id).cloned()
    }

    /// Newest generation
    pub fn tail(&self) -> Option<GenerationId> {
        self.state.lock().tail
    }

    /// Number of generations created
    pub fn generation_count(&self) -> usize {
        self.state.lock().generations.len()
    }

    /// Outcome, if known
    pub fn outcome(&self) -> Option<TransactionOutcome> {
        self.outcome.lock().clone()
    }

    /// Block until the outcome is known or `timeout` passes
    pub fn wait_outcome(&self, timeout: Duration) -> Option<TransactionOutcome> {
        let mut outcome = self.outcome.lock();
        if outcome.is_none() {
            let _ = self
                .settled
                .wait_while_for(&mut outcome, |o| o.is_none(), timeout);
        }
        outcome.clone()
    }

    /// Register the listener called once with the outcome
    ///
    /// Replaces a previous listener. Called at once when the outcome is
    /// already known.
    pub fn set_listener(&self, listener: impl OutcomeListener + 'static) {
        *self.listener.lock() = Some(Box::new(listener));
        let known = self.outcome.lock().clone();
        if let Some(outcome) = known {
            self.notify(&outcome);
        }
    }

    fn notify(&self, outcome: &TransactionOutcome) {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.on_outcome(self.txn, outcome);
        }
    }

    fn settle(&self, outcome: TransactionOutcome) {
        {
            let mut slot = self.outcome.lock();
            if slot.is_some() {
                return;
            }
            *slot = Some(outcome.clone());
        }
        self.settled.notify_all();

        let counter = match &outcome {
            TransactionOutcome::Committed => names::TXN_COMMITTED,
            TransactionOutcome::RolledBack => names::TXN_ROLLED_BACK,
            TransactionOutcome::RollbackFailed { .. } => names::TXN_ROLLBACK_FAILED,
        };
        self.metrics.incr(counter, 1);
        info!("{} settled: {:?}", self.txn, outcome);
        self.notify(&outcome);
    }
}

impl GenerationObserver for TransactionBookKeeping {
    fn generation_finished(&self, id: GenerationId) {
        let next = {
            let state = self.state.lock();
            state
                .generations
                .get(&id)
                .and_then(|g| g.next())
                .and_then(|next| state.generations.get(&next).cloned())
        };
        match next {
            Some(next) => next.fire(),
            None => warn!("{} finished without a successor", id),
        }
    }

    fn generation_succeeded_all(&self, id: GenerationId) {
        let commit = {
            let state = self.state.lock();
            state.sealed && state.tail == Some(id)
        };
        if commit {
            self.settle(TransactionOutcome::Committed);
        }
    }

    fn generation_aborted(&self, id: GenerationId) {
        let mut state = self.state.lock();
        if !state.aborted {
            warn!("{} aborted in {}", self.txn, id);
            state.aborted = true;
        }
    }

    fn generation_rollback_completed(&self, id: GenerationId, success: bool) {
        let (prev, failed_tasks) = {
            let mut state = self.state.lock();
            let generation = state.generations.get(&id).cloned();
            if !success {
                if let Some(generation) = &generation {
                    state.failed_tasks.extend(generation.rollback_failed_tasks());
                }
            }
            let prev = generation
                .and_then(|g| g.prev())
                .and_then(|prev| state.generations.get(&prev).cloned());
            (prev, state.failed_tasks.clone())
        };

        match prev {
            Some(prev) => {
                debug!("{} rolled back, continuing with {}", id, prev.id());
                prev.rollback(false);
            }
            None if failed_tasks.is_empty() => self.settle(TransactionOutcome::RolledBack),
            None => self.settle(TransactionOutcome::RollbackFailed { failed_tasks }),
        }
    }
}

impl fmt::Debug for TransactionBookKeeping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TransactionBookKeeping")
            .field("txn", &self.txn)
            .field("generations", &state.generations.len())
            .field("tail", &state.tail)
            .field("sealed", &state.sealed)
            .field("aborted", &state.aborted)
            .finish()
    }
}
