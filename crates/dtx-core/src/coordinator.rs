//! Caller-facing coordinator
//!
//! Each transaction moves through three phases. While it waits for its
//! ranges, submitted tasks are buffered and ordering is checked here. Once
//! the scheduler reports it ready, the buffer is drained into its
//! book-keeping and later submissions go straight through. When the outcome
//! is known the book-keeping listener releases the ranges and publishes the
//! outcome to [`Coordinator::wait_outcome`].

use crate::config::CoordinatorConfig;
use crate::error::{CoreError, CoreResult};
use dashmap::DashMap;
use dtx_execute::{
    ExecuteError, RayonExecutor, TaskExecutor, TransactionBookKeeping, TransactionOutcome,
    UnitTask,
};
use dtx_metrics::{Metrics, MetricsSnapshot};
use dtx_primitives::{TxnId, UniqueIdGenerator};
use dtx_scheduler::{
    FailedTransaction, RangeRequest, ResourceManager, Scheduler, Transaction,
};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type OutcomeSlot = Option<Result<TransactionOutcome, String>>;

enum Phase {
    /// Ranges not yet granted
    Waiting {
        plan: Vec<Arc<dyn UnitTask>>,
        max_priority: Option<u32>,
        sealed: bool,
    },
    /// Tasks flow into the book-keeping
    Running,
    /// Allocation rejected the transaction
    Failed(String),
}

struct TxnEntry {
    book: Arc<TransactionBookKeeping>,
    phase: Mutex<Phase>,
    outcome: watch::Sender<OutcomeSlot>,
}

impl TxnEntry {
    fn new(book: Arc<TransactionBookKeeping>) -> Arc<Self> {
        let (outcome, _) = watch::channel(None);
        Arc::new(Self {
            book,
            phase: Mutex::new(Phase::Waiting {
                plan: Vec::new(),
                max_priority: None,
                sealed: false,
            }),
            outcome,
        })
    }

    fn txn(&self) -> TxnId {
        self.book.txn()
    }

    /// Drain the buffered plan once the ranges are granted
    fn activate(&self) {
        let mut phase = self.phase.lock();
        let (plan, sealed) = match std::mem::replace(&mut *phase, Phase::Running) {
            Phase::Waiting { plan, sealed, .. } => (plan, sealed),
            other => {
                *phase = other;
                warn!("{} reported ready twice", self.txn());
                return;
            }
        };

        debug!("{} runnable with {} buffered tasks", self.txn(), plan.len());
        for task in plan {
            match self.book.submit_unit_task(task) {
                Ok(_) => {}
                Err(ExecuteError::Aborted(_)) => {
                    debug!("{} aborted while draining its plan", self.txn());
                    break;
                }
                Err(err) => {
                    warn!("{} rejected a buffered task: {}", self.txn(), err);
                    break;
                }
            }
        }
        if sealed {
            self.book.seal();
        }
    }

    fn fail(&self, reason: String) {
        *self.phase.lock() = Phase::Failed(reason.clone());
        self.outcome.send_replace(Some(Err(reason)));
    }
}

/// Routes scheduler output to transaction entries
struct Dispatcher {
    txns: Arc<DashMap<TxnId, Arc<TxnEntry>>>,
    scheduler: Arc<Scheduler>,
}

impl Dispatcher {
    async fn run(
        self,
        mut ready: mpsc::Receiver<Arc<Transaction>>,
        mut failures: mpsc::UnboundedReceiver<FailedTransaction>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                Some(txn) = ready.recv() => self.on_ready(txn.id()),
                Some(failed) = failures.recv() => self.on_failed(failed),
                else => break,
            }
        }
        debug!("Dispatcher exited");
    }

    fn on_ready(&self, txn: TxnId) {
        let entry = self.txns.get(&txn).map(|e| Arc::clone(e.value()));
        match entry {
            Some(entry) => entry.activate(),
            None => {
                warn!("{} ready without an entry, releasing", txn);
                if let Err(err) = self.scheduler.complete(txn) {
                    warn!("Failed to release {}: {}", txn, err);
                }
            }
        }
    }

    fn on_failed(&self, failed: FailedTransaction) {
        let entry = self.txns.get(&failed.id).map(|e| Arc::clone(e.value()));
        if let Some(entry) = entry {
            entry.fail(failed.reason);
        }
    }
}

/// Submission API over the scheduler and the worker pool
pub struct Coordinator {
    config: CoordinatorConfig,
    scheduler: Arc<Scheduler>,
    executor: Arc<dyn TaskExecutor>,
    metrics: Arc<Metrics>,
    ids: UniqueIdGenerator,
    txns: Arc<DashMap<TxnId, Arc<TxnEntry>>>,
    running: Arc<RwLock<bool>>,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Create a coordinator with a rayon worker pool
    pub fn new(config: CoordinatorConfig) -> CoreResult<Self> {
        let executor = Arc::new(RayonExecutor::new(config.executor.worker_threads)?);
        Self::with_executor(config, executor)
    }

    /// Create a coordinator running tasks on `executor`
    pub fn with_executor(
        config: CoordinatorConfig,
        executor: Arc<dyn TaskExecutor>,
    ) -> CoreResult<Self> {
        let metrics = Metrics::shared();
        let resources =
            ResourceManager::from_config(&config.resources, Some(Arc::clone(&metrics)))?;
        let scheduler = Arc::new(Scheduler::with_metrics(
            config.scheduler.clone(),
            Arc::new(resources),
            Arc::clone(&metrics),
        ));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            scheduler,
            executor,
            metrics,
            ids: UniqueIdGenerator::new(),
            txns: Arc::new(DashMap::new()),
            running: Arc::new(RwLock::new(false)),
            shutdown,
            handle: Mutex::new(None),
        })
    }

    /// Start the scheduler and the dispatcher
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> CoreResult<()> {
        let mut running = self.running.write();
        if *running {
            return Err(CoreError::AlreadyRunning);
        }
        let ready = self.scheduler.start()?;
        let failures = self.scheduler.take_failures().ok_or(CoreError::Stopped)?;
        *running = true;

        let dispatcher = Dispatcher {
            txns: Arc::clone(&self.txns),
            scheduler: Arc::clone(&self.scheduler),
        };
        let shutdown = self.shutdown.subscribe();
        let running_flag = Arc::clone(&self.running);
        let handle = tokio::spawn(async move {
            dispatcher.run(ready, failures, shutdown).await;
            *running_flag.write() = false;
        });
        *self.handle.lock() = Some(handle);

        info!(
            "Coordinator started with {} tables",
            self.scheduler.resources().len()
        );
        Ok(())
    }

    /// Stop the dispatcher and the scheduler
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
        self.scheduler.stop();
        *self.running.write() = false;
        info!("Coordinator stopped");
    }

    /// Wait for the dispatcher and the scheduler to exit after [`stop`](Self::stop)
    pub async fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.scheduler.join().await;
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    fn register(&self) -> (TxnId, Arc<TxnEntry>) {
        let txn = self.ids.next_txn_id();
        let book = TransactionBookKeeping::with_metrics(
            txn,
            Arc::clone(&self.executor),
            Arc::clone(&self.metrics),
        );
        let entry = TxnEntry::new(book);

        let weak: Weak<TxnEntry> = Arc::downgrade(&entry);
        let scheduler = Arc::clone(&self.scheduler);
        entry
            .book
            .set_listener(move |txn: TxnId, outcome: &TransactionOutcome| {
                if let Err(err) = scheduler.complete(txn) {
                    warn!("Failed to release {}: {}", txn, err);
                }
                if let Some(entry) = weak.upgrade() {
                    entry.outcome.send_replace(Some(Ok(outcome.clone())));
                }
            });

        self.txns.insert(txn, Arc::clone(&entry));
        (txn, entry)
    }

    /// Queue a new transaction over `ranges`, waiting while the queue is full
    pub async fn schedule(&self, ranges: Vec<RangeRequest>) -> CoreResult<TxnId> {
        let (txn, _entry) = self.register();
        match self.scheduler.schedule(Transaction::new(txn, ranges)).await {
            Ok(_) => Ok(txn),
            Err(err) => {
                self.txns.remove(&txn);
                Err(err.into())
            }
        }
    }

    /// Queue a new transaction over `ranges` without waiting
    pub fn try_schedule(&self, ranges: Vec<RangeRequest>) -> CoreResult<TxnId> {
        let (txn, _entry) = self.register();
        match self.scheduler.try_schedule(Transaction::new(txn, ranges)) {
            Ok(_) => Ok(txn),
            Err(err) => {
                self.txns.remove(&txn);
                Err(err.into())
            }
        }
    }

    fn entry(&self, txn: TxnId) -> CoreResult<Arc<TxnEntry>> {
        self.txns
            .get(&txn)
            .map(|e| Arc::clone(e.value()))
            .ok_or(CoreError::UnknownTransaction(txn))
    }

    /// Add a task to the transaction
    ///
    /// Tasks submitted before the ranges are granted are buffered and run
    /// once the transaction is ready. Priorities must not decrease.
    pub fn submit_unit_task(&self, txn: TxnId, task: Arc<dyn UnitTask>) -> CoreResult<()> {
        let entry = self.entry(txn)?;
        let mut phase = entry.phase.lock();
        match &mut *phase {
            Phase::Waiting {
                plan,
                max_priority,
                sealed,
            } => {
                if *sealed {
                    return Err(ExecuteError::Sealed(txn).into());
                }
                let priority = task.priority();
                if let Some(current) = *max_priority {
                    if priority < current {
                        return Err(ExecuteError::PriorityRegression { priority, current }.into());
                    }
                }
                *max_priority = Some(priority);
                plan.push(task);
                Ok(())
            }
            Phase::Running => {
                entry.book.submit_unit_task(task)?;
                Ok(())
            }
            Phase::Failed(reason) => Err(CoreError::AllocationFailed {
                txn,
                reason: reason.clone(),
            }),
        }
    }

    /// Declare that the transaction has no more tasks
    ///
    /// It commits once its last generation succeeds. Finishing a transaction
    /// that failed allocation is a no-op.
    pub fn finish(&self, txn: TxnId) -> CoreResult<()> {
        let entry = self.entry(txn)?;
        let mut phase = entry.phase.lock();
        match &mut *phase {
            Phase::Waiting { sealed, .. } => *sealed = true,
            Phase::Running => entry.book.seal(),
            Phase::Failed(_) => {}
        }
        Ok(())
    }

    /// Release every range held by the transaction
    ///
    /// Runs automatically when the outcome is known; calling it again is a
    /// no-op.
    pub fn complete(&self, txn: TxnId) -> CoreResult<()> {
        self.scheduler.complete(txn)?;
        Ok(())
    }

    /// Wait for the outcome of the transaction and forget it
    pub async fn wait_outcome(&self, txn: TxnId) -> CoreResult<TransactionOutcome> {
        let entry = self.entry(txn)?;
        let mut outcome = entry.outcome.subscribe();
        let mut shutdown = self.shutdown.subscribe();

        let result = loop {
            if let Some(result) = outcome.borrow_and_update().clone() {
                break result;
            }
            if *shutdown.borrow_and_update() {
                return Err(CoreError::Stopped);
            }
            tokio::select! {
                changed = outcome.changed() => {
                    if changed.is_err() {
                        return Err(CoreError::Stopped);
                    }
                }
                _ = shutdown.changed() => {}
            }
        };

        self.txns.remove(&txn);
        result.map_err(|reason| CoreError::AllocationFailed { txn, reason })
    }

    /// Book-keeping of a live transaction
    pub fn book(&self, txn: TxnId) -> Option<Arc<TransactionBookKeeping>> {
        self.txns.get(&txn).map(|e| Arc::clone(&e.book))
    }

    /// Number of live transactions
    pub fn len(&self) -> usize {
        self.txns.len()
    }

    /// Whether no transaction is live
    pub fn is_empty(&self) -> bool {
        self.txns.is_empty()
    }

    /// Snapshot of all metrics
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::from_metrics(&self.metrics)
    }

    /// Scheduler
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Metrics store
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        self.scheduler.stop();
    }
}
