//! Three-stage admission loop

use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::resource::ResourceManager;
use crate::transaction::{Transaction, TxnStage};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dtx_lock::ClaimLedger;
use dtx_metrics::{names, timed, Metrics};
use dtx_primitives::TxnId;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A transaction rejected by the allocation loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTransaction {
    /// Transaction id
    pub id: TxnId,
    /// Why allocation failed
    pub reason: String,
}

/// Ledger that drives transaction counters from table callbacks
struct StageLedger<'a> {
    registry: &'a DashMap<TxnId, Arc<Transaction>>,
    runnable: Vec<Arc<Transaction>>,
}

impl<'a> StageLedger<'a> {
    fn new(registry: &'a DashMap<TxnId, Arc<Transaction>>) -> Self {
        Self {
            registry,
            runnable: Vec::new(),
        }
    }
}

impl ClaimLedger for StageLedger<'_> {
    fn claim_queued(&mut self, txn: TxnId) {
        if let Some(entry) = self.registry.get(&txn) {
            entry.claim_queued();
        }
    }

    fn claim_resolved(&mut self, txn: TxnId) {
        if let Some(entry) = self.registry.get(&txn) {
            if entry.claim_resolved() {
                self.runnable.push(Arc::clone(entry.value()));
            }
        }
    }

    fn claims_dropped(&mut self, txn: TxnId, _count: usize) {
        if let Some(entry) = self.registry.get(&txn) {
            entry.clear_pending();
        }
    }
}

/// State shared between the handle and the allocation loop
struct Shared {
    config: SchedulerConfig,
    resources: Arc<ResourceManager>,
    registry: DashMap<TxnId, Arc<Transaction>>,
    parked: Arc<Semaphore>,
    ready_tx: mpsc::Sender<Arc<Transaction>>,
    failure_tx: mpsc::UnboundedSender<FailedTransaction>,
    failed: Mutex<Vec<FailedTransaction>>,
    metrics: Arc<Metrics>,
}

impl Shared {
    async fn run(
        self: Arc<Self>,
        mut unallocated: mpsc::Receiver<Arc<Transaction>>,
        mut release: mpsc::UnboundedReceiver<TxnId>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if *shutdown.borrow() {
            return;
        }
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                Some(id) = release.recv() => self.release(id).await,
                Some(txn) = unallocated.recv(), if self.parked.available_permits() > 0 => {
                    self.allocate(txn).await
                }
                else => break,
            }
        }
        info!("Scheduler loop stopped");
    }

    async fn allocate(&self, txn: Arc<Transaction>) {
        if txn.stage() != TxnStage::Unallocated {
            debug!("Skipping {} in stage {:?}", txn.id(), txn.stage());
            return;
        }
        let Ok(permit) = Arc::clone(&self.parked).acquire_owned().await else {
            return;
        };

        let mut ledger = StageLedger::new(&self.registry);
        let result = timed!(self.metrics, names::HIST_ALLOCATION, {
            self.apply_ranges(&txn, &mut ledger)
        });

        match result {
            Err(err) => self.fail(&txn, err, &mut ledger),
            Ok(()) => {
                if txn.mark_allocated() {
                    debug!("{} granted on first allocation", txn.id());
                    ledger.runnable.push(Arc::clone(&txn));
                } else if txn.park(permit) {
                    debug!("{} parked with {} queued claims", txn.id(), txn.pending());
                    self.metrics.incr(names::TXN_PARKED, 1);
                }
            }
        }

        let runnable = std::mem::take(&mut ledger.runnable);
        self.promote(runnable).await;
    }

    fn apply_ranges(&self, txn: &Transaction, ledger: &mut StageLedger<'_>) -> SchedulerResult<()> {
        let tables = txn.tables();
        for name in tables.keys() {
            if self.resources.table(name).is_none() {
                return Err(SchedulerError::UnknownTable(name.to_string()));
            }
        }
        for (name, requests) in &tables {
            if let Some(table) = self.resources.table(name) {
                table.apply(txn.id(), requests, ledger)?;
            }
        }
        Ok(())
    }

    fn fail(&self, txn: &Transaction, err: SchedulerError, ledger: &mut StageLedger<'_>) {
        warn!("Allocation of {} failed: {}", txn.id(), err);
        self.registry.remove(&txn.id());
        for name in txn.tables().keys() {
            if let Some(table) = self.resources.table(name) {
                table.release(txn.id(), ledger);
            }
        }
        txn.advance(&[TxnStage::Unallocated], TxnStage::Failed);

        let failed = FailedTransaction {
            id: txn.id(),
            reason: err.to_string(),
        };
        self.failed.lock().push(failed.clone());
        let _ = self.failure_tx.send(failed);
        self.metrics.incr(names::TXN_FAILED, 1);
    }

    async fn release(&self, id: TxnId) {
        let Some((_, txn)) = self.registry.remove(&id) else {
            debug!("{} already released", id);
            return;
        };

        let mut ledger = StageLedger::new(&self.registry);
        for name in txn.tables().keys() {
            if let Some(table) = self.resources.table(name) {
                table.release(id, &mut ledger);
            }
        }
        txn.advance(
            &[TxnStage::Unallocated, TxnStage::Parked, TxnStage::Ready],
            TxnStage::Released,
        );
        txn.unpark();
        self.metrics.incr(names::TXN_RELEASED, 1);
        debug!("{} released, {} transactions woken", id, ledger.runnable.len());

        let runnable = std::mem::take(&mut ledger.runnable);
        self.promote(runnable).await;
    }

    /// Hand newly runnable transactions to the ready stage
    async fn promote(&self, runnable: Vec<Arc<Transaction>>) {
        for txn in runnable {
            if !txn.advance(&[TxnStage::Unallocated, TxnStage::Parked], TxnStage::Ready) {
                continue;
            }
            txn.unpark();
            self.metrics.incr(names::TXN_READY, 1);
            self.metrics.observe(names::HIST_WAIT, txn.age());
            let id = txn.id();
            if self.ready_tx.send(txn).await.is_err() {
                warn!("Ready queue closed, dropping {}", id);
            }
        }
        self.metrics.gauge(names::GAUGE_PARKED, self.parked_count() as i64);
    }

    fn parked_count(&self) -> usize {
        self.config
            .allocated_capacity
            .max(1)
            .saturating_sub(self.parked.available_permits())
    }
}

struct Receivers {
    unallocated: mpsc::Receiver<Arc<Transaction>>,
    release: mpsc::UnboundedReceiver<TxnId>,
    ready: mpsc::Receiver<Arc<Transaction>>,
}

/// Admits transactions once every range they request is granted
pub struct Scheduler {
    shared: Arc<Shared>,
    unallocated_tx: mpsc::Sender<Arc<Transaction>>,
    release_tx: mpsc::UnboundedSender<TxnId>,
    receivers: Mutex<Option<Receivers>>,
    failure_rx: Mutex<Option<mpsc::UnboundedReceiver<FailedTransaction>>>,
    shutdown: watch::Sender<bool>,
    running: Arc<RwLock<bool>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a scheduler with its own metrics store
    pub fn new(config: SchedulerConfig, resources: Arc<ResourceManager>) -> Self {
        Self::with_metrics(config, resources, Metrics::shared())
    }

    /// Create a scheduler recording into `metrics`
    pub fn with_metrics(
        config: SchedulerConfig,
        resources: Arc<ResourceManager>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (unallocated_tx, unallocated_rx) = mpsc::channel(config.unallocated_capacity.max(1));
        let (ready_tx, ready_rx) = mpsc::channel(config.ready_capacity.max(1));
        let (release_tx, release_rx) = mpsc::unbounded_channel();
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            parked: Arc::new(Semaphore::new(config.allocated_capacity.max(1))),
            config,
            resources,
            registry: DashMap::new(),
            ready_tx,
            failure_tx,
            failed: Mutex::new(Vec::new()),
            metrics,
        });

        Self {
            shared,
            unallocated_tx,
            release_tx,
            receivers: Mutex::new(Some(Receivers {
                unallocated: unallocated_rx,
                release: release_rx,
                ready: ready_rx,
            })),
            failure_rx: Mutex::new(Some(failure_rx)),
            shutdown,
            running: Arc::new(RwLock::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the allocation loop and return the ready stage
    ///
    /// Must be called from within a tokio runtime. A scheduler runs once;
    /// starting it again fails.
    pub fn start(&self) -> SchedulerResult<mpsc::Receiver<Arc<Transaction>>> {
        let mut running = self.running.write();
        if *running {
            return Err(SchedulerError::AlreadyRunning);
        }
        let receivers = self.receivers.lock().take().ok_or(SchedulerError::Stopped)?;
        *running = true;

        let shared = Arc::clone(&self.shared);
        let shutdown = self.shutdown.subscribe();
        let running_flag = Arc::clone(&self.running);
        let handle = tokio::spawn(async move {
            shared
                .run(receivers.unallocated, receivers.release, shutdown)
                .await;
            *running_flag.write() = false;
        });
        *self.handle.lock() = Some(handle);

        info!(
            "Scheduler started with {} tables",
            self.shared.resources.len()
        );
        Ok(receivers.ready)
    }

    /// Take the stream of transactions rejected by the allocation loop
    pub fn take_failures(&self) -> Option<mpsc::UnboundedReceiver<FailedTransaction>> {
        self.failure_rx.lock().take()
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Stop the allocation loop
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
        *self.running.write() = false;
        info!("Scheduler stop requested");
    }

    /// Wait for the allocation loop to exit after [`stop`](Self::stop)
    pub async fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn register(&self, txn: Transaction) -> SchedulerResult<Arc<Transaction>> {
        let txn = Arc::new(txn);
        match self.shared.registry.entry(txn.id()) {
            Entry::Occupied(_) => Err(SchedulerError::DuplicateTransaction(txn.id())),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&txn));
                self.shared.metrics.incr(names::TXN_SCHEDULED, 1);
                Ok(txn)
            }
        }
    }

    /// Queue a transaction for allocation, waiting while the queue is full
    pub async fn schedule(&self, txn: Transaction) -> SchedulerResult<Arc<Transaction>> {
        let txn = self.register(txn)?;
        if self.unallocated_tx.send(Arc::clone(&txn)).await.is_err() {
            self.shared.registry.remove(&txn.id());
            return Err(SchedulerError::Stopped);
        }
        debug!("Scheduled {} with {} ranges", txn.id(), txn.ranges().len());
        Ok(txn)
    }

    /// Queue a transaction for allocation without waiting
    pub fn try_schedule(&self, txn: Transaction) -> SchedulerResult<Arc<Transaction>> {
        let txn = self.register(txn)?;
        match self.unallocated_tx.try_send(Arc::clone(&txn)) {
            Ok(()) => Ok(txn),
            Err(err) => {
                self.shared.registry.remove(&txn.id());
                match err {
                    mpsc::error::TrySendError::Full(_) => Err(SchedulerError::QueueFull),
                    mpsc::error::TrySendError::Closed(_) => Err(SchedulerError::Stopped),
                }
            }
        }
    }

    /// Return the ranges of a finished transaction
    ///
    /// Completing an unknown or already completed transaction is a no-op.
    pub fn complete(&self, id: TxnId) -> SchedulerResult<()> {
        self.release_tx
            .send(id)
            .map_err(|_| SchedulerError::Stopped)
    }

    /// Look up a scheduled transaction
    pub fn transaction(&self, id: TxnId) -> Option<Arc<Transaction>> {
        self.shared.registry.get(&id).map(|t| Arc::clone(t.value()))
    }

    /// Number of transactions in the scheduler
    pub fn len(&self) -> usize {
        self.shared.registry.len()
    }

    /// Whether no transaction is in the scheduler
    pub fn is_empty(&self) -> bool {
        self.shared.registry.is_empty()
    }

    /// Number of parked transactions
    pub fn parked_count(&self) -> usize {
        self.shared.parked_count()
    }

    /// Transactions rejected so far
    pub fn failed(&self) -> Vec<FailedTransaction> {
        self.shared.failed.lock().clone()
    }

    /// Lock tables
    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.shared.resources
    }

    /// Metrics store
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.shared.metrics
    }

    /// Stage capacities
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
