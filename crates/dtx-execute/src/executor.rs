//! Worker pools that run forward and compensating actions

use crate::error::ExecuteResult;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::error;

/// Default number of worker threads
pub const DEFAULT_WORKER_THREADS: usize = 3;

/// A unit of work handed to an executor
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs dispatched by generations
///
/// Implementations must not run the job on the calling thread: generations
/// dispatch while their book-keeping may hold locks.
pub trait TaskExecutor: Send + Sync {
    /// Schedule `job` for execution
    fn execute(&self, job: Job);
}

/// Fixed-size rayon thread pool
pub struct RayonExecutor {
    pool: rayon::ThreadPool,
}

impl RayonExecutor {
    /// Create a pool with `threads` workers
    pub fn new(threads: usize) -> ExecuteResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("dtx-worker-{}", i))
            .panic_handler(|_| error!("Worker job panicked"))
            .build()?;
        Ok(Self { pool })
    }

    /// Create a pool with [`DEFAULT_WORKER_THREADS`] workers
    pub fn with_default_threads() -> ExecuteResult<Self> {
        Self::new(DEFAULT_WORKER_THREADS)
    }

    /// Number of worker threads
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl TaskExecutor for RayonExecutor {
    fn execute(&self, job: Job) {
        self.pool.spawn(job);
    }
}

/// Queues jobs until the caller runs them
///
/// Drives generations step by step, one job at a time, in dispatch order.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<Job>>,
}

impl ManualExecutor {
    /// Create an empty executor
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued jobs
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run the oldest queued job, false when the queue is empty
    pub fn run_next(&self) -> bool {
        let job = self.queue.lock().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run jobs, including those they dispatch, until the queue is empty
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl TaskExecutor for ManualExecutor {
    fn execute(&self, job: Job) {
        self.queue.lock().push_back(job);
    }
}
