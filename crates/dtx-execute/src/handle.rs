//! Per-task execution handle

use crate::task::{AbortSignal, RollbackFailure, TaskOutput, UnitTask};
use dtx_primitives::TaskId;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Status of a task handle
///
/// Forward path: `New -> Running -> Normal | Abort`, or `New -> Abort` when
/// cancelled. Compensation path: `RollbackNew -> RollingBack ->
/// RollbackSucceeded | RollbackFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Not started
    New,
    /// Forward action executing
    Running,
    /// Forward action completed
    Normal,
    /// Forward action aborted or the task was cancelled
    Abort,
    /// Compensation queued
    RollbackNew,
    /// Compensation executing
    RollingBack,
    /// Compensation completed
    RollbackSucceeded,
    /// Compensation failed
    RollbackFailed,
}

impl TaskStatus {
    /// Whether a generation has to act on this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Normal
                | TaskStatus::Abort
                | TaskStatus::RollbackSucceeded
                | TaskStatus::RollbackFailed
        )
    }
}

struct HandleState {
    status: TaskStatus,
    output: Option<TaskOutput>,
    abort: Option<AbortSignal>,
    cancelled: bool,
    rollback_failures: u32,
    last_rollback_error: Option<RollbackFailure>,
}

/// Wraps one [`UnitTask`] and tracks its progress
pub struct TaskHandle {
    id: TaskId,
    task: Arc<dyn UnitTask>,
    state: Mutex<HandleState>,
}

impl TaskHandle {
    /// Wrap `task`
    pub fn new(id: TaskId, task: Arc<dyn UnitTask>) -> Arc<Self> {
        Arc::new(Self {
            id,
            task,
            state: Mutex::new(HandleState {
                status: TaskStatus::New,
                output: None,
                abort: None,
                cancelled: false,
                rollback_failures: 0,
                last_rollback_error: None,
            }),
        })
    }

    /// Task id
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Priority of the wrapped task
    pub fn priority(&self) -> u32 {
        self.task.priority()
    }

    /// Wrapped task
    pub fn task(&self) -> &Arc<dyn UnitTask> {
        &self.task
    }

    /// Current status
    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    /// Output of a normal run
    pub fn output(&self) -> Option<TaskOutput> {
        self.state.lock().output.clone()
    }

    /// Abort signal of an aborted run
    pub fn abort_signal(&self) -> Option<AbortSignal> {
        self.state.lock().abort.clone()
    }

    /// Whether the task was cancelled before it started
    pub fn was_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Number of failed compensation attempts
    pub fn rollback_failures(&self) -> u32 {
        self.state.lock().rollback_failures
    }

    /// Error of the last failed compensation attempt
    pub fn last_rollback_error(&self) -> Option<RollbackFailure> {
        self.state.lock().last_rollback_error.clone()
    }

    /// Run the forward action, false if the task was cancelled first
    pub(crate) fn execute(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.status != TaskStatus::New {
                return false;
            }
            state.status = TaskStatus::Running;
        }

        let result = catch_unwind(AssertUnwindSafe(|| self.task.run()))
            .unwrap_or_else(|_| Err(AbortSignal::new("task panicked")));

        let mut state = self.state.lock();
        match result {
            Ok(output) => {
                state.status = TaskStatus::Normal;
                state.output = Some(output);
            }
            Err(signal) => {
                debug!("{} aborted: {}", self.id, signal.message());
                state.status = TaskStatus::Abort;
                state.abort = Some(signal);
            }
        }
        true
    }

    /// Cancel a task that has not started
    pub(crate) fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != TaskStatus::New {
            return false;
        }
        state.status = TaskStatus::Abort;
        state.cancelled = true;
        state.abort = Some(AbortSignal::new("cancelled"));
        true
    }

    /// Queue the compensation
    pub(crate) fn prepare_rollback(&self) {
        self.state.lock().status = TaskStatus::RollbackNew;
    }

    /// Run the compensation, false if it was not queued
    pub(crate) fn execute_rollback(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.status != TaskStatus::RollbackNew {
                return false;
            }
            state.status = TaskStatus::RollingBack;
        }

        let result = catch_unwind(AssertUnwindSafe(|| self.task.rollback()))
            .unwrap_or_else(|_| Err(RollbackFailure::new("rollback panicked")));

        let mut state = self.state.lock();
        match result {
            Ok(()) => state.status = TaskStatus::RollbackSucceeded,
            Err(failure) => {
                state.rollback_failures += 1;
                warn!(
                    "{} rollback attempt {} failed: {}",
                    self.id,
                    state.rollback_failures,
                    failure.message()
                );
                state.status = TaskStatus::RollbackFailed;
                state.last_rollback_error = Some(failure);
            }
        }
        true
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("priority", &self.priority())
            .field("status", &self.status())
            .finish()
    }
}
