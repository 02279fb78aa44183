//! Shared helpers for coordinator integration tests

use bytes::Bytes;
use dtx_core::{AbortSignal, FnTask, UnitTask};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Ordered record of forward and compensating actions
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().iter().any(|e| e == entry)
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }

    /// Task that logs `run <name>` and `undo <name>`
    pub fn task(&self, name: &str, priority: u32) -> Arc<dyn UnitTask> {
        self.build(name, priority, false)
    }

    /// Task that logs `run <name>` and then aborts
    pub fn aborting(&self, name: &str, priority: u32) -> Arc<dyn UnitTask> {
        self.build(name, priority, true)
    }

    fn build(&self, name: &str, priority: u32, aborts: bool) -> Arc<dyn UnitTask> {
        let (run_log, undo_log) = (self.clone(), self.clone());
        let (run_name, undo_name) = (name.to_string(), name.to_string());
        let task = FnTask::new(priority, move || {
            run_log.0.lock().push(format!("run {}", run_name));
            if aborts {
                return Err(AbortSignal::new(format!("{} refused", run_name)));
            }
            Ok(Bytes::from(run_name.clone()))
        })
        .with_rollback(move || {
            undo_log.0.lock().push(format!("undo {}", undo_name));
            Ok(())
        });
        Arc::new(task)
    }
}
