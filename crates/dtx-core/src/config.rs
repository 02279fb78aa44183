//! Coordinator configuration

use crate::error::CoreResult;
use dtx_execute::DEFAULT_WORKER_THREADS;
use dtx_scheduler::{ResourceConfig, SchedulerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorConfig {
    /// Number of worker threads
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

fn default_worker_threads() -> usize {
    DEFAULT_WORKER_THREADS
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
        }
    }
}

/// Complete coordinator configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorConfig {
    /// Lock tables
    pub resources: Vec<ResourceConfig>,
    /// Stage capacities
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Worker pool
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl CoordinatorConfig {
    /// Configuration with default capacities over `resources`
    pub fn new(resources: Vec<ResourceConfig>) -> Self {
        Self {
            resources,
            ..Self::default()
        }
    }

    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON document from a file
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}
