//! Task orchestration
//!
//! This module provides:
//! - The operator contract and its single failure boundary ([`TaskOperator::run_task`])
//! - The fixed set of URL operators and the loader that resolves it per cycle
//! - The task handler that concludes runs in the store
//! - The sequential task manager, its trigger, and the scheduled registry

mod handler;
mod loader;
mod manager;
mod operator;
pub mod operators;
mod scheduled;
mod trigger;

pub use handler::*;
pub use loader::*;
pub use manager::*;
pub use operator::*;
pub use scheduled::*;
pub use trigger::*;

pub use crate::store::TaskType;

use serde::{Deserialize, Serialize};

/// How an operator run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskOutcome {
    Success,
    Error,
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Success => write!(f, "SUCCESS"),
            TaskOutcome::Error => write!(f, "ERROR"),
        }
    }
}

/// Result of one operator run, handed to the task handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub task_id: i64,
    pub task_type: TaskType,
    pub outcome: TaskOutcome,
    pub message: String,
    pub linked_url_ids: Vec<i64>,
}

impl RunInfo {
    pub fn is_error(&self) -> bool {
        self.outcome == TaskOutcome::Error
    }
}

/// What an operator's logic reports when it returns normally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskReport {
    /// Work was done; the text summarizes it
    Completed(String),
    /// The eligibility query came back empty by the time the run started
    NoEligibleUrls,
}
