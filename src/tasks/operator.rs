use super::{RunInfo, TaskOutcome, TaskReport, TaskType};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::future::poll_fn;
use futures::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::error::Error as StdError;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Once;
use tracing::{debug, error};

thread_local! {
    static CATCHING: Cell<usize> = const { Cell::new(0) };
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static BACKTRACE_HOOK: Once = Once::new();

/// Wraps the process panic hook once. Panics raised while an operator is
/// being polled record a backtrace for [`TaskOperator::run_task`]; all
/// others go to the previous hook.
fn install_backtrace_hook() {
    BACKTRACE_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if CATCHING.with(Cell::get) > 0 {
                let backtrace = Backtrace::force_capture().to_string();
                PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            } else {
                previous(info);
            }
        }));
    });
}

/// Marks the current thread as polling an operator until dropped
struct CatchScope;

impl CatchScope {
    fn enter() -> Self {
        CATCHING.with(|c| c.set(c.get() + 1));
        CatchScope
    }
}

impl Drop for CatchScope {
    fn drop(&mut self) {
        CATCHING.with(|c| c.set(c.get().saturating_sub(1)));
    }
}

fn take_panic_backtrace() -> Option<String> {
    PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

/// Mutable state of one operator run
#[derive(Debug)]
pub struct TaskRun {
    task_id: i64,
    linked_url_ids: Vec<i64>,
}

impl TaskRun {
    pub fn new(task_id: i64) -> Self {
        Self {
            task_id,
            linked_url_ids: Vec::new(),
        }
    }

    pub fn task_id(&self) -> i64 {
        self.task_id
    }

    /// Record URLs this run processed; repeated ids are kept once
    pub fn link_urls_to_task(&mut self, url_ids: impl IntoIterator<Item = i64>) {
        for id in url_ids {
            if !self.linked_url_ids.contains(&id) {
                self.linked_url_ids.push(id);
            }
        }
    }

    pub fn linked_url_ids(&self) -> &[i64] {
        &self.linked_url_ids
    }
}

/// A unit of enrichment work the task manager can schedule.
///
/// Implementors supply the prerequisite check and the inner logic;
/// [`TaskOperator::run_task`] is the only place where their errors and
/// panics are turned into data.
#[async_trait]
pub trait TaskOperator: Send + Sync {
    fn task_type(&self) -> TaskType;

    /// Cheap, side-effect free check for eligible work
    async fn meets_task_prerequisites(&self) -> Result<bool>;

    /// Do the work, linking every processed URL through `run`
    async fn inner_task_logic(&self, run: &mut TaskRun) -> Result<TaskReport>;

    /// Whether a completed run must have linked at least one URL
    fn links_urls(&self) -> bool {
        true
    }

    async fn run_task(&self, task_id: i64) -> RunInfo {
        let task_type = self.task_type();
        let mut run = TaskRun::new(task_id);

        install_backtrace_hook();
        take_panic_backtrace();
        let mut inner = self.inner_task_logic(&mut run);
        // Scoped per poll: the future may resume on another worker thread
        let traced = poll_fn(move |cx| {
            let _scope = CatchScope::enter();
            inner.as_mut().poll(cx)
        });
        let caught = AssertUnwindSafe(traced).catch_unwind().await;
        let result = match caught {
            Ok(Ok(TaskReport::NoEligibleUrls)) => Ok("No eligible URLs".to_string()),
            Ok(Ok(TaskReport::Completed(_))) if self.links_urls() && run.linked_url_ids().is_empty() => {
                Err(Error::UnlinkedTask)
            }
            Ok(Ok(TaskReport::Completed(summary))) => Ok(summary),
            Ok(Err(e)) => Err(e),
            Err(payload) => Err(Error::TaskPanicked(with_backtrace(
                panic_message(payload),
                take_panic_backtrace(),
            ))),
        };

        let (outcome, message) = match result {
            Ok(summary) => {
                debug!("Task {} ({}) succeeded: {}", task_id, task_type, summary);
                (TaskOutcome::Success, summary)
            }
            Err(e) => {
                let message = error_chain(&e);
                error!("Task {} ({}) failed: {}", task_id, task_type, message);
                (TaskOutcome::Error, message)
            }
        };

        RunInfo {
            task_id,
            task_type,
            outcome,
            message,
            linked_url_ids: run.linked_url_ids.clone(),
        }
    }
}

/// Render an error with every cause in its source chain
pub fn error_chain(err: &Error) -> String {
    let mut message = err.to_string();
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "operator panicked".to_string()
    }
}

fn with_backtrace(message: String, backtrace: Option<String>) -> String {
    match backtrace {
        Some(backtrace) => format!("{}\n\nstack backtrace:\n{}", message, backtrace),
        None => message,
    }
}
