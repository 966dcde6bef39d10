use super::{CycleReport, TaskManager};
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// What a trigger call ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerResult {
    /// This call ran one or more cycles; the report is from the last one
    Ran(CycleReport),
    /// A cycle was already running and will go round once more
    Queued,
}

/// Collapses concurrent requests for a task cycle into at most one extra run.
///
/// Only one cycle runs at a time. A request that arrives while a cycle is
/// running sets a flag, and the running caller starts another cycle when
/// it finishes. The requester tries the lock once more after setting the
/// flag, so a runner that released the lock just before the flag was set
/// cannot drop the request.
pub struct FunctionTrigger {
    manager: Arc<Mutex<TaskManager>>,
    rerun_requested: AtomicBool,
}

impl FunctionTrigger {
    pub fn new(manager: TaskManager) -> Self {
        Self {
            manager: Arc::new(Mutex::new(manager)),
            rerun_requested: AtomicBool::new(false),
        }
    }

    pub fn manager(&self) -> Arc<Mutex<TaskManager>> {
        self.manager.clone()
    }

    pub fn is_running(&self) -> bool {
        self.manager.try_lock().is_err()
    }

    pub async fn trigger_or_rerun(&self) -> Result<TriggerResult> {
        let mut last = None;
        let mut retried = false;
        loop {
            let Ok(mut manager) = self.manager.try_lock() else {
                self.rerun_requested.store(true, Ordering::SeqCst);
                if !retried {
                    retried = true;
                    continue;
                }
                debug!("Task cycle already running, rerun queued");
                return Ok(match last {
                    Some(report) => TriggerResult::Ran(report),
                    None => TriggerResult::Queued,
                });
            };

            self.rerun_requested.store(false, Ordering::SeqCst);
            last = Some(manager.run_tasks().await?);
            drop(manager);

            if !self.rerun_requested.load(Ordering::SeqCst) {
                return Ok(TriggerResult::Ran(last.unwrap_or_default()));
            }
            debug!("Rerun requested during cycle, running again");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::recording::RecordingAlerter;
    use crate::probe::mock::MockRequestInterface;
    use crate::store::tests::setup_test_store;
    use crate::store::{UrlSource, UrlStore};
    use crate::tasks::{Collaborators, OperatorLoader, TaskHandler};

    fn trigger(store: &UrlStore) -> FunctionTrigger {
        let loader = OperatorLoader::new(
            store.clone(),
            Default::default(),
            Collaborators::new(Arc::new(MockRequestInterface::default())),
        );
        let handler = TaskHandler::new(store.clone(), Arc::new(RecordingAlerter::default()));
        FunctionTrigger::new(TaskManager::new(loader, handler, 20))
    }

    #[tokio::test]
    async fn test_trigger_runs_a_cycle() {
        let (store, _tmp) = setup_test_store().await;
        store
            .add_url("https://a.gov", UrlSource::Collector, None)
            .await
            .unwrap();
        let trigger = trigger(&store);

        let result = trigger.trigger_or_rerun().await.unwrap();
        let TriggerResult::Ran(report) = result else {
            panic!("expected a cycle to run");
        };
        assert!(report.total_runs() > 0);
        assert!(store.get_web_metadata(1).await.unwrap().is_some());
        assert!(!trigger.is_running());
    }

    #[tokio::test]
    async fn test_busy_trigger_queues_a_rerun() {
        let (store, _tmp) = setup_test_store().await;
        let trigger = trigger(&store);

        let manager = trigger.manager();
        let guard = manager.lock().await;
        assert!(trigger.is_running());
        assert_eq!(trigger.trigger_or_rerun().await.unwrap(), TriggerResult::Queued);
        assert!(trigger.rerun_requested.load(Ordering::SeqCst));
        drop(guard);

        assert!(matches!(
            trigger.trigger_or_rerun().await.unwrap(),
            TriggerResult::Ran(_)
        ));
        assert!(!trigger.rerun_requested.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_leave_no_request_behind() {
        let (store, _tmp) = setup_test_store().await;
        let trigger = Arc::new(trigger(&store));

        for _ in 0..5 {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let trigger = trigger.clone();
                    tokio::spawn(async move { trigger.trigger_or_rerun().await })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            assert!(!trigger.is_running());
            assert!(!trigger.rerun_requested.load(Ordering::SeqCst));
        }
    }
}
