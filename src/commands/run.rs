//! Run and serve command implementations

use crate::alert::Alerter;
use crate::config::Config;
use crate::error::Result;
use crate::store::UrlStore;
use crate::tasks::{
    CycleReport, FunctionTrigger, ScheduledTaskRegistry, StopReason, TaskManager, TriggerResult,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Run one task cycle: every enabled operator until it runs out of work
pub async fn cmd_run(
    config: &Config,
    store: &UrlStore,
    alerter: Arc<dyn Alerter>,
) -> Result<CycleReport> {
    let mut manager = TaskManager::from_config(config, store.clone(), alerter)?;
    manager.run_tasks().await
}

/// Run a cycle now, then keep the scheduled registry going until Ctrl-C
pub async fn cmd_serve(config: &Config, store: &UrlStore, alerter: Arc<dyn Alerter>) -> Result<()> {
    let manager = TaskManager::from_config(config, store.clone(), alerter)?;
    let handler = manager.handler().clone();
    let trigger = Arc::new(FunctionTrigger::new(manager));

    match trigger.trigger_or_rerun().await? {
        TriggerResult::Ran(report) => print_cycle_report(&report),
        TriggerResult::Queued => info!("Initial cycle queued"),
    }

    if !config.schedule.enabled {
        warn!("Scheduled registry is disabled; nothing left to do");
        return Ok(());
    }

    let registry = ScheduledTaskRegistry::from_config(&config.schedule, handler, trigger);
    let scheduled = registry.start();
    info!("Started {} scheduled tasks, press Ctrl-C to stop", scheduled.len());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down scheduled tasks");
    scheduled.shutdown();
    Ok(())
}

fn stop_reason_label(reason: StopReason) -> &'static str {
    match reason {
        StopReason::NoWork => "no work left",
        StopReason::Error => "stopped on error",
        StopReason::RepeatThreshold => "repeat threshold reached",
        StopReason::PrerequisiteFailed => "prerequisite check failed",
    }
}

pub fn print_cycle_report(report: &CycleReport) {
    println!("\n🔁 Task Cycle\n");

    if report.operators.is_empty() {
        println!("No operators enabled.");
        return;
    }

    for op in &report.operators {
        let marker = if op.errors > 0 { "✗" } else { "✓" };
        println!(
            "{} {:<16} runs: {:<3} errors: {:<3} ({})",
            marker,
            op.task_type.to_string(),
            op.runs,
            op.errors,
            stop_reason_label(op.stop_reason)
        );
    }
    println!(
        "\nTotal: {} runs, {} errors",
        report.total_runs(),
        report.total_errors()
    );
}
