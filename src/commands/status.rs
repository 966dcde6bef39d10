//! Status and task listing command implementations

use crate::config::Config;
use crate::error::Result;
use crate::store::{StoreStats, TaskFilter, TaskSummary, UrlStore};
use crate::tasks::{OperatorLoader, TaskOperator};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub active_operators: Vec<String>,
    pub schedule_enabled: bool,
    pub alert_webhook_configured: bool,
    pub store_stats: StoreStats,
}

/// Get system status
pub async fn cmd_status(config: &Config, store: &UrlStore) -> Result<StatusInfo> {
    info!("Getting status");

    let store_stats = store.get_stats().await?;
    let active_operators = OperatorLoader::from_config(config, store.clone())?
        .load_operators()
        .iter()
        .map(|op| op.task_type().to_string())
        .collect();

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        active_operators,
        schedule_enabled: config.schedule.enabled,
        alert_webhook_configured: config
            .alerts
            .discord_webhook_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty()),
        store_stats,
    })
}

/// Recent task records, newest first
pub async fn cmd_list_tasks(store: &UrlStore, filter: &TaskFilter) -> Result<Vec<TaskSummary>> {
    info!("Listing tasks");
    store.list_tasks(filter).await
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 sifter Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);

    println!("\nOperators: {}", status.active_operators.join(", "));
    println!(
        "Schedule: {}",
        if status.schedule_enabled {
            "✓ Enabled"
        } else {
            "✗ Disabled"
        }
    );
    println!(
        "Alerts: {}",
        if status.alert_webhook_configured {
            "webhook"
        } else {
            "log only"
        }
    );

    let stats = &status.store_stats;
    println!("\nURLs: {}", stats.url_count);
    for (url_status, count) in &stats.urls_by_status {
        println!("  {}: {}", url_status, count);
    }
    println!("  Redirect links: {}", stats.redirect_link_count);

    println!("\nTasks: {}", stats.task_count);
    for (task_status, count) in &stats.tasks_by_status {
        println!("  {}: {}", task_status, count);
    }

    match stats.latest_backlog {
        Some(pending) => println!("\nBacklog (last snapshot): {} pending", pending),
        None => println!("\nBacklog: no snapshot yet"),
    }
}

/// Print task list to console
pub fn print_tasks(tasks: &[TaskSummary]) {
    println!("\n🗂  Recent Tasks\n");

    if tasks.is_empty() {
        println!("No tasks recorded. Use 'sifter run' to run a cycle.");
        return;
    }

    for task in tasks {
        println!(
            "• #{} {} [{}] {} URLs, {}",
            task.id, task.task_type, task.task_status, task.url_count, task.updated_at
        );
        if let Some(error) = &task.error {
            println!("  Error: {}", error.replace('\n', " "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::setup_test_store;
    use crate::store::{TaskStatus, UrlSource};
    use crate::tasks::TaskType;

    #[tokio::test]
    async fn test_status_reports_counts_and_operators() {
        let (store, _tmp) = setup_test_store().await;
        store
            .add_url("https://pd.gov", UrlSource::Collector, None)
            .await
            .unwrap();

        let mut config = Config::default();
        config.services.data_sources_url = None;
        config.services.record_type_classifier_url = None;
        config.services.relevancy_classifier_url = None;
        config.services.agency_identifier_url = None;
        config.tasks.enabled.misc_metadata = false;

        let status = cmd_status(&config, &store).await.unwrap();
        assert_eq!(status.store_stats.url_count, 1);
        assert_eq!(
            status.active_operators,
            vec!["probe", "html", "probe_404", "root_url"]
        );
    }

    #[tokio::test]
    async fn test_list_tasks_filters() {
        let (store, _tmp) = setup_test_store().await;
        let probe = store.create_task(TaskType::Probe).await.unwrap();
        let html = store.create_task(TaskType::Html).await.unwrap();
        store.update_task_status(html, TaskStatus::Error).await.unwrap();
        store.add_task_error(html, "boom").await.unwrap();

        let all = cmd_list_tasks(&store, &TaskFilter { limit: 10, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(all.iter().map(|t| t.id).collect::<Vec<_>>(), vec![html, probe]);

        let errored = cmd_list_tasks(
            &store,
            &TaskFilter {
                task_status: Some(TaskStatus::Error),
                limit: 10,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(errored.len(), 1);
        assert_eq!(errored[0].error.as_deref(), Some("boom"));
    }
}
