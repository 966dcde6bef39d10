//! URL storage using SQLite
//!
//! This module handles all persistent state including:
//! - URLs and their lifecycle status
//! - Task records, task-to-URL links and task errors
//! - Satellite tables (web metadata, redirect links, per-URL error info)
//!
//! Pool-level reads and task bookkeeping live on [`UrlStore`]. Writes that
//! belong to one operator run take a connection borrowed from an open
//! transaction (see [`tx`]).

mod models;
mod schema;
pub mod tx;

pub use models::*;
pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Transaction};
use std::path::Path;
use tracing::{debug, info};

/// Current time as stored in every timestamp column
pub(crate) fn now() -> String {
    timestamp(Utc::now())
}

/// Fixed-width UTC form, so stored timestamps compare correctly as text
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Filters for listing task records
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub task_type: Option<TaskType>,
    pub task_status: Option<TaskStatus>,
    pub limit: i64,
}

/// URL store handle
#[derive(Clone)]
pub struct UrlStore {
    pool: SqlitePool,
}

impl UrlStore {
    /// Connect to the store configured for this installation
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Open the database at a path without initializing the schema
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Open the database and create the schema if it is missing
    pub async fn new(db_path: &Path) -> Result<Self> {
        let store = Self::open(db_path).await?;
        if !store.is_initialized().await? {
            store.init_schema().await?;
        }
        Ok(store)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='urls'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start the transaction an operator run writes through
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    // ===== URL Operations =====

    /// Insert a URL, returning the id of the existing row when it is already known
    pub async fn add_url(
        &self,
        url: &str,
        source: UrlSource,
        collector_metadata: Option<&str>,
    ) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        let id = tx::get_or_insert_url(&mut conn, url, source).await?;
        if let Some(metadata) = collector_metadata {
            sqlx::query(
                "UPDATE urls SET collector_metadata = ?, updated_at = ? WHERE id = ? AND collector_metadata IS NULL",
            )
            .bind(metadata)
            .bind(now())
            .bind(id)
            .execute(&mut *conn)
            .await?;
        }
        Ok(id)
    }

    /// Get a URL by id
    pub async fn get_url(&self, id: i64) -> Result<Option<UrlRecord>> {
        let url = sqlx::query_as::<_, UrlRecord>("SELECT * FROM urls WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(url)
    }

    /// Get a URL by its exact string
    pub async fn get_url_by_str(&self, url: &str) -> Result<Option<UrlRecord>> {
        let url = sqlx::query_as::<_, UrlRecord>("SELECT * FROM urls WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(url)
    }

    /// List URLs, optionally restricted to one status
    pub async fn list_urls(&self, status: Option<UrlStatus>, limit: i64) -> Result<Vec<UrlRecord>> {
        let urls = match status {
            Some(status) => {
                sqlx::query_as::<_, UrlRecord>(
                    "SELECT * FROM urls WHERE status = ? ORDER BY id LIMIT ?",
                )
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, UrlRecord>("SELECT * FROM urls ORDER BY id LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(urls)
    }

    /// Set a URL's status outside of an operator run
    pub async fn set_url_status(&self, url_id: i64, status: UrlStatus) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        tx::update_url_status(&mut conn, url_id, status).await
    }

    pub async fn count_urls(&self, status: UrlStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM urls WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ===== Satellite Reads =====

    /// Get the web metadata row for a URL
    pub async fn get_web_metadata(&self, url_id: i64) -> Result<Option<WebMetadata>> {
        let row = sqlx::query_as::<_, WebMetadata>(
            r#"
            SELECT url_id, accessed, status_code, content_type, error_message
            FROM url_web_metadata WHERE url_id = ?
            "#,
        )
        .bind(url_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn count_web_metadata(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM url_web_metadata")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// All redirect links in insertion order
    pub async fn list_redirect_links(&self) -> Result<Vec<RedirectLink>> {
        let links = sqlx::query_as::<_, RedirectLink>(
            "SELECT source_url_id, destination_url_id FROM url_redirect_links ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    /// Per-URL errors recorded against a URL
    pub async fn get_url_errors(&self, url_id: i64) -> Result<Vec<UrlErrorInfo>> {
        let errors = sqlx::query_as::<_, UrlErrorInfo>(
            "SELECT task_id, url_id, error FROM url_error_info WHERE url_id = ? ORDER BY id",
        )
        .bind(url_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(errors)
    }

    /// Parsed HTML fields stored for a URL
    pub async fn get_html_content(&self, url_id: i64) -> Result<Vec<HtmlContentRow>> {
        let rows = sqlx::query_as::<_, HtmlContentRow>(
            "SELECT url_id, content_type, content FROM url_html_content WHERE url_id = ? ORDER BY id",
        )
        .bind(url_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ===== Task Operations =====

    /// Open a task record in the in-process state
    pub async fn create_task(&self, task_type: TaskType) -> Result<i64> {
        let now = now();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tasks (task_type, task_status, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(task_type.as_str())
        .bind(TaskStatus::InProcess.to_string())
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        debug!("Opened task {} ({})", id, task_type);
        Ok(id)
    }

    pub async fn update_task_status(&self, task_id: i64, status: TaskStatus) -> Result<()> {
        let result = sqlx::query("UPDATE tasks SET task_status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(now())
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::TaskNotFound(task_id));
        }
        Ok(())
    }

    pub async fn add_task_error(&self, task_id: i64, error: &str) -> Result<()> {
        sqlx::query("INSERT INTO task_errors (task_id, error, created_at) VALUES (?, ?, ?)")
            .bind(task_id)
            .bind(error)
            .bind(now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record which URLs a task touched
    pub async fn link_urls_to_task(&self, task_id: i64, url_ids: &[i64]) -> Result<()> {
        if url_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for chunk in url_ids.chunks(tx::BIND_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO link_task_urls (task_id, url_id) ");
            qb.push_values(chunk, |mut b, url_id| {
                b.push_bind(task_id).push_bind(*url_id);
            });
            qb.push(" ON CONFLICT(task_id, url_id) DO NOTHING");
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_task(&self, task_id: i64) -> Result<Option<TaskRecord>> {
        let task = sqlx::query_as::<_, TaskRecord>("SELECT * FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    pub async fn get_task_errors(&self, task_id: i64) -> Result<Vec<String>> {
        let errors: Vec<String> =
            sqlx::query_scalar("SELECT error FROM task_errors WHERE task_id = ? ORDER BY id")
                .bind(task_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(errors)
    }

    pub async fn get_task_url_ids(&self, task_id: i64) -> Result<Vec<i64>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT url_id FROM link_task_urls WHERE task_id = ? ORDER BY url_id")
                .bind(task_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    /// Most recent tasks matching a filter
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskSummary>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT t.id, t.task_type, t.task_status,
                (SELECT COUNT(*) FROM link_task_urls l WHERE l.task_id = t.id) AS url_count,
                (SELECT e.error FROM task_errors e WHERE e.task_id = t.id
                    ORDER BY e.id DESC LIMIT 1) AS error,
                t.updated_at
            FROM tasks t
            WHERE 1 = 1
            "#,
        );
        if let Some(task_type) = filter.task_type {
            qb.push(" AND t.task_type = ").push_bind(task_type.as_str());
        }
        if let Some(status) = filter.task_status {
            qb.push(" AND t.task_status = ").push_bind(status.to_string());
        }
        qb.push(" ORDER BY t.id DESC LIMIT ").push_bind(filter.limit.max(1));

        let tasks = qb
            .build_query_as::<TaskSummary>()
            .fetch_all(&self.pool)
            .await?;
        Ok(tasks)
    }

    // ===== Statistics =====

    /// Count pending URLs into a backlog snapshot row
    pub async fn insert_backlog_snapshot(&self) -> Result<i64> {
        let pending = self.count_urls(UrlStatus::Pending).await?;
        sqlx::query("INSERT INTO backlog_snapshots (count_pending_total, created_at) VALUES (?, ?)")
            .bind(pending)
            .bind(now())
            .execute(&self.pool)
            .await?;
        Ok(pending)
    }

    /// Get global statistics
    pub async fn get_stats(&self) -> Result<StoreStats> {
        let url_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM urls")
            .fetch_one(&self.pool)
            .await?;

        let urls_by_status: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM urls GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let task_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await?;

        let tasks_by_status: Vec<(String, i64)> = sqlx::query_as(
            "SELECT task_status, COUNT(*) FROM tasks GROUP BY task_status ORDER BY task_status",
        )
        .fetch_all(&self.pool)
        .await?;

        let redirect_link_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM url_redirect_links")
            .fetch_one(&self.pool)
            .await?;

        let latest_backlog: Option<i64> = sqlx::query_scalar(
            "SELECT count_pending_total FROM backlog_snapshots ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(StoreStats {
            url_count: url_count as usize,
            urls_by_status: urls_by_status
                .into_iter()
                .map(|(status, count)| (status, count as usize))
                .collect(),
            task_count: task_count as usize,
            tasks_by_status: tasks_by_status
                .into_iter()
                .map(|(status, count)| (status, count as usize))
                .collect(),
            redirect_link_count: redirect_link_count as usize,
            latest_backlog,
        })
    }
}
