//! Writes performed inside an operator's transaction
//!
//! Every function borrows the connection of an open transaction, so nothing
//! written here is visible until the caller commits.

use super::{
    now, OptionalMetadata, RecordType, RedirectLink, ScrapeStatus, UrlSource, UrlStatus,
    WebMetadata,
};
use crate::error::Result;
use sqlx::sqlite::{Sqlite, SqliteConnection};
use sqlx::QueryBuilder;
use std::collections::HashMap;

/// Rows per multi-row statement, kept well under SQLite's bind limit
pub const BIND_CHUNK: usize = 100;

/// Resolve exact URL strings to ids for the ones already stored
pub async fn lookup_url_ids(
    conn: &mut SqliteConnection,
    urls: &[String],
) -> Result<HashMap<String, i64>> {
    let mut found = HashMap::with_capacity(urls.len());
    for chunk in urls.chunks(BIND_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id, url FROM urls WHERE url IN (");
        let mut separated = qb.separated(", ");
        for url in chunk {
            separated.push_bind(url.clone());
        }
        separated.push_unseparated(")");

        let rows: Vec<(i64, String)> = qb.build_query_as().fetch_all(&mut *conn).await?;
        for (id, url) in rows {
            found.insert(url, id);
        }
    }
    Ok(found)
}

/// Insert URL strings as new pending rows and return the id of every requested string.
///
/// A string that already exists (including one inserted concurrently since the
/// caller's lookup) is re-read rather than treated as a failure.
pub async fn insert_urls(
    conn: &mut SqliteConnection,
    urls: &[String],
    source: UrlSource,
) -> Result<HashMap<String, i64>> {
    let mut ids = HashMap::with_capacity(urls.len());
    let now = now();

    for chunk in urls.chunks(BIND_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO urls (url, status, source, created_at, updated_at) ");
        qb.push_values(chunk, |mut b, url| {
            b.push_bind(url.clone())
                .push_bind(UrlStatus::Pending.as_str())
                .push_bind(source.to_string())
                .push_bind(now.clone())
                .push_bind(now.clone());
        });
        qb.push(" ON CONFLICT(url) DO NOTHING RETURNING id, url");

        let inserted: Vec<(i64, String)> = qb.build_query_as().fetch_all(&mut *conn).await?;
        for (id, url) in inserted {
            ids.insert(url, id);
        }
    }

    let conflicted: Vec<String> = urls
        .iter()
        .filter(|url| !ids.contains_key(*url))
        .cloned()
        .collect();
    if !conflicted.is_empty() {
        ids.extend(lookup_url_ids(conn, &conflicted).await?);
    }

    Ok(ids)
}

/// Look up a single URL, inserting it when absent
pub async fn get_or_insert_url(
    conn: &mut SqliteConnection,
    url: &str,
    source: UrlSource,
) -> Result<i64> {
    let now = now();
    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO urls (url, status, source, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(url) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(url)
    .bind(UrlStatus::Pending.as_str())
    .bind(source.to_string())
    .bind(&now)
    .bind(&now)
    .fetch_optional(&mut *conn)
    .await?;

    match inserted {
        Some(id) => Ok(id),
        None => {
            let id: i64 = sqlx::query_scalar("SELECT id FROM urls WHERE url = ?")
                .bind(url)
                .fetch_one(&mut *conn)
                .await?;
            Ok(id)
        }
    }
}

/// Insert or replace the web metadata row of each URL
pub async fn upsert_web_metadata(conn: &mut SqliteConnection, rows: &[WebMetadata]) -> Result<()> {
    let now = now();
    for row in rows {
        sqlx::query(
            r#"
            INSERT INTO url_web_metadata
                (url_id, accessed, status_code, content_type, error_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url_id) DO UPDATE SET
                accessed = excluded.accessed,
                status_code = excluded.status_code,
                content_type = excluded.content_type,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(row.url_id)
        .bind(row.accessed)
        .bind(row.status_code)
        .bind(&row.content_type)
        .bind(&row.error_message)
        .bind(&now)
        .bind(&now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn insert_redirect_links(
    conn: &mut SqliteConnection,
    links: &[RedirectLink],
) -> Result<()> {
    let now = now();
    for chunk in links.chunks(BIND_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO url_redirect_links (source_url_id, destination_url_id, created_at) ",
        );
        qb.push_values(chunk, |mut b, link| {
            b.push_bind(link.source_url_id)
                .push_bind(link.destination_url_id)
                .push_bind(now.clone());
        });
        qb.build().execute(&mut *conn).await?;
    }
    Ok(())
}

pub async fn update_url_status(
    conn: &mut SqliteConnection,
    url_id: i64,
    status: UrlStatus,
) -> Result<()> {
    sqlx::query("UPDATE urls SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(now())
        .bind(url_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Record a failure for one URL without failing the task
pub async fn add_url_error(
    conn: &mut SqliteConnection,
    task_id: i64,
    url_id: i64,
    error: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO url_error_info (task_id, url_id, error, created_at) VALUES (?, ?, ?, ?)")
        .bind(task_id)
        .bind(url_id)
        .bind(error)
        .bind(now())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Store parsed HTML fields, replacing earlier values of the same field
pub async fn upsert_html_content(
    conn: &mut SqliteConnection,
    url_id: i64,
    fields: &[(String, String)],
) -> Result<()> {
    for (content_type, content) in fields {
        sqlx::query(
            r#"
            INSERT INTO url_html_content (url_id, content_type, content)
            VALUES (?, ?, ?)
            ON CONFLICT(url_id, content_type) DO UPDATE SET content = excluded.content
            "#,
        )
        .bind(url_id)
        .bind(content_type)
        .bind(content)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Record that an HTML fetch was attempted, with its outcome
pub async fn mark_scraped(
    conn: &mut SqliteConnection,
    url_id: i64,
    status: ScrapeStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO url_scrape_info (url_id, status, created_at) VALUES (?, ?, ?)
        ON CONFLICT(url_id) DO UPDATE SET status = excluded.status
        "#,
    )
    .bind(url_id)
    .bind(status.as_str())
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn mark_checked_for_duplicates(conn: &mut SqliteConnection, url_ids: &[i64]) -> Result<()> {
    let now = now();
    for chunk in url_ids.chunks(BIND_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO url_checked_for_duplicates (url_id, created_at) ");
        qb.push_values(chunk, |mut b, url_id| {
            b.push_bind(*url_id).push_bind(now.clone());
        });
        qb.push(" ON CONFLICT(url_id) DO NOTHING");
        qb.build().execute(&mut *conn).await?;
    }
    Ok(())
}

/// Stamp URLs as probed for 404 at `probed_at`
pub async fn mark_probed_for_404(
    conn: &mut SqliteConnection,
    url_ids: &[i64],
    probed_at: &str,
) -> Result<()> {
    for chunk in url_ids.chunks(BIND_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO url_probed_for_404 (url_id, last_probed_at) ");
        qb.push_values(chunk, |mut b, url_id| {
            b.push_bind(*url_id).push_bind(probed_at.to_string());
        });
        qb.push(" ON CONFLICT(url_id) DO UPDATE SET last_probed_at = excluded.last_probed_at");
        qb.build().execute(&mut *conn).await?;
    }
    Ok(())
}

pub async fn insert_record_type_suggestion(
    conn: &mut SqliteConnection,
    url_id: i64,
    record_type: RecordType,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO auto_record_type_suggestions (url_id, record_type, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT(url_id) DO UPDATE SET record_type = excluded.record_type
        "#,
    )
    .bind(url_id)
    .bind(record_type.label())
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn insert_relevant_suggestion(
    conn: &mut SqliteConnection,
    url_id: i64,
    is_relevant: bool,
    confidence: Option<f64>,
    model_name: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO auto_relevant_suggestions (url_id, is_relevant, confidence, model_name, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(url_id) DO UPDATE SET
            is_relevant = excluded.is_relevant,
            confidence = excluded.confidence,
            model_name = excluded.model_name
        "#,
    )
    .bind(url_id)
    .bind(is_relevant)
    .bind(confidence)
    .bind(model_name)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fill in a URL's name and description where they are still unset
pub async fn fill_url_details(
    conn: &mut SqliteConnection,
    url_id: i64,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE urls SET
            name = COALESCE(name, ?),
            description = COALESCE(description, ?),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(name)
    .bind(description)
    .bind(now())
    .bind(url_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn insert_optional_metadata(
    conn: &mut SqliteConnection,
    url_id: i64,
    metadata: &OptionalMetadata,
) -> Result<()> {
    let record_formats = if metadata.record_formats.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&metadata.record_formats)?)
    };
    sqlx::query(
        r#"
        INSERT INTO url_optional_metadata
            (url_id, record_formats, data_portal_type, supplying_entity, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(url_id) DO NOTHING
        "#,
    )
    .bind(url_id)
    .bind(record_formats)
    .bind(&metadata.data_portal_type)
    .bind(&metadata.supplying_entity)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn insert_data_source(
    conn: &mut SqliteConnection,
    url_id: i64,
    data_source_id: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO url_data_sources (url_id, data_source_id, created_at) VALUES (?, ?, ?)
        ON CONFLICT(url_id) DO UPDATE SET data_source_id = excluded.data_source_id
        "#,
    )
    .bind(url_id)
    .bind(data_source_id)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn flag_root_url(conn: &mut SqliteConnection, url_id: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO flag_root_urls (url_id, created_at) VALUES (?, ?) ON CONFLICT(url_id) DO NOTHING",
    )
    .bind(url_id)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn link_root_url(conn: &mut SqliteConnection, url_id: i64, root_url_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO link_urls_root_url (url_id, root_url_id, created_at) VALUES (?, ?, ?)
        ON CONFLICT(url_id) DO UPDATE SET root_url_id = excluded.root_url_id
        "#,
    )
    .bind(url_id)
    .bind(root_url_id)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Insert or refresh an agency, keeping known fields when the new value is NULL
pub async fn upsert_agency(
    conn: &mut SqliteConnection,
    agency_id: i64,
    name: Option<&str>,
    state: Option<&str>,
    county: Option<&str>,
    locality: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO agencies (agency_id, name, state, county, locality, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(agency_id) DO UPDATE SET
            name = COALESCE(excluded.name, name),
            state = COALESCE(excluded.state, state),
            county = COALESCE(excluded.county, county),
            locality = COALESCE(excluded.locality, locality),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(agency_id)
    .bind(name)
    .bind(state)
    .bind(county)
    .bind(locality)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn link_url_agency(conn: &mut SqliteConnection, url_id: i64, agency_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO link_urls_agencies (url_id, agency_id, created_at) VALUES (?, ?, ?)
        ON CONFLICT(url_id, agency_id) DO NOTHING
        "#,
    )
    .bind(url_id)
    .bind(agency_id)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// `None` records that no agency could be matched
pub async fn insert_agency_suggestion(
    conn: &mut SqliteConnection,
    url_id: i64,
    agency_id: Option<i64>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO automated_url_agency_suggestions (url_id, agency_id, is_unknown, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(url_id, agency_id) DO NOTHING
        "#,
    )
    .bind(url_id)
    .bind(agency_id)
    .bind(agency_id.is_none())
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::setup_test_store;

    #[tokio::test]
    async fn test_insert_urls_resolves_existing_rows() {
        let (store, _tmp) = setup_test_store().await;
        let existing = store
            .add_url("https://b.com", UrlSource::Manual, None)
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let ids = insert_urls(
            &mut tx,
            &["https://b.com".to_string(), "https://c.com".to_string()],
            UrlSource::Redirect,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(ids.len(), 2);
        assert_eq!(ids["https://b.com"], existing);
        let c = store.get_url_by_str("https://c.com").await.unwrap().unwrap();
        assert_eq!(ids["https://c.com"], c.id);
        assert_eq!(c.source, "redirect");
    }

    #[tokio::test]
    async fn test_upsert_web_metadata_keeps_one_row() {
        let (store, _tmp) = setup_test_store().await;
        let url_id = store
            .add_url("https://a.com", UrlSource::Manual, None)
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        upsert_web_metadata(
            &mut tx,
            &[WebMetadata {
                url_id,
                accessed: false,
                status_code: None,
                content_type: None,
                error_message: Some("Request timed out".to_string()),
            }],
        )
        .await
        .unwrap();
        upsert_web_metadata(
            &mut tx,
            &[WebMetadata {
                url_id,
                accessed: true,
                status_code: Some(200),
                content_type: Some("text/html".to_string()),
                error_message: None,
            }],
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.count_web_metadata().await.unwrap(), 1);
        let row = store.get_web_metadata(url_id).await.unwrap().unwrap();
        assert_eq!(row.status_code, Some(200));
        assert!(row.error_message.is_none());
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let (store, _tmp) = setup_test_store().await;
        {
            let mut tx = store.begin().await.unwrap();
            get_or_insert_url(&mut tx, "https://gone.com", UrlSource::Redirect)
                .await
                .unwrap();
        }
        assert!(store
            .get_url_by_str("https://gone.com")
            .await
            .unwrap()
            .is_none());
    }
}
