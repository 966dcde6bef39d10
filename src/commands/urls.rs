//! Add command implementation

use crate::error::{Error, Result};
use crate::store::{UrlSource, UrlStore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

/// One URL handed to `add`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddedUrl {
    pub id: i64,
    pub url: String,
    pub already_known: bool,
}

/// Queue URLs as pending, the way a collector would.
///
/// `metadata` is stored as collector metadata on newly added rows; it must
/// be a JSON object.
pub async fn cmd_add_urls(
    store: &UrlStore,
    urls: &[String],
    metadata: Option<&str>,
    source: UrlSource,
) -> Result<Vec<AddedUrl>> {
    if let Some(raw) = metadata {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(Error::Parse(
                "Collector metadata must be a JSON object".to_string(),
            ));
        }
    }

    let mut added = Vec::with_capacity(urls.len());
    for raw in urls {
        let url = raw.trim();
        if let Err(e) = Url::parse(url) {
            warn!("Skipping {}: {}", url, e);
            continue;
        }

        let already_known = store.get_url_by_str(url).await?.is_some();
        let id = store.add_url(url, source, metadata).await?;
        added.push(AddedUrl {
            id,
            url: url.to_string(),
            already_known,
        });
    }

    info!(
        "Queued {} URLs ({} already known)",
        added.len(),
        added.iter().filter(|a| a.already_known).count()
    );
    Ok(added)
}

pub fn print_added_urls(added: &[AddedUrl]) {
    if added.is_empty() {
        println!("No URLs added.");
        return;
    }

    for url in added {
        if url.already_known {
            println!("• {} [{}] (already known)", url.url, url.id);
        } else {
            println!("✓ {} [{}]", url.url, url.id);
        }
    }
}
