//! Catalog loading: collection discovery, multi-API loads and the on-disk
//! catalog cache.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, write_atomic};
use crate::download::NoProgress;
use crate::error::{Error, Result};
use crate::http::Transport;
use crate::model::{Api, Link};

static COLLECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/collections/([^/]+)/?$").expect("valid regex"));

/// Extracts the collection id from a link href.
///
/// The URL path must end in `/collections/{id}`; query string and fragment
/// are ignored. Returns `None` for anything else.
#[must_use]
pub fn collection_id_from_href(href: &str) -> Option<String> {
    let path = reqwest::Url::parse(href).map_or_else(
        |_| href.split(['?', '#']).next().unwrap_or_default().to_string(),
        |url| url.path().to_string(),
    );
    COLLECTION_RE
        .captures(&path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Collection ids referenced by `links`, in link order without duplicates.
#[must_use]
pub fn collection_ids_from_links(links: &[Link]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in links.iter().filter_map(|l| collection_id_from_href(&l.href)) {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Trait for receiving catalog load updates.
///
/// All methods have default no-op implementations for convenience.
pub trait CatalogProgress: Send + Sync {
    /// Called before API `index` of `total` starts loading.
    fn on_api_start(&self, _index: usize, _total: usize, _api: &Api) {}

    /// Called when an API has loaded.
    fn on_api_loaded(&self, _api: &Api) {}

    /// Called when an API failed to load; the batch continues.
    fn on_api_error(&self, _api: &Api, _error: &Error) {}
}

impl CatalogProgress for NoProgress {}

/// Loads every API in turn, isolating failures.
///
/// Returns the APIs that loaded; failed ones are reported through
/// `progress` and left out.
///
/// # Errors
///
/// Returns [`Error::Cancelled`] if `cancel` fires between two APIs.
pub async fn load_apis(
    transport: &dyn Transport,
    apis: Vec<Api>,
    progress: &dyn CatalogProgress,
    cancel: &CancellationToken,
) -> Result<Vec<Api>> {
    let total = apis.len();
    let mut loaded = Vec::with_capacity(total);

    for (index, mut api) in apis.into_iter().enumerate() {
        if cancel.is_cancelled() {
            log::info!("Catalog load cancelled after {index} of {total} API(s)");
            return Err(Error::Cancelled);
        }
        progress.on_api_start(index, total, &api);
        match api.load(transport).await {
            Ok(()) => {
                progress.on_api_loaded(&api);
                loaded.push(api);
            }
            Err(e) => {
                log::warn!("Failed to load {}: {e}", api.href());
                progress.on_api_error(&api, &e);
            }
        }
    }

    Ok(loaded)
}

/// Builds the API list for a configuration, reusing cached entries whose id
/// and href still match.
#[must_use]
pub fn apis_from_config(config: &AppConfig, cached: &[Api]) -> Vec<Api> {
    config
        .apis
        .iter()
        .map(|entry| {
            let fresh = Api::new(&entry.id, &entry.href);
            cached
                .iter()
                .find(|api| api.id() == fresh.id() && api.href() == fresh.href())
                .cloned()
                .unwrap_or(fresh)
        })
        .collect()
}

/// Reads the catalog cache written by [`save_cache`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a list of APIs.
pub fn load_cache(path: &Path) -> Result<Vec<Api>> {
    let contents = std::fs::read(path)?;
    let values: Vec<Value> = serde_json::from_slice(&contents)?;
    values.into_iter().map(Api::from_json).collect()
}

/// Writes the loaded APIs to the catalog cache.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_cache(path: &Path, apis: &[Api]) -> Result<()> {
    let values: Vec<Value> = apis.iter().map(Api::to_json).collect();
    write_atomic(path, &serde_json::to_vec_pretty(&values)?)
}
