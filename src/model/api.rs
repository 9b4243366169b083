//! STAC API endpoints.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::collection::Collection;
use super::link::Link;
use super::CollectionIndex;
use crate::catalog::collection_ids_from_links;
use crate::error::{Error, Result};
use crate::http::Transport;

/// Path of the root document relative to the API href.
const ROOT_PATH: &str = "stac";

/// Path of the search endpoint relative to the API href.
const SEARCH_PATH: &str = "stac/search";

/// A STAC API endpoint and the collections it serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Api {
    id: String,
    href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default)]
    collections: Vec<Collection>,
}

impl Api {
    /// Creates an unloaded API.
    ///
    /// A trailing slash on `href` is dropped so endpoint paths join cleanly.
    #[must_use]
    pub fn new(id: impl ToString, href: &str) -> Self {
        Self {
            id: id.to_string(),
            href: href.trim_end_matches('/').to_string(),
            data: None,
            collections: Vec::new(),
        }
    }

    /// Creates an unloaded API with a freshly generated id.
    #[must_use]
    pub fn with_generated_id(href: &str) -> Self {
        Self::new(uuid::Uuid::new_v4(), href)
    }

    /// Replaces the collections, e.g. when restoring from a cache.
    #[must_use]
    pub fn with_collections(mut self, collections: Vec<Collection>) -> Self {
        self.collections = collections;
        self
    }

    /// Replaces the root document.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Restores an API from its [`Api::to_json`] projection.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` or `href` is missing.
    pub fn from_json(value: Value) -> Result<Self> {
        let api: Self = serde_json::from_value(value)?;
        if api.href.is_empty() {
            return Err(Error::InvalidResponse("API without href".to_string()));
        }
        Ok(api)
    }

    /// Projects the API into `{id, href, data, collections}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "href": self.href,
            "data": self.data,
            "collections": self.collections,
        })
    }

    /// Identifier assigned when the API was configured.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Base URL.
    #[must_use]
    pub fn href(&self) -> &str {
        &self.href
    }

    /// Root document, or `Value::Null` before the first load.
    #[must_use]
    pub fn data(&self) -> &Value {
        self.data.as_ref().unwrap_or(&Value::Null)
    }

    /// Title from the root document, falling back to the href.
    #[must_use]
    pub fn title(&self) -> &str {
        self.data()
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(&self.href)
    }

    /// STAC version declared by the root document.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.data().get("stac_version").and_then(Value::as_str)
    }

    /// Description from the root document.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.data().get("description").and_then(Value::as_str)
    }

    /// Links of the root document.
    #[must_use]
    pub fn links(&self) -> Vec<Link> {
        links_of(self.data())
    }

    /// Ids of the collections linked from the root document.
    #[must_use]
    pub fn collection_ids(&self) -> Vec<String> {
        collection_ids_from_links(&self.links())
    }

    /// Collections resolved by the last successful load.
    #[must_use]
    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    /// Builds an id lookup over this API's collections.
    #[must_use]
    pub fn collection_index(&self) -> CollectionIndex<'_> {
        CollectionIndex::new(&self.collections)
    }

    /// Returns true once a load has populated the root document.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    /// URL of the root document.
    #[must_use]
    pub fn root_url(&self) -> String {
        format!("{}/{ROOT_PATH}", self.href)
    }

    /// URL of the search endpoint.
    #[must_use]
    pub fn search_url(&self) -> String {
        format!("{}/{SEARCH_PATH}", self.href)
    }

    /// URL of a single collection.
    #[must_use]
    pub fn collection_url(&self, collection_id: &str) -> String {
        format!("{}/collections/{collection_id}", self.href)
    }

    /// Fetches the root document and every linked collection.
    ///
    /// Results are staged and committed only once every request has
    /// succeeded; on failure the API keeps its previous state.
    ///
    /// # Errors
    ///
    /// Returns the first transport error encountered.
    pub async fn load(&mut self, transport: &dyn Transport) -> Result<()> {
        log::debug!("Loading API {}", self.href);
        let data = transport.request(&self.root_url(), None).await?;
        let ids = collection_ids_from_links(&links_of(&data));

        let mut collections = Vec::with_capacity(ids.len());
        for id in &ids {
            collections.push(self.load_collection(transport, id).await?);
        }

        log::info!(
            "Loaded API {} with {} collection(s)",
            self.href,
            collections.len()
        );
        self.data = Some(data);
        self.collections = collections;
        Ok(())
    }

    /// Fetches a single collection by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the document is not a
    /// collection.
    pub async fn load_collection(
        &self,
        transport: &dyn Transport,
        collection_id: &str,
    ) -> Result<Collection> {
        let value = transport
            .request(&self.collection_url(collection_id), None)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| Error::InvalidResponse(format!("collection {collection_id}: {e}")))
    }

    /// Compares two APIs by title, case-insensitively.
    #[must_use]
    pub fn cmp_by_title(&self, other: &Self) -> Ordering {
        self.title()
            .to_lowercase()
            .cmp(&other.title().to_lowercase())
    }
}

fn links_of(data: &Value) -> Vec<Link> {
    data.get("links")
        .and_then(Value::as_array)
        .map(|links| {
            links
                .iter()
                .filter_map(|link| serde_json::from_value(link.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use std::collections::BTreeSet;

    fn root() -> Value {
        json!({
            "title": "Earth Search",
            "stac_version": "0.6.0",
            "description": "Public datasets",
            "links": [
                {"rel": "self", "href": "https://api.example.com/stac"},
                {"rel": "child", "href": "https://api.example.com/collections/landsat-8-l1"},
                {"rel": "child", "href": "https://api.example.com/collections/sentinel-2-l1c?f=json"},
                {"rel": "search", "href": "https://api.example.com/stac/search"}
            ]
        })
    }

    #[test]
    fn new_trims_trailing_slash() {
        let api = Api::new("a", "https://api.example.com/");
        assert_eq!(api.href(), "https://api.example.com");
        assert_eq!(api.root_url(), "https://api.example.com/stac");
        assert_eq!(api.search_url(), "https://api.example.com/stac/search");
    }

    #[test]
    fn unloaded_api_has_defaults() {
        let api = Api::new("a", "https://api.example.com");
        assert_eq!(api.title(), "https://api.example.com");
        assert!(api.version().is_none());
        assert!(api.collections().is_empty());
        assert!(!api.is_loaded());
    }

    #[test]
    fn generated_ids_differ() {
        let a = Api::with_generated_id("https://x");
        let b = Api::with_generated_id("https://x");
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn load_populates_collections() {
        let transport = MockTransport::new()
            .respond("https://api.example.com/stac", root())
            .respond(
                "https://api.example.com/collections/landsat-8-l1",
                json!({"id": "landsat-8-l1", "title": "Landsat"}),
            )
            .respond(
                "https://api.example.com/collections/sentinel-2-l1c",
                json!({"id": "sentinel-2-l1c", "title": "Sentinel"}),
            );
        let mut api = Api::new("a", "https://api.example.com");
        api.load(&transport).await.unwrap();

        assert_eq!(api.title(), "Earth Search");
        assert_eq!(api.version(), Some("0.6.0"));
        assert_eq!(api.description(), Some("Public datasets"));
        let ids: Vec<_> = api.collections().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["landsat-8-l1", "sentinel-2-l1c"]);
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_state() {
        let transport = MockTransport::new()
            .respond("https://api.example.com/stac", root())
            .respond(
                "https://api.example.com/collections/landsat-8-l1",
                json!({"id": "landsat-8-l1"}),
            )
            .fail("https://api.example.com/collections/sentinel-2-l1c", || Error::Timeout);
        let mut api = Api::new("a", "https://api.example.com")
            .with_collections(vec![Collection::new("old")]);

        let err = api.load(&transport).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
        assert!(!api.is_loaded());
        assert_eq!(api.collections().len(), 1);
        assert_eq!(api.collections()[0].id, "old");
    }

    #[test]
    fn json_round_trip() {
        let api = Api::new("a", "https://api.example.com")
            .with_data(root())
            .with_collections(vec![Collection::new("landsat-8-l1"), Collection::new("s2")]);
        let restored = Api::from_json(api.to_json()).unwrap();
        assert_eq!(restored.id(), api.id());
        assert_eq!(restored.href(), api.href());
        let ids = |a: &Api| a.collections().iter().map(|c| c.id.clone()).collect::<BTreeSet<_>>();
        assert_eq!(ids(&restored), ids(&api));
        assert_eq!(restored, api);
    }

    #[test]
    fn from_json_requires_href() {
        assert!(Api::from_json(json!({"id": "a"})).is_err());
        assert!(Api::from_json(json!({"id": "a", "href": ""})).is_err());
    }

    #[test]
    fn ordering_by_title_ignores_case() {
        let a = Api::new("a", "https://a").with_data(json!({"title": "beta"}));
        let b = Api::new("b", "https://b").with_data(json!({"title": "Alpha"}));
        assert_eq!(a.cmp_by_title(&b), Ordering::Greater);
    }

    #[test]
    fn collection_ids_from_root_links() {
        let api = Api::new("a", "https://api.example.com").with_data(root());
        assert_eq!(api.collection_ids(), vec!["landsat-8-l1", "sentinel-2-l1c"]);
    }
}
