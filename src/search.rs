//! Paginated item search across APIs and collections.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;
use crate::download::NoProgress;
use crate::error::{Error, Result};
use crate::http::Transport;
use crate::model::{Api, Item, SearchResult};

/// Format of the instants in the `time` field of a search body.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parameters of an item search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    /// Collection ids to search.
    pub collections: Vec<String>,
    /// Bounding box `[west, south, east, north]` in the API's native CRS.
    pub bbox: [f64; 4],
    /// Start of the time range, or the single instant searched.
    pub start: DateTime<Utc>,
    /// End of the time range.
    pub end: Option<DateTime<Utc>>,
    /// Structured filter passed through verbatim.
    pub query: Option<Value>,
    /// First page number, used until the server hands out a cursor.
    pub page: u64,
    /// Cursor to resume from instead of a page number.
    pub next: Option<String>,
    /// Items requested per page.
    pub limit: u64,
    /// Maximum number of pages fetched by one search.
    pub page_limit: u32,
}

impl SearchParams {
    /// Creates parameters for a whole-world search starting at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        let defaults = SearchConfig::default();
        Self {
            collections: Vec::new(),
            bbox: [-180.0, -90.0, 180.0, 90.0],
            start,
            end: None,
            query: None,
            page: 1,
            next: None,
            limit: defaults.limit,
            page_limit: defaults.page_limit,
        }
    }

    /// Sets the collection ids to search.
    #[must_use]
    pub fn with_collections(mut self, collections: Vec<String>) -> Self {
        self.collections = collections;
        self
    }

    /// Sets the bounding box.
    #[must_use]
    pub const fn with_bbox(mut self, bbox: [f64; 4]) -> Self {
        self.bbox = bbox;
        self
    }

    /// Sets the end of the time range.
    #[must_use]
    pub const fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    /// Sets the structured filter.
    #[must_use]
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Sets the first page number.
    #[must_use]
    pub const fn with_page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    /// Resumes from a cursor returned by an earlier search.
    #[must_use]
    pub fn with_next(mut self, next: impl ToString) -> Self {
        self.next = Some(next.to_string());
        self
    }

    /// Sets the number of items requested per page.
    #[must_use]
    pub const fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the maximum number of pages fetched.
    #[must_use]
    pub const fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit;
        self
    }

    /// Applies configured limits.
    #[must_use]
    pub const fn with_config(self, config: &SearchConfig) -> Self {
        self.with_limit(config.limit)
            .with_page_limit(config.page_limit)
    }

    /// The `time` field: one instant, or `start/end`.
    #[must_use]
    pub fn time(&self) -> String {
        let start = self.start.format(TIME_FORMAT);
        match self.end {
            Some(end) => format!("{start}/{}", end.format(TIME_FORMAT)),
            None => start.to_string(),
        }
    }

    /// Request body for one page.
    ///
    /// A cursor, when present, takes the place of the page number.
    #[must_use]
    pub fn body(&self, page: u64, next: Option<&str>) -> SearchBody {
        SearchBody {
            collections: self.collections.clone(),
            bbox: self.bbox,
            time: self.time(),
            limit: self.limit,
            query: self.query.clone(),
            page: next.is_none().then_some(page),
            next: next.map(ToString::to_string),
        }
    }
}

/// JSON body POSTed to the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchBody {
    pub collections: Vec<String>,
    pub bbox: [f64; 4],
    pub time: String,
    pub limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl Api {
    /// Searches this API, following pages until results run short, the
    /// server stops handing out cursors, or `page_limit` pages were fetched.
    ///
    /// `on_next_page` runs once per page, before that page is requested.
    ///
    /// # Errors
    ///
    /// Any transport error aborts the search; items from earlier pages are
    /// discarded. Returns [`Error::Cancelled`] if `cancel` fires between
    /// pages.
    pub async fn search_items(
        &self,
        transport: &dyn Transport,
        params: &SearchParams,
        on_next_page: &mut (dyn FnMut(&Self) + Send),
        cancel: &CancellationToken,
    ) -> Result<Vec<Item>> {
        let url = self.search_url();
        let mut items = Vec::new();
        let mut page = params.page;
        let mut next = params.next.clone();

        for _ in 0..params.page_limit {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            on_next_page(self);

            let body = serde_json::to_value(params.body(page, next.as_deref()))?;
            let response = transport.request(&url, Some(&body)).await?;
            let result = SearchResult::from_value(self.href(), response)?;

            let count = result.items().len();
            let cursor = result.next();
            items.extend(result.into_items());
            log::debug!("{url}: page {page} returned {count} item(s)");

            match cursor {
                Some(cursor) if count as u64 >= params.limit => {
                    next = Some(cursor);
                    page += 1;
                }
                _ => break,
            }
        }

        Ok(items)
    }
}

/// An API together with the collections to search on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCollections {
    pub api: Api,
    pub collections: Vec<String>,
}

impl ApiCollections {
    #[must_use]
    pub const fn new(api: Api, collections: Vec<String>) -> Self {
        Self { api, collections }
    }
}

/// Trait for receiving search progress.
pub trait SearchProgress: Send + Sync {
    /// Called before page `page` (1-based per target) is requested.
    fn on_page(&self, _api: &Api, _collections: &[String], _page: u32) {}
}

impl SearchProgress for NoProgress {}

/// Searches every target in turn and concatenates the results.
///
/// `params.collections` is replaced by each target's collections.
///
/// # Errors
///
/// The first failure aborts the whole search.
pub async fn search_all(
    transport: &dyn Transport,
    targets: &[ApiCollections],
    params: &SearchParams,
    progress: &dyn SearchProgress,
    cancel: &CancellationToken,
) -> Result<Vec<Item>> {
    let mut items = Vec::new();

    for target in targets {
        let target_params = params.clone().with_collections(target.collections.clone());
        let mut page = 0;
        let mut on_next_page = |api: &Api| {
            page += 1;
            progress.on_page(api, &target.collections, page);
        };
        let found = target
            .api
            .search_items(transport, &target_params, &mut on_next_page, cancel)
            .await?;
        log::info!(
            "Found {} item(s) in {} on {}",
            found.len(),
            target.collections.join(", "),
            target.api.title()
        );
        items.extend(found);
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Mutex;

    const SEARCH_URL: &str = "https://api.example.com/stac/search";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap()
    }

    fn page(ids: &[&str], next: Option<&str>) -> Value {
        let features: Vec<_> = ids
            .iter()
            .map(|id| json!({"type": "Feature", "id": id, "properties": {}, "assets": {}}))
            .collect();
        json!({
            "type": "FeatureCollection",
            "search:metadata": {"next": next},
            "features": features,
        })
    }

    fn api() -> Api {
        Api::new("a", "https://api.example.com")
    }

    #[test]
    fn body_uses_page_until_cursor() {
        let params = SearchParams::new(start())
            .with_collections(vec!["s2".to_string()])
            .with_bbox([1.0, 2.0, 3.0, 4.0])
            .with_limit(10);

        let body = serde_json::to_value(params.body(1, None)).unwrap();
        assert_eq!(
            body,
            json!({
                "collections": ["s2"],
                "bbox": [1.0, 2.0, 3.0, 4.0],
                "time": "2020-01-02T03:04:05Z",
                "limit": 10,
                "page": 1,
            })
        );

        let body = serde_json::to_value(params.body(2, Some("abc"))).unwrap();
        assert_eq!(body["next"], "abc");
        assert!(body.get("page").is_none());
    }

    #[test]
    fn time_interval_and_query() {
        let end = Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap();
        let params = SearchParams::new(start())
            .with_end(end)
            .with_query(json!({"eo:cloud_cover": {"lt": 10}}));
        assert_eq!(params.time(), "2020-01-02T03:04:05Z/2020-02-01T00:00:00Z");
        let body = serde_json::to_value(params.body(1, None)).unwrap();
        assert_eq!(body["query"]["eo:cloud_cover"]["lt"], 10);
    }

    #[tokio::test]
    async fn short_page_stops_search() {
        let transport = MockTransport::new().respond(SEARCH_URL, page(&["a"], Some("cursor")));
        let params = SearchParams::new(start()).with_limit(2).with_page_limit(10);
        let mut calls = 0;
        let items = api()
            .search_items(&transport, &params, &mut |_| calls += 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(calls, 1);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn missing_cursor_stops_search() {
        let transport = MockTransport::new().respond(SEARCH_URL, page(&["a", "b"], None));
        let params = SearchParams::new(start()).with_limit(2);
        let items = api()
            .search_items(&transport, &params, &mut |_| {}, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn full_pages_stop_at_page_limit() {
        let transport = MockTransport::new().respond(SEARCH_URL, page(&["a", "b"], Some("next")));
        let params = SearchParams::new(start()).with_limit(2).with_page_limit(3);
        let mut calls = 0;
        let items = api()
            .search_items(&transport, &params, &mut |_| calls += 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(items.len(), 6);
        assert_eq!(calls, 3);
        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        let first = requests[0].1.as_ref().unwrap();
        assert_eq!(first["page"], 1);
        assert!(first.get("next").is_none());
        let second = requests[1].1.as_ref().unwrap();
        assert_eq!(second["next"], "next");
        assert!(second.get("page").is_none());
    }

    #[tokio::test]
    async fn items_are_tagged_with_api() {
        let transport = MockTransport::new().respond(SEARCH_URL, page(&["a"], None));
        let items = api()
            .search_items(
                &transport,
                &SearchParams::new(start()),
                &mut |_| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(items[0].api_href, "https://api.example.com");
    }

    #[tokio::test]
    async fn transport_error_aborts_search() {
        let transport = MockTransport::new()
            .respond(SEARCH_URL, page(&["a", "b"], Some("next")))
            .fail(SEARCH_URL, || Error::Timeout);
        let params = SearchParams::new(start()).with_limit(2);
        let err = api()
            .search_items(&transport, &params, &mut |_| {}, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn cancelled_search_skips_callback() {
        let transport = MockTransport::new().respond(SEARCH_URL, page(&["a"], None));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut calls = 0;
        let err = api()
            .search_items(&transport, &SearchParams::new(start()), &mut |_| calls += 1, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls, 0);
        assert!(transport.requests().is_empty());
    }

    #[derive(Default)]
    struct Pages(Mutex<Vec<(String, Vec<String>, u32)>>);

    impl SearchProgress for Pages {
        fn on_page(&self, api: &Api, collections: &[String], page: u32) {
            self.0
                .lock()
                .unwrap()
                .push((api.id().to_string(), collections.to_vec(), page));
        }
    }

    #[tokio::test]
    async fn search_all_resets_page_counter_per_target() {
        let transport = MockTransport::new()
            .respond(SEARCH_URL, page(&["a", "b"], Some("n")))
            .respond(SEARCH_URL, page(&["c"], None))
            .respond("https://other.example.com/stac/search", page(&["d"], None));
        let targets = vec![
            ApiCollections::new(api(), vec!["s2".to_string()]),
            ApiCollections::new(
                Api::new("b", "https://other.example.com"),
                vec!["l8".to_string()],
            ),
        ];
        let params = SearchParams::new(start()).with_limit(2);
        let progress = Pages::default();
        let items = search_all(&transport, &targets, &params, &progress, &CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(
            *progress.0.lock().unwrap(),
            vec![
                ("a".to_string(), vec!["s2".to_string()], 1),
                ("a".to_string(), vec!["s2".to_string()], 2),
                ("b".to_string(), vec!["l8".to_string()], 1),
            ]
        );
        let requests = transport.requests();
        assert_eq!(requests[2].1.as_ref().unwrap()["collections"], json!(["l8"]));
    }

    #[tokio::test]
    async fn search_all_fails_on_first_error() {
        let transport = MockTransport::new()
            .respond(SEARCH_URL, page(&["a"], None))
            .fail("https://other.example.com/stac/search", || Error::HttpStatus {
                code: 500,
                reason: "Internal Server Error".to_string(),
            });
        let targets = vec![
            ApiCollections::new(api(), vec!["s2".to_string()]),
            ApiCollections::new(Api::new("b", "https://other.example.com"), vec![]),
        ];
        let err = search_all(
            &transport,
            &targets,
            &SearchParams::new(start()),
            &Pages::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.describe(), "500 Internal Server Error");
    }
}
