//! Read views over STAC catalog documents.

mod api;
mod collection;
mod item;
mod link;
mod search;

use std::collections::HashMap;

pub use api::Api;
pub use collection::{Collection, Extent, Provider};
pub use item::{Asset, AssetData, Item, THUMBNAIL_KEY, VSICURL_PREFIX};
pub use link::Link;
pub use search::{SearchMetadata, SearchResult};

/// Immutable id lookup over a set of collections.
///
/// Items resolve their collection through an index instead of holding a
/// pointer back to their API.
#[derive(Debug, Clone, Default)]
pub struct CollectionIndex<'a> {
    by_id: HashMap<&'a str, &'a Collection>,
}

impl<'a> CollectionIndex<'a> {
    /// Indexes the given collections by id; the first of any duplicate wins.
    pub fn new(collections: impl IntoIterator<Item = &'a Collection>) -> Self {
        let mut by_id = HashMap::new();
        for collection in collections {
            by_id.entry(collection.id.as_str()).or_insert(collection);
        }
        Self { by_id }
    }

    /// Returns the collection with the given id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&'a Collection> {
        self.by_id.get(id).copied()
    }

    /// Number of indexed collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
