//! One page of search results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::item::Item;
use super::link::Link;
use crate::error::{Error, Result};

/// Paging metadata returned alongside search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    /// Opaque cursor for the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Value>,

    /// Fields not covered above.
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,
}

/// One page of a search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// GeoJSON type, normally `FeatureCollection`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// Server-provided metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,

    /// Paging metadata.
    #[serde(
        rename = "search:metadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub search_metadata: Option<SearchMetadata>,

    /// Items on this page.
    #[serde(default)]
    pub features: Vec<Item>,

    /// Links, e.g. to the next page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

impl SearchResult {
    /// Parses a search response and tags every item with the API it came from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResponse`] if the document is not a feature
    /// collection.
    pub fn from_value(api_href: &str, value: Value) -> Result<Self> {
        let mut result: Self = serde_json::from_value(value)
            .map_err(|e| Error::InvalidResponse(format!("search result: {e}")))?;
        for item in &mut result.features {
            item.api_href = api_href.to_string();
        }
        Ok(result)
    }

    /// Returns the cursor for the next page, if the server declared one.
    #[must_use]
    pub fn next(&self) -> Option<String> {
        let next = self.search_metadata.as_ref()?.next.as_ref()?;
        match next {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Returns the items on this page.
    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.features
    }

    /// Consumes the page and returns its items.
    #[must_use]
    pub fn into_items(self) -> Vec<Item> {
        self.features
    }
}
