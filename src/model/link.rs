//! Hypermedia links.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A hypermedia relation found in catalog documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Target of the link.
    #[serde(default)]
    pub href: String,

    /// Relation type, e.g. `self`, `child`, `item`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,

    /// Media type of the target.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// Human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Fields not covered above.
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,
}

impl Link {
    /// Creates a link with the given href and relation.
    #[must_use]
    pub fn new(href: impl ToString, rel: impl ToString) -> Self {
        Self {
            href: href.to_string(),
            rel: Some(rel.to_string()),
            r#type: None,
            title: None,
            additional_fields: Map::new(),
        }
    }

    /// Returns true if this link has the given relation.
    #[must_use]
    pub fn is(&self, rel: &str) -> bool {
        self.rel.as_deref() == Some(rel)
    }
}
