//! Collections and their descriptive metadata.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::link::Link;

/// Key under which band metadata is published.
const EO_BANDS: &str = "eo:bands";

/// A named grouping of items within an API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Identifier, unique within its API.
    #[serde(default)]
    pub id: String,

    /// STAC version the collection conforms to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stac_version: Option<String>,

    /// Short descriptive title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Detailed multi-line description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Keywords describing the collection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    /// Version of the collection itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// License identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Organizations that host or produced the data.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<Provider>,

    /// Spatial and temporal extents.
    #[serde(default)]
    pub extent: Extent,

    /// Properties shared by all items (older catalogs).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,

    /// Summaries of item properties (newer catalogs).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub summaries: Map<String, Value>,

    /// Links to related documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,

    /// Fields not covered above.
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,
}

impl Collection {
    /// Creates an otherwise empty collection with the given id.
    #[must_use]
    pub fn new(id: impl ToString) -> Self {
        Self {
            id: id.to_string(),
            stac_version: None,
            title: None,
            description: None,
            keywords: Vec::new(),
            version: None,
            license: None,
            providers: Vec::new(),
            extent: Extent::default(),
            properties: Map::new(),
            summaries: Map::new(),
            links: Vec::new(),
            additional_fields: Map::new(),
        }
    }

    /// Returns the title, falling back to the id.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }

    /// Returns the `eo:bands` entries in published order.
    ///
    /// Looks in `properties` first and falls back to `summaries`.
    #[must_use]
    pub fn bands(&self) -> &[Value] {
        self.properties
            .get(EO_BANDS)
            .or_else(|| self.summaries.get(EO_BANDS))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the zero-based position of the band with the given name.
    #[must_use]
    pub fn band_index(&self, name: &str) -> Option<usize> {
        self.bands()
            .iter()
            .position(|band| band.get("name").and_then(Value::as_str) == Some(name))
    }

    /// Compares two collections by title, case-insensitively.
    #[must_use]
    pub fn cmp_by_title(&self, other: &Self) -> Ordering {
        self.display_title()
            .to_lowercase()
            .cmp(&other.display_title().to_lowercase())
    }
}

/// Spatial and temporal bounds of a collection.
///
/// Both the early array form and the `bbox`/`interval` object form are
/// accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    /// Spatial extent as published.
    #[serde(default)]
    pub spatial: Value,

    /// Temporal extent as published.
    #[serde(default)]
    pub temporal: Value,
}

impl Extent {
    /// Returns every bounding box in the spatial extent.
    #[must_use]
    pub fn bboxes(&self) -> Vec<Vec<f64>> {
        let raw = self.spatial.get("bbox").unwrap_or(&self.spatial);
        match raw.as_array() {
            Some(values) if values.iter().all(Value::is_number) && !values.is_empty() => {
                vec![values.iter().filter_map(Value::as_f64).collect()]
            }
            Some(values) => values
                .iter()
                .filter_map(Value::as_array)
                .map(|bbox| bbox.iter().filter_map(Value::as_f64).collect())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Returns every `[start, end]` interval in the temporal extent.
    ///
    /// Open ends are `None`.
    #[must_use]
    pub fn intervals(&self) -> Vec<(Option<String>, Option<String>)> {
        let raw = self.temporal.get("interval").unwrap_or(&self.temporal);
        let Some(values) = raw.as_array().filter(|v| !v.is_empty()) else {
            return Vec::new();
        };
        let to_pair = |pair: &[Value]| {
            (
                pair.first().and_then(Value::as_str).map(String::from),
                pair.get(1).and_then(Value::as_str).map(String::from),
            )
        };
        if values.iter().all(|v| !v.is_array()) {
            return vec![to_pair(values.as_slice())];
        }
        values
            .iter()
            .filter_map(Value::as_array)
            .map(|pair| to_pair(pair.as_slice()))
            .collect()
    }
}

/// An organization that captures, processes or hosts the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// Organization name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Roles such as `producer`, `host`, `licensor`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    /// Homepage of the organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn landsat() -> Collection {
        serde_json::from_value(json!({
            "id": "landsat-8-l1",
            "title": "Landsat 8 L1",
            "keywords": ["landsat"],
            "providers": [{"name": "USGS", "roles": ["producer"]}],
            "extent": {
                "spatial": [-180, -90, 180, 90],
                "temporal": ["2013-06-01T00:00:00Z", null]
            },
            "properties": {
                "eo:bands": [
                    {"name": "B1", "common_name": "coastal"},
                    {"name": "B2", "common_name": "blue"},
                    {"name": "B3", "common_name": "green"}
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn band_index_is_position_in_eo_bands() {
        let collection = landsat();
        assert_eq!(collection.bands().len(), 3);
        assert_eq!(collection.band_index("B1"), Some(0));
        assert_eq!(collection.band_index("B3"), Some(2));
        assert_eq!(collection.band_index("thumbnail"), None);
    }

    #[test]
    fn bands_fall_back_to_summaries() {
        let collection: Collection = serde_json::from_value(json!({
            "id": "s2",
            "summaries": {"eo:bands": [{"name": "B04"}, {"name": "B08"}]}
        }))
        .unwrap();
        assert_eq!(collection.band_index("B08"), Some(1));
    }

    #[test]
    fn legacy_extent_form() {
        let extent = landsat().extent;
        assert_eq!(extent.bboxes(), vec![vec![-180.0, -90.0, 180.0, 90.0]]);
        assert_eq!(
            extent.intervals(),
            vec![(Some("2013-06-01T00:00:00Z".to_string()), None)]
        );
    }

    #[test]
    fn object_extent_form() {
        let extent: Extent = serde_json::from_value(json!({
            "spatial": {"bbox": [[-10, -5, 10, 5], [20, 20, 30, 30]]},
            "temporal": {"interval": [["2020-01-01T00:00:00Z", "2021-01-01T00:00:00Z"]]}
        }))
        .unwrap();
        assert_eq!(extent.bboxes().len(), 2);
        assert_eq!(extent.intervals().len(), 1);
    }

    #[test]
    fn missing_extent_is_empty() {
        let collection = Collection::new("empty");
        assert!(collection.extent.bboxes().is_empty());
        assert!(collection.extent.intervals().is_empty());
        assert!(collection.bands().is_empty());
    }

    #[test]
    fn title_ordering_ignores_case() {
        let mut a = Collection::new("a");
        a.title = Some("sentinel".to_string());
        let mut b = Collection::new("b");
        b.title = Some("Landsat".to_string());
        assert_eq!(a.cmp_by_title(&b), Ordering::Greater);
    }

    #[test]
    fn providers_deserialize() {
        let collection = landsat();
        assert_eq!(collection.providers[0].name.as_deref(), Some("USGS"));
        assert_eq!(collection.providers[0].roles, vec!["producer"]);
    }
}
