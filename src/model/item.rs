//! Items (catalog features) and their downloadable assets.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::fs::is_plain_file_name;

use super::collection::Collection;
use super::link::Link;
use super::CollectionIndex;

/// Prefix that lets GDAL read a remote file without downloading it.
pub const VSICURL_PREFIX: &str = "/vsicurl/";

/// Key of the asset used for previews.
pub const THUMBNAIL_KEY: &str = "thumbnail";

/// Media types that identify a (cloud-optimized) GeoTIFF.
const GEOTIFF_TYPES: &[&str] = &["image/x.geotiff", "image/vnd.stac.geotiff"];

/// A single searchable feature, e.g. one satellite scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// GeoJSON type, normally `Feature`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// Identifier, unique within its collection.
    #[serde(default)]
    pub id: String,

    /// GeoJSON geometry.
    #[serde(default)]
    pub geometry: Option<Value>,

    /// Bounding box of the geometry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    /// Free-form properties.
    #[serde(default)]
    pub properties: Map<String, Value>,

    /// Asset records keyed by asset key.
    #[serde(default)]
    pub assets: BTreeMap<String, AssetData>,

    /// Links to related documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,

    /// Top-level collection id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    /// Fields not covered above.
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,

    /// Href of the API this item was found through.
    #[serde(skip)]
    pub api_href: String,
}

impl Item {
    /// Creates an empty item with the given id.
    #[must_use]
    pub fn new(id: impl ToString) -> Self {
        Self {
            r#type: Some("Feature".to_string()),
            id: id.to_string(),
            geometry: None,
            bbox: None,
            properties: Map::new(),
            assets: BTreeMap::new(),
            links: Vec::new(),
            collection: None,
            additional_fields: Map::new(),
            api_href: String::new(),
        }
    }

    /// Returns the id of the collection this item declares.
    ///
    /// `properties.collection` wins over the top-level `collection` field.
    #[must_use]
    pub fn collection_id(&self) -> Option<&str> {
        self.properties
            .get("collection")
            .and_then(Value::as_str)
            .or(self.collection.as_deref())
    }

    /// Resolves this item's collection in the given index.
    ///
    /// Returns `None` if the index is empty or has no matching id.
    #[must_use]
    pub fn collection<'a>(&self, index: &CollectionIndex<'a>) -> Option<&'a Collection> {
        self.collection_id().and_then(|id| index.get(id))
    }

    /// Returns the acquisition datetime, if present.
    #[must_use]
    pub fn datetime(&self) -> Option<&str> {
        self.properties.get("datetime").and_then(Value::as_str)
    }

    /// Returns the asset with the given key.
    ///
    /// The returned asset has no band index; use [`Item::assets`] when the
    /// collection is known.
    #[must_use]
    pub fn asset(&self, key: &str) -> Option<Asset<'_>> {
        self.assets
            .get_key_value(key)
            .map(|(key, data)| Asset::new(key, data, None))
    }

    /// Builds a view of every asset, resolving band indices against
    /// `collection`.
    #[must_use]
    pub fn assets(&self, collection: Option<&Collection>) -> Vec<Asset<'_>> {
        self.assets
            .iter()
            .map(|(key, data)| {
                let band = collection.and_then(|c| c.band_index(key));
                Asset::new(key, data, band)
            })
            .collect()
    }

    /// Like [`Item::assets`], sorted by band, then title when both assets
    /// have one, else key.
    ///
    /// The title rule is not transitive when titled and untitled assets mix,
    /// so this is a stable insertion sort rather than `slice::sort`.
    #[must_use]
    pub fn sorted_assets(&self, collection: Option<&Collection>) -> Vec<Asset<'_>> {
        let mut sorted: Vec<Asset<'_>> = Vec::with_capacity(self.assets.len());
        for asset in self.assets(collection) {
            let at = sorted
                .iter()
                .rposition(|placed| placed <= &asset)
                .map_or(0, |i| i + 1);
            sorted.insert(at, asset);
        }
        sorted
    }

    /// Returns the preview asset.
    #[must_use]
    pub fn thumbnail(&self) -> Option<Asset<'_>> {
        self.asset(THUMBNAIL_KEY)
    }

    /// Returns a stable hex digest identifying this item across APIs.
    #[must_use]
    pub fn hashed_id(&self) -> String {
        let source = format!(
            "{}/collections/{}/items/{}",
            self.api_href,
            self.collection_id().unwrap_or_default(),
            self.id
        );
        Sha256::digest(source.as_bytes())
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Compares two items by id.
    #[must_use]
    pub fn cmp_by_id(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// The JSON record of an asset as published on an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetData {
    /// Location of the file.
    #[serde(default)]
    pub href: String,

    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Media type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// Semantic roles, e.g. `data`, `thumbnail`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    /// Fields not covered above.
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,
}

impl AssetData {
    /// Creates an asset record pointing at `href`.
    #[must_use]
    pub fn new(href: impl ToString) -> Self {
        Self {
            href: href.to_string(),
            title: None,
            r#type: None,
            roles: Vec::new(),
            additional_fields: Map::new(),
        }
    }

    /// Sets the media type.
    #[must_use]
    pub fn with_type(mut self, media_type: impl ToString) -> Self {
        self.r#type = Some(media_type.to_string());
        self
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl ToString) -> Self {
        self.title = Some(title.to_string());
        self
    }
}

/// A view over one of an item's assets.
#[derive(Debug, Clone, Copy)]
pub struct Asset<'a> {
    key: &'a str,
    data: &'a AssetData,
    band: Option<usize>,
}

impl<'a> Asset<'a> {
    const fn new(key: &'a str, data: &'a AssetData, band: Option<usize>) -> Self {
        Self { key, data, band }
    }

    /// Key of the asset within its item.
    #[must_use]
    pub const fn key(&self) -> &'a str {
        self.key
    }

    /// Location of the file.
    #[must_use]
    pub fn href(&self) -> &'a str {
        &self.data.href
    }

    /// Display title, if any.
    #[must_use]
    pub fn title(&self) -> Option<&'a str> {
        self.data.title.as_deref()
    }

    /// Title, falling back to the key.
    #[must_use]
    pub fn label(&self) -> &'a str {
        self.title().unwrap_or(self.key)
    }

    /// Media type, if any.
    #[must_use]
    pub fn media_type(&self) -> Option<&'a str> {
        self.data.r#type.as_deref()
    }

    /// Zero-based band index in the owning collection, if resolvable.
    #[must_use]
    pub const fn band(&self) -> Option<usize> {
        self.band
    }

    /// Returns the underlying record.
    #[must_use]
    pub const fn data(&self) -> &'a AssetData {
        self.data
    }

    /// Returns a `/vsicurl/` URL when the asset can be streamed as a GeoTIFF.
    #[must_use]
    pub fn cog(&self) -> Option<String> {
        self.media_type()
            .filter(|t| is_geotiff(t))
            .map(|_| format!("{VSICURL_PREFIX}{}", self.href()))
    }

    /// Returns true if the asset holds raster data.
    #[must_use]
    pub fn is_raster(&self) -> bool {
        let by_type = self.media_type().is_some_and(|t| {
            let t = t.to_ascii_lowercase();
            is_geotiff(&t) || t.starts_with("image/tiff") || t == "image/jp2"
        });
        by_type
            || self.data.additional_fields.contains_key("eo:name")
            || self.data.additional_fields.contains_key("eo:bands")
    }

    /// Returns the local file name for a download of this asset.
    ///
    /// Uses the final path segment of the href without query string, or the
    /// asset key if the href has no usable segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResponse`] if neither is a plain file name.
    pub fn file_name(&self) -> Result<String> {
        let path = reqwest::Url::parse(self.href()).map_or_else(
            |_| self.href().split(['?', '#']).next().unwrap_or_default().to_string(),
            |url| url.path().to_string(),
        );
        path.rsplit('/')
            .next()
            .filter(|segment| is_plain_file_name(segment))
            .or_else(|| Some(self.key).filter(|key| is_plain_file_name(key)))
            .map(String::from)
            .ok_or_else(|| {
                Error::InvalidResponse(format!("asset {:?} has no usable file name", self.key))
            })
    }
}

impl PartialEq for Asset<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Asset<'_> {}

impl PartialOrd for Asset<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Asset<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.band, other.band) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => match (self.title(), other.title()) {
                (Some(a), Some(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
                _ => self.key.to_lowercase().cmp(&other.key.to_lowercase()),
            },
        }
        .then_with(|| self.key.cmp(other.key))
    }
}

fn is_geotiff(media_type: &str) -> bool {
    let normalized: String = media_type
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    GEOTIFF_TYPES.contains(&normalized.as_str())
        || (normalized.starts_with("image/tiff") && normalized.contains("application=geotiff"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Api;
    use proptest::prelude::*;
    use serde_json::json;

    fn item() -> Item {
        let mut item: Item = serde_json::from_value(json!({
            "type": "Feature",
            "id": "LC08_001",
            "geometry": null,
            "bbox": [1.0, 2.0, 3.0, 4.0],
            "properties": {"collection": "landsat-8-l1", "datetime": "2020-01-01T00:00:00Z"},
            "assets": {
                "B1": {"href": "https://data.example.com/LC08/B1.TIF", "type": "image/x.geotiff", "eo:name": "B1"},
                "B2": {"href": "https://data.example.com/LC08/B2.TIF?token=abc", "type": "image/vnd.stac.geotiff"},
                "MTL": {"href": "https://data.example.com/LC08/MTL.txt", "type": "text/plain", "title": "Metadata"},
                "thumbnail": {"href": "https://data.example.com/LC08/thumb.jpg", "type": "image/jpeg", "title": "Thumbnail"}
            }
        }))
        .unwrap();
        item.api_href = "https://api.example.com".to_string();
        item
    }

    fn landsat() -> Collection {
        serde_json::from_value(json!({
            "id": "landsat-8-l1",
            "properties": {"eo:bands": [{"name": "B1"}, {"name": "B2"}]}
        }))
        .unwrap()
    }

    #[test]
    fn collection_id_prefers_properties() {
        let mut item = item();
        item.collection = Some("other".to_string());
        assert_eq!(item.collection_id(), Some("landsat-8-l1"));
        item.properties.remove("collection");
        assert_eq!(item.collection_id(), Some("other"));
    }

    #[test]
    fn collection_resolves_through_index() {
        let api = Api::new("id", "https://api.example.com");
        let item = item();
        assert!(item.collection(&api.collection_index()).is_none());
        let api = api.with_collections(vec![Collection::new("sentinel"), landsat()]);
        let index = api.collection_index();
        assert_eq!(item.collection(&index).map(|c| c.id.as_str()), Some("landsat-8-l1"));
    }

    #[test]
    fn cog_requires_geotiff_type() {
        let item = item();
        assert_eq!(
            item.asset("B1").unwrap().cog().as_deref(),
            Some("/vsicurl/https://data.example.com/LC08/B1.TIF")
        );
        assert!(item.asset("B2").unwrap().cog().is_some());
        assert!(item.asset("MTL").unwrap().cog().is_none());
    }

    #[test]
    fn cog_accepts_parameterized_tiff() {
        let data = AssetData::new("https://x/a.tif")
            .with_type("image/tiff; application=geotiff; profile=cloud-optimized");
        let mut item = Item::new("a");
        item.assets.insert("a".to_string(), data);
        assert!(item.asset("a").unwrap().cog().is_some());
    }

    #[test]
    fn raster_detection() {
        let item = item();
        assert!(item.asset("B1").unwrap().is_raster());
        assert!(item.asset("B2").unwrap().is_raster());
        assert!(!item.asset("MTL").unwrap().is_raster());
        assert!(!item.asset("thumbnail").unwrap().is_raster());
    }

    #[test]
    fn file_name_strips_query() {
        let item = item();
        assert_eq!(item.asset("B1").unwrap().file_name().unwrap(), "B1.TIF");
        assert_eq!(item.asset("B2").unwrap().file_name().unwrap(), "B2.TIF");
    }

    #[test]
    fn file_name_falls_back_to_key() {
        let mut item = Item::new("a");
        item.assets
            .insert("data".to_string(), AssetData::new("https://example.com/"));
        assert_eq!(item.asset("data").unwrap().file_name().unwrap(), "data");
    }

    #[test]
    fn file_name_rejects_parent_segments() {
        let mut item = Item::new("a");
        item.assets.insert("data".to_string(), AssetData::new("files/.."));
        assert_eq!(item.asset("data").unwrap().file_name().unwrap(), "data");

        item.assets.insert("..".to_string(), AssetData::new(".."));
        let err = item.asset("..").unwrap().file_name().unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[test]
    fn banded_assets_sort_first() {
        let item = item();
        let collection = landsat();
        let keys: Vec<_> = item
            .sorted_assets(Some(&collection))
            .iter()
            .map(|a| a.key())
            .collect();
        assert_eq!(keys, vec!["B1", "B2", "MTL", "thumbnail"]);
    }

    #[test]
    fn unbanded_assets_sort_by_label() {
        let item = item();
        let keys: Vec<_> = item.sorted_assets(None).iter().map(|a| a.key()).collect();
        assert_eq!(keys, vec!["B1", "B2", "MTL", "thumbnail"]);
        let mut item = Item::new("x");
        item.assets
            .insert("a".to_string(), AssetData::new("1").with_title("zulu"));
        item.assets
            .insert("b".to_string(), AssetData::new("2").with_title("Alpha"));
        let keys: Vec<_> = item.sorted_assets(None).iter().map(|a| a.key()).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn title_compared_only_when_both_present() {
        let titled = AssetData::new("1").with_title("Zulu");
        let untitled = AssetData::new("2");
        let a = Asset::new("a", &titled, None);
        let b = Asset::new("b", &untitled, None);
        assert_eq!(a.cmp(&b), Ordering::Less);
        assert_eq!(b.cmp(&a), Ordering::Greater);

        let mut item = Item::new("x");
        item.assets.insert("a".to_string(), titled.clone());
        item.assets.insert("b".to_string(), untitled.clone());
        let keys: Vec<_> = item.sorted_assets(None).iter().map(|a| a.key()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn thumbnail_lookup() {
        assert_eq!(
            item().thumbnail().map(|a| a.href()),
            Some("https://data.example.com/LC08/thumb.jpg")
        );
        assert!(Item::new("x").thumbnail().is_none());
    }

    #[test]
    fn hashed_id_is_stable_hex() {
        let item = item();
        let hash = item.hashed_id();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, item.clone().hashed_id());
        let mut other = item.clone();
        other.api_href = "https://elsewhere.example.com".to_string();
        assert_ne!(hash, other.hashed_id());
    }

    #[test]
    fn items_order_by_id() {
        assert_eq!(Item::new("a").cmp_by_id(&Item::new("b")), Ordering::Less);
    }

    fn banded_item(n: usize) -> (Item, Collection) {
        let mut item = Item::new("p");
        let mut bands = Vec::new();
        for i in 0..n {
            let key = format!("k{i}");
            item.assets.insert(key.clone(), AssetData::new(format!("https://x/{i}")));
            bands.push(json!({"name": key}));
        }
        item.assets
            .insert("unbanded".to_string(), AssetData::new("https://x/u"));
        let collection: Collection =
            serde_json::from_value(json!({"id": "c", "properties": {"eo:bands": bands}})).unwrap();
        (item, collection)
    }

    proptest! {
        #[test]
        fn band_order_matches_index(n in 1usize..12, i in 0usize..12, j in 0usize..12) {
            let (item, collection) = banded_item(n);
            let assets = item.assets(Some(&collection));
            let find = |k: usize| assets.iter().find(|a| a.key() == format!("k{}", k % n)).copied().unwrap();
            let (a, b) = (find(i), find(j));
            prop_assert_eq!(a < b, a.band().unwrap() < b.band().unwrap());
            let unbanded = assets.iter().find(|a| a.key() == "unbanded").copied().unwrap();
            prop_assert!(a < unbanded);
        }
    }
}
