//! Formatting helpers for durations, extents and search results.

use std::time::Duration;

use crate::model::{Collection, Item};

/// Formats a duration as a human-readable string (e.g. "5.0s", "1m 05s", "1h 01m 05s").
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!(
            "{}h {:02}m {:02}s",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        )
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}.{:01}s", secs, d.subsec_millis() / 100)
    }
}

/// Formats a bounding box as `w,s,e,n` with at most four decimals.
#[must_use]
pub fn format_bbox(bbox: &[f64]) -> String {
    bbox.iter()
        .map(|v| {
            let s = format!("{v:.4}");
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Formats the first temporal interval of a collection, `..` marking an
/// open end.
#[must_use]
pub fn format_interval(collection: &Collection) -> String {
    collection
        .extent
        .intervals()
        .first()
        .map_or_else(String::new, |(start, end)| {
            format!(
                "{}/{}",
                start.as_deref().unwrap_or(".."),
                end.as_deref().unwrap_or("..")
            )
        })
}

/// One line describing a search result.
#[must_use]
pub fn format_item(item: &Item) -> String {
    format!(
        "{}  {}  {}  {} asset(s)",
        item.id,
        item.collection_id().unwrap_or("-"),
        item.datetime().unwrap_or("-"),
        item.assets.len()
    )
}
