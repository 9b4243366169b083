//! Progress bars and listings for the command line.

use indicatif::{ProgressBar, ProgressStyle};

use crate::format::{format_bbox, format_duration, format_interval, format_item};
use crate::model::{Api, Item};
use crate::stats::BatchStats;

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates a bar counting download steps.
pub fn make_step_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")
            .expect("progress template is valid")
            .progress_chars("━━╌"),
    );
    bar
}

/// Creates a bar for loading a batch of APIs, in percent.
pub fn make_catalog_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("Loading [{bar:40.green/white}] {percent:>3}% {wide_msg}")
            .expect("progress template is valid")
            .progress_chars("━━╌"),
    );
    bar
}

/// Creates a spinner for operations without a known length.
pub fn make_spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("progress template is valid"),
    );
    bar.set_message(message.to_string());
    bar
}

/// Prints configured APIs with what the catalog cache knows about them.
pub fn print_apis(apis: &[Api]) {
    if apis.is_empty() {
        println!("No APIs configured. Add one with `stac add <href>`.");
        return;
    }
    for api in apis {
        let state = if api.is_loaded() {
            format!("{} collection(s)", api.collections().len())
        } else {
            "not loaded".to_string()
        };
        println!("  {}  {}  ({state})", api.id(), api.title());
        println!("      {}", api.href());
    }
}

/// Prints the collections of each API, sorted by title.
pub fn print_collections(apis: &[Api]) {
    for api in apis {
        println!("\n{SEPARATOR}");
        println!("{} ({})", api.title(), api.id());
        println!("{SEPARATOR}");
        let mut collections: Vec<_> = api.collections().iter().collect();
        collections.sort_by(|a, b| a.cmp_by_title(b));
        for collection in collections {
            println!("  {}  {}", collection.id, collection.display_title());
            if let Some(bbox) = collection.extent.bboxes().first() {
                println!("      bbox {}", format_bbox(bbox));
            }
            let interval = format_interval(collection);
            if !interval.is_empty() {
                println!("      time {interval}");
            }
        }
    }
}

/// Prints search results sorted by id.
pub fn print_items(items: &[Item]) {
    if items.is_empty() {
        println!("No items found.");
        return;
    }
    let mut sorted: Vec<_> = items.iter().collect();
    sorted.sort_by(|a, b| a.cmp_by_id(b));

    println!("\n{SEPARATOR}");
    for item in sorted {
        println!("  {}", format_item(item));
    }
    println!("{SEPARATOR}");
    println!("  {} item(s)", items.len());
}

/// Prints a summary of a download batch.
pub fn print_summary(stats: &BatchStats) {
    println!("\n{SEPARATOR}");
    println!("Download Summary");
    println!("{SEPARATOR}");
    println!(
        "  Items downloaded:  {}/{}",
        stats.items_succeeded, stats.items_attempted
    );
    if stats.items_failed > 0 {
        println!("  Items failed:      {}", stats.items_failed);
    }
    println!("  Files downloaded:  {}", stats.files_downloaded);
    if stats.rasters_streamed > 0 {
        println!("  Rasters streamed:  {}", stats.rasters_streamed);
    }
    if stats.composites_built > 0 {
        println!("  Virtual rasters:   {}", stats.composites_built);
    }
    println!("  Total time:        {}", format_duration(stats.elapsed));
    println!("{SEPARATOR}");
}
