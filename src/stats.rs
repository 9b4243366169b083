//! Download statistics types.

use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Outcome of downloading a single item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemStats {
    /// Asset files transferred to disk.
    pub files_downloaded: usize,
    /// GeoTIFF assets referenced by URL instead of downloaded.
    pub rasters_streamed: usize,
    /// Path of the virtual raster, if one was built.
    pub composite: Option<PathBuf>,
}

/// Statistics for a whole download batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStats {
    /// Number of items the batch tried to download.
    pub items_attempted: usize,
    /// Number of items that completed.
    pub items_succeeded: usize,
    /// Number of items that failed.
    pub items_failed: usize,
    /// Asset files transferred to disk.
    pub files_downloaded: usize,
    /// GeoTIFF assets referenced by URL instead of downloaded.
    pub rasters_streamed: usize,
    /// Virtual rasters built.
    pub composites_built: usize,
    /// Total elapsed time for the batch.
    pub elapsed: Duration,
}

impl Default for BatchStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchStats {
    /// Creates empty statistics.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items_attempted: 0,
            items_succeeded: 0,
            items_failed: 0,
            files_downloaded: 0,
            rasters_streamed: 0,
            composites_built: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Returns true if no item failed.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.items_failed == 0
    }
}

/// Accumulates [`BatchStats`] while a batch runs.
pub struct BatchStatsBuilder {
    stats: BatchStats,
    start_time: Instant,
}

impl Default for BatchStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchStatsBuilder {
    /// Starts the batch clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stats: BatchStats::new(),
            start_time: Instant::now(),
        }
    }

    /// Records a completed item.
    pub fn add_item(&mut self, item: &ItemStats) {
        self.stats.items_attempted += 1;
        self.stats.items_succeeded += 1;
        self.stats.files_downloaded += item.files_downloaded;
        self.stats.rasters_streamed += item.rasters_streamed;
        if item.composite.is_some() {
            self.stats.composites_built += 1;
        }
    }

    /// Records a failed item.
    pub const fn add_failure(&mut self) {
        self.stats.items_attempted += 1;
        self.stats.items_failed += 1;
    }

    /// Stops the clock and returns the statistics.
    #[must_use]
    pub fn build(self) -> BatchStats {
        BatchStats {
            elapsed: self.start_time.elapsed(),
            ..self.stats
        }
    }
}
