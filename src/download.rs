//! Core download logic and abstractions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem, is_plain_file_name};
use crate::http::Transport;
use crate::model::{Asset, Item};
use crate::stats::{BatchStats, BatchStatsBuilder, ItemStats};
use crate::vrt::Compositor;

/// Progress message emitted before a virtual raster is built.
pub const BUILDING_VRT_MESSAGE: &str = "Building Virtual Raster...";

/// What to fetch for an item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Asset keys to fetch, in order. Keys missing from an item are skipped.
    pub assets: Vec<String>,
    /// Reference GeoTIFF assets by `/vsicurl/` URL instead of downloading.
    pub stream_cogs: bool,
    /// Build a virtual raster from the raster assets.
    pub add_to_layers: bool,
}

impl DownloadOptions {
    /// Creates options fetching `assets` with streaming and compositing off.
    #[must_use]
    pub fn new(assets: Vec<String>) -> Self {
        Self {
            assets,
            ..Self::default()
        }
    }

    /// Creates options fetching `assets` with the configured defaults.
    #[must_use]
    pub fn from_config(assets: Vec<String>, config: &DownloadConfig) -> Self {
        Self::new(assets)
            .with_stream_cogs(config.stream_cogs)
            .with_add_to_layers(config.add_to_layers)
    }

    /// Sets whether GeoTIFF assets are streamed.
    #[must_use]
    pub const fn with_stream_cogs(mut self, stream: bool) -> Self {
        self.stream_cogs = stream;
        self
    }

    /// Sets whether a virtual raster is built.
    #[must_use]
    pub const fn with_add_to_layers(mut self, add: bool) -> Self {
        self.add_to_layers = add;
        self
    }

    fn streams(&self, asset: &Asset<'_>) -> Option<String> {
        if self.stream_cogs { asset.cog() } else { None }
    }
}

/// Number of progress steps a download of `item` will emit.
///
/// One per requested key present on the item that is not streamed, plus one
/// for the virtual raster.
#[must_use]
pub fn download_steps(item: &Item, options: &DownloadOptions) -> usize {
    let transfers = options
        .assets
        .iter()
        .filter_map(|key| item.asset(key))
        .filter(|asset| options.streams(asset).is_none())
        .count();
    transfers + usize::from(options.add_to_layers)
}

/// An item queued for download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub item: Item,
    pub options: DownloadOptions,
}

impl DownloadRequest {
    #[must_use]
    pub const fn new(item: Item, options: DownloadOptions) -> Self {
        Self { item, options }
    }

    /// See [`download_steps`].
    #[must_use]
    pub fn steps(&self) -> usize {
        download_steps(&self.item, &self.options)
    }
}

/// Trait for receiving download progress updates.
///
/// Implement this trait to receive callbacks during batch downloads.
/// All methods have default no-op implementations for convenience.
pub trait DownloadProgress: Send + Sync {
    /// Called for every step with a `[i/n]`-prefixed message.
    fn on_step(&self, _step: usize, _total: usize, _message: &str) {}

    /// Called when an item's virtual raster has been written.
    fn on_layer_ready(&self, _step: usize, _total: usize, _item: &Item, _path: &Path) {}

    /// Called when an item fails; the batch moves on to the next item.
    fn on_item_error(&self, _item: &Item, _error: &Error) {}

    /// Called instead of [`on_item_error`](Self::on_item_error) when the
    /// compositing tool is not installed.
    fn on_tool_missing(&self, _error: &Error) {}

    /// Called once when the batch has run to the end.
    fn on_finished(&self, _stats: &BatchStats) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {}

/// Downloads item assets and builds virtual rasters.
pub struct Downloader<F: FileSystem = TokioFileSystem> {
    transport: Arc<dyn Transport>,
    compositor: Arc<dyn Compositor>,
    fs: F,
}

impl Downloader<TokioFileSystem> {
    /// Creates a new downloader with the default file system.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, compositor: Arc<dyn Compositor>) -> Self {
        Self::with_fs(transport, compositor, TokioFileSystem)
    }
}

impl<F: FileSystem> Downloader<F> {
    /// Creates a new downloader with a custom file system implementation.
    #[must_use]
    pub fn with_fs(transport: Arc<dyn Transport>, compositor: Arc<dyn Compositor>, fs: F) -> Self {
        Self {
            transport,
            compositor,
            fs,
        }
    }

    /// Returns the transport used for asset transfers.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Downloads the requested assets of one item into `{dir}/{item.id}`.
    ///
    /// `on_update` receives one message per step counted by
    /// [`download_steps`]. With `add_to_layers` the raster sources are
    /// composited, in request order, into `{dir}/{item.id}.vrt`.
    ///
    /// `cancel` is checked before every asset and before compositing; a
    /// transfer in progress always completes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResponse`] if the item id or an asset file name
    /// is not a plain file name, [`Error::Cancelled`] once `cancel` fires, or
    /// the first transfer or compositing error.
    pub async fn download_item(
        &self,
        item: &Item,
        options: &DownloadOptions,
        dir: &Path,
        on_update: &mut (dyn FnMut(&str) + Send),
        cancel: &CancellationToken,
    ) -> Result<ItemStats> {
        if !is_plain_file_name(&item.id) {
            return Err(Error::InvalidResponse(format!(
                "item id {:?} is not usable as a directory name",
                item.id
            )));
        }
        let item_dir = dir.join(&item.id);
        self.fs.create_dir_all(&item_dir).await?;

        let mut stats = ItemStats::default();
        let mut sources = Vec::new();

        for key in &options.assets {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let Some(asset) = item.asset(key) else {
                log::warn!("Item {} has no asset {key}", item.id);
                continue;
            };

            if let Some(cog) = options.streams(&asset) {
                log::debug!("Streaming {cog}");
                sources.push(cog);
                stats.rasters_streamed += 1;
                continue;
            }

            let destination = item_dir.join(asset.file_name()?);
            on_update(&format!("Downloading {}", asset.href()));
            self.transport.download(asset.href(), &destination).await?;
            stats.files_downloaded += 1;
            if asset.is_raster() {
                sources.push(destination.to_string_lossy().into_owned());
            }
        }

        if options.add_to_layers {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            on_update(BUILDING_VRT_MESSAGE);
            let output = dir.join(format!("{}.vrt", item.id));
            self.compositor.build(&output, &sources).await?;
            stats.composite = Some(output);
        }

        Ok(stats)
    }

    /// Downloads every request in order.
    ///
    /// The step total is computed once up front. A failing item is reported
    /// and skipped; a missing compositing tool goes to
    /// [`DownloadProgress::on_tool_missing`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires, checked before every
    /// item and every asset; `on_finished` is then not called.
    pub async fn download_all(
        &self,
        requests: &[DownloadRequest],
        dir: &Path,
        progress: &Arc<dyn DownloadProgress>,
        cancel: &CancellationToken,
    ) -> Result<BatchStats> {
        let total: usize = requests.iter().map(DownloadRequest::steps).sum();
        let count = requests.len();
        let mut step = 0;
        let mut builder = BatchStatsBuilder::new();

        log::info!("Downloading {count} item(s) in {total} step(s) to {}", dir.display());

        for (index, request) in requests.iter().enumerate() {
            if cancel.is_cancelled() {
                log::info!("Download cancelled before item {}", index + 1);
                return Err(Error::Cancelled);
            }

            let position = index + 1;
            let mut on_update = |message: &str| {
                step += 1;
                progress.on_step(step, total, &format!("[{position}/{count}] {message}"));
            };

            let result = self
                .download_item(&request.item, &request.options, dir, &mut on_update, cancel)
                .await;
            match result {
                Err(Error::Cancelled) => {
                    log::info!("Download cancelled during item {position}");
                    return Err(Error::Cancelled);
                }
                Ok(item_stats) => {
                    if let Some(path) = &item_stats.composite {
                        progress.on_layer_ready(step, total, &request.item, path);
                    }
                    builder.add_item(&item_stats);
                }
                Err(e @ Error::ToolNotFound { .. }) => {
                    log::error!("{e}");
                    progress.on_tool_missing(&e);
                    builder.add_failure();
                }
                Err(e) => {
                    log::error!("Failed to download {}: {e}", request.item.id);
                    progress.on_item_error(&request.item, &e);
                    builder.add_failure();
                }
            }
        }

        let stats = builder.build();
        log::info!(
            "Downloaded {}/{} item(s) in {:.1}s",
            stats.items_succeeded,
            stats.items_attempted,
            stats.elapsed.as_secs_f64()
        );
        progress.on_finished(&stats);
        Ok(stats)
    }
}

/// Default download directory: the configured one, else the user's download
/// directory, else the working directory.
#[must_use]
pub fn default_download_dir(config: &DownloadConfig) -> PathBuf {
    config
        .directory
        .clone()
        .or_else(dirs::download_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}
