//! stac-dl - search STAC APIs and download item assets.
//!
//! The library browses STAC API catalogs, runs paginated item searches and
//! downloads or streams item assets, optionally compositing raster bands
//! into a GDAL virtual raster. It is independent of any UI: long-running
//! operations report through progress traits, or through typed event
//! channels when spawned with the [`task`] functions.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use stac_dl::{
//!     Api, ApiCollections, GdalBuildVrt, HttpConfig, HttpTransport, NoProgress, SearchParams,
//!     Transport,
//! };
//! use stac_dl::download::{DownloadOptions, DownloadProgress, DownloadRequest, Downloader};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> stac_dl::Result<()> {
//! let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&HttpConfig::default())?);
//! let cancel = CancellationToken::new();
//!
//! // Load the root document and collections of an API
//! let mut api = Api::new("earth-search", "https://earth-search.aws.element84.com/v0");
//! api.load(transport.as_ref()).await?;
//!
//! // Search one collection
//! let start = chrono::Utc::now() - chrono::Duration::days(7);
//! let targets = [ApiCollections::new(api, vec!["sentinel-s2-l2a-cogs".to_string()])];
//! let items = stac_dl::search::search_all(
//!     transport.as_ref(),
//!     &targets,
//!     &SearchParams::new(start),
//!     &NoProgress,
//!     &cancel,
//! )
//! .await?;
//!
//! // Stream the bands and composite them
//! let requests: Vec<_> = items
//!     .into_iter()
//!     .map(|item| {
//!         let options = DownloadOptions::new(vec!["B04".into(), "B03".into(), "B02".into()])
//!             .with_stream_cogs(true)
//!             .with_add_to_layers(true);
//!         DownloadRequest::new(item, options)
//!     })
//!     .collect();
//! let downloader = Downloader::new(transport, Arc::new(GdalBuildVrt::new()));
//! let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);
//! let stats = downloader
//!     .download_all(&requests, Path::new("downloads"), &progress, &cancel)
//!     .await?;
//! println!("Built {} virtual rasters", stats.composites_built);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod format;
pub mod fs;
pub mod http;
pub mod model;
pub mod preview;
pub mod search;
pub mod stats;
pub mod task;
pub mod vrt;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use catalog::CatalogProgress;
pub use config::{AppConfig, DownloadConfig, HttpConfig, SearchConfig};
pub use download::{DownloadOptions, DownloadProgress, DownloadRequest, Downloader, NoProgress};
pub use error::{Error, ErrorKind, Failure, Result};
pub use fs::{FileSystem, TokioFileSystem};
pub use http::{HttpTransport, Transport};
pub use model::{Api, Asset, AssetData, Collection, CollectionIndex, Item, Link, SearchResult};
pub use search::{ApiCollections, SearchParams, SearchProgress};
pub use stats::{BatchStats, ItemStats};
pub use task::{
    ApiEvent, CatalogEvent, DownloadEvent, PreviewEvent, SearchEvent, TaskHandle,
};
pub use vrt::{Compositor, GdalBuildVrt};
