//! Background tasks reporting through typed event channels.
//!
//! Every spawner returns a [`TaskHandle`] whose channel yields zero or more
//! progress events followed by exactly one terminal event. Cancelling the
//! handle takes effect at the next checkpoint (between APIs, pages or
//! items); from then on no progress events are sent and the terminal event
//! is the `Cancelled` variant.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::{self, CatalogProgress};
use crate::download::{DownloadProgress, DownloadRequest, Downloader};
use crate::error::{Error, Failure, Result};
use crate::fs::FileSystem;
use crate::http::Transport;
use crate::model::{Api, Item};
use crate::preview;
use crate::search::{self, ApiCollections, SearchParams, SearchProgress};
use crate::stats::BatchStats;

/// Events of [`spawn_load_api`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiEvent {
    Loaded(Api),
    Failed(Failure),
    Cancelled,
}

/// Events of [`spawn_load_apis`].
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    /// An API starts loading; `fraction` of the batch is done.
    Loading { fraction: f32, href: String },
    /// One API failed; the batch continues.
    ApiFailed { api_id: String, failure: Failure },
    /// The APIs that loaded.
    Finished(Vec<Api>),
    Failed(Failure),
    Cancelled,
}

/// Events of [`spawn_search`].
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    /// Page `page` of `collections` on `api_id` is about to be requested.
    Page {
        api_id: String,
        collections: Vec<String>,
        page: u32,
    },
    Completed(Vec<Item>),
    Failed(Failure),
    Cancelled,
}

/// Events of [`spawn_preview`].
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewEvent {
    Ready { item_id: String, path: PathBuf },
    Failed { item_id: String, failure: Failure },
    Cancelled,
}

/// Events of [`spawn_download`].
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Step {
        step: usize,
        total: usize,
        message: String,
    },
    LayerReady {
        step: usize,
        total: usize,
        item_id: String,
        path: PathBuf,
    },
    ItemFailed { item_id: String, failure: Failure },
    /// The compositing tool is not installed.
    ToolMissing(Failure),
    Finished(BatchStats),
    Failed(Failure),
    Cancelled,
}

/// Handle to a spawned task.
pub struct TaskHandle<E> {
    rx: mpsc::UnboundedReceiver<E>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl<E> TaskHandle<E> {
    /// Receives the next event; `None` once the task has finished and every
    /// event was received.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Requests cancellation at the next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns the token cancelling this task.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns true once the task has stopped running.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Receives every remaining event until the task ends.
    pub async fn collect(mut self) -> Vec<E> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }

    /// Waits for the task to end, discarding unreceived events.
    ///
    /// # Errors
    ///
    /// Returns an error if the task panicked.
    pub async fn join(self) -> Result<()> {
        self.join.await.map_err(|e| Error::Io(std::io::Error::other(e)))
    }
}

/// Sends events for one task. Progress events stop once the task is
/// cancelled; the terminal event always goes through.
struct EventSender<E> {
    tx: mpsc::UnboundedSender<E>,
    cancel: CancellationToken,
}

impl<E> EventSender<E> {
    fn progress(&self, event: E) {
        if !self.cancel.is_cancelled() {
            let _ = self.tx.send(event);
        }
    }

    fn finish(&self, event: E) {
        let _ = self.tx.send(event);
    }

    /// Sends the terminal event for `result`. A result that arrives after
    /// cancellation is reported as cancelled.
    fn finish_with<T>(
        &self,
        result: Result<T>,
        ok: impl FnOnce(T) -> E,
        failed: impl FnOnce(Failure) -> E,
        cancelled: E,
    ) {
        let event = match result {
            Ok(_) if self.cancel.is_cancelled() => cancelled,
            Err(e) if e.is_cancelled() || self.cancel.is_cancelled() => cancelled,
            Ok(value) => ok(value),
            Err(e) => failed(Failure::from(&e)),
        };
        self.finish(event);
    }
}

fn spawn_task<E, F, Fut>(run: F) -> TaskHandle<E>
where
    E: Send + 'static,
    F: FnOnce(EventSender<E>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let events = EventSender {
        tx,
        cancel: cancel.clone(),
    };
    let join = tokio::spawn(run(events));
    TaskHandle { rx, cancel, join }
}

/// Loads one API in the background.
pub fn spawn_load_api(transport: Arc<dyn Transport>, mut api: Api) -> TaskHandle<ApiEvent> {
    spawn_task(move |events| async move {
        let result = if events.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            api.load(transport.as_ref()).await.map(|()| api)
        };
        events.finish_with(result, ApiEvent::Loaded, ApiEvent::Failed, ApiEvent::Cancelled);
    })
}

impl CatalogProgress for EventSender<CatalogEvent> {
    #[allow(clippy::cast_precision_loss)]
    fn on_api_start(&self, index: usize, total: usize, api: &Api) {
        self.progress(CatalogEvent::Loading {
            fraction: index as f32 / total as f32,
            href: api.href().to_string(),
        });
    }

    fn on_api_error(&self, api: &Api, error: &Error) {
        self.progress(CatalogEvent::ApiFailed {
            api_id: api.id().to_string(),
            failure: Failure::from(error),
        });
    }
}

/// Loads several APIs in the background, isolating failures.
pub fn spawn_load_apis(transport: Arc<dyn Transport>, apis: Vec<Api>) -> TaskHandle<CatalogEvent> {
    spawn_task(move |events| async move {
        let result = catalog::load_apis(transport.as_ref(), apis, &events, &events.cancel).await;
        events.finish_with(
            result,
            CatalogEvent::Finished,
            CatalogEvent::Failed,
            CatalogEvent::Cancelled,
        );
    })
}

impl SearchProgress for EventSender<SearchEvent> {
    fn on_page(&self, api: &Api, collections: &[String], page: u32) {
        self.progress(SearchEvent::Page {
            api_id: api.id().to_string(),
            collections: collections.to_vec(),
            page,
        });
    }
}

/// Searches every target in the background.
pub fn spawn_search(
    transport: Arc<dyn Transport>,
    targets: Vec<ApiCollections>,
    params: SearchParams,
) -> TaskHandle<SearchEvent> {
    spawn_task(move |events| async move {
        let result =
            search::search_all(transport.as_ref(), &targets, &params, &events, &events.cancel)
                .await;
        events.finish_with(
            result,
            SearchEvent::Completed,
            SearchEvent::Failed,
            SearchEvent::Cancelled,
        );
    })
}

/// Fetches an item's thumbnail below `base_dir` in the background.
pub fn spawn_preview(
    transport: Arc<dyn Transport>,
    item: Item,
    base_dir: PathBuf,
) -> TaskHandle<PreviewEvent> {
    spawn_task(move |events| async move {
        let result = if events.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            preview::fetch_preview(transport.as_ref(), &item, &base_dir).await
        };
        let item_id = item.id.clone();
        events.finish_with(
            result,
            |path| PreviewEvent::Ready {
                item_id: item.id,
                path,
            },
            |failure| PreviewEvent::Failed { item_id, failure },
            PreviewEvent::Cancelled,
        );
    })
}

/// Forwards batch progress into the task's channel.
struct DownloadChannel(EventSender<DownloadEvent>);

impl DownloadProgress for DownloadChannel {
    fn on_step(&self, step: usize, total: usize, message: &str) {
        self.0.progress(DownloadEvent::Step {
            step,
            total,
            message: message.to_string(),
        });
    }

    fn on_layer_ready(&self, step: usize, total: usize, item: &Item, path: &Path) {
        self.0.progress(DownloadEvent::LayerReady {
            step,
            total,
            item_id: item.id.clone(),
            path: path.to_path_buf(),
        });
    }

    fn on_item_error(&self, item: &Item, error: &Error) {
        self.0.progress(DownloadEvent::ItemFailed {
            item_id: item.id.clone(),
            failure: Failure::from(error),
        });
    }

    fn on_tool_missing(&self, error: &Error) {
        self.0.progress(DownloadEvent::ToolMissing(Failure::from(error)));
    }
}

/// Downloads a batch into `dir` in the background.
pub fn spawn_download<F: FileSystem + 'static>(
    downloader: Arc<Downloader<F>>,
    requests: Vec<DownloadRequest>,
    dir: PathBuf,
) -> TaskHandle<DownloadEvent> {
    spawn_task(move |events| async move {
        let cancel = events.cancel.clone();
        let channel = Arc::new(DownloadChannel(events));
        let progress: Arc<dyn DownloadProgress> = channel.clone();
        let result = downloader
            .download_all(&requests, &dir, &progress, &cancel)
            .await;
        channel.0.finish_with(
            result,
            DownloadEvent::Finished,
            DownloadEvent::Failed,
            DownloadEvent::Cancelled,
        );
    })
}
