//! Command-line interface: manage APIs, search and download items.

mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::catalog::{apis_from_config, load_cache, save_cache};
use crate::config::AppConfig;
use crate::download::{DownloadOptions, DownloadRequest, Downloader, default_download_dir};
use crate::error::{Error, Result};
use crate::http::{HttpTransport, Transport};
use crate::model::{Api, Item};
use crate::search::{ApiCollections, SearchParams};
use crate::task::{
    ApiEvent, CatalogEvent, DownloadEvent, PreviewEvent, SearchEvent, TaskHandle, spawn_download,
    spawn_load_api, spawn_load_apis, spawn_preview, spawn_search,
};
use crate::vrt::{GDALBUILDVRT, GdalBuildVrt};

use progress::{
    make_catalog_bar, make_spinner, make_step_bar, print_apis, print_collections, print_items,
    print_summary,
};

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Apis,
    Add { href: String, id: Option<String> },
    Remove { api: String },
    Refresh { force: bool },
    Collections { apis: Vec<String> },
    Search(SearchArgs),
    Help,
}

/// Options of the `search` command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchArgs {
    pub apis: Vec<String>,
    pub collections: Vec<String>,
    pub bbox: Option<[f64; 4]>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub pages: Option<u32>,
    pub query: Option<Value>,
    pub previews: bool,
    pub download: Option<PathBuf>,
    pub assets: Vec<String>,
    pub stream_cogs: bool,
    pub vrt: bool,
    pub gdal_path: Option<PathBuf>,
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidArgument(message.into())
}

/// Returns the value following the flag at `args[*i]`, advancing `i`.
fn value_of<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str> {
    let flag = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| invalid(format!("{flag} needs a value")))
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| invalid(format!("{flag}: not a number: {value}")))
}

/// Splits a comma separated list, dropping empty entries.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parses `west,south,east,north`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] unless there are exactly four numbers.
pub fn parse_bbox(value: &str) -> Result<[f64; 4]> {
    let numbers = value
        .split(',')
        .map(|v| parse_number::<f64>("--bbox", v.trim()))
        .collect::<Result<Vec<_>>>()?;
    <[f64; 4]>::try_from(numbers)
        .map_err(|_| invalid(format!("--bbox needs four numbers: {value}")))
}

/// Parses an RFC 3339 timestamp or a `YYYY-MM-DD` date (midnight UTC).
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for anything else.
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| invalid(format!("not a date: {value}")))
}

fn parse_search(args: &[String]) -> Result<SearchArgs> {
    let mut search = SearchArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-a" | "--api" => search.apis.push(value_of(args, &mut i)?.to_string()),
            "-c" | "--collection" => search
                .collections
                .extend(parse_list(value_of(args, &mut i)?)),
            "-b" | "--bbox" => search.bbox = Some(parse_bbox(value_of(args, &mut i)?)?),
            "-s" | "--start" => search.start = Some(parse_datetime(value_of(args, &mut i)?)?),
            "-e" | "--end" => search.end = Some(parse_datetime(value_of(args, &mut i)?)?),
            "-l" | "--limit" => {
                search.limit = Some(parse_number("--limit", value_of(args, &mut i)?)?);
            }
            "-p" | "--pages" => {
                search.pages = Some(parse_number("--pages", value_of(args, &mut i)?)?);
            }
            "-q" | "--query" => {
                let value = value_of(args, &mut i)?;
                let query = serde_json::from_str(value)
                    .map_err(|e| invalid(format!("--query is not JSON: {e}")))?;
                search.query = Some(query);
            }
            "--previews" => search.previews = true,
            "-d" | "--download" => {
                search.download = Some(PathBuf::from(value_of(args, &mut i)?));
            }
            "--assets" => search.assets.extend(parse_list(value_of(args, &mut i)?)),
            "--stream-cogs" => search.stream_cogs = true,
            "--vrt" => search.vrt = true,
            "--gdal-path" => search.gdal_path = Some(PathBuf::from(value_of(args, &mut i)?)),
            other => return Err(invalid(format!("unknown option: {other}"))),
        }
        i += 1;
    }
    Ok(search)
}

/// Parses the arguments following the program name.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for unknown commands or options.
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };
    match command.as_str() {
        "apis" => Ok(Command::Apis),
        "add" => {
            let mut href = None;
            let mut id = None;
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "--id" => id = Some(value_of(rest, &mut i)?.to_string()),
                    arg if !arg.starts_with('-') && href.is_none() => href = Some(arg.to_string()),
                    other => return Err(invalid(format!("unexpected argument: {other}"))),
                }
                i += 1;
            }
            let href = href.ok_or_else(|| invalid("add needs an API href"))?;
            Ok(Command::Add { href, id })
        }
        "remove" => match rest {
            [api] => Ok(Command::Remove { api: api.clone() }),
            _ => Err(invalid("remove needs exactly one API id or href")),
        },
        "refresh" => match rest {
            [] => Ok(Command::Refresh { force: false }),
            [flag] if flag == "-f" || flag == "--force" => Ok(Command::Refresh { force: true }),
            _ => Err(invalid("refresh accepts only --force")),
        },
        "collections" => {
            let mut apis = Vec::new();
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "-a" | "--api" => apis.push(value_of(rest, &mut i)?.to_string()),
                    other => return Err(invalid(format!("unknown option: {other}"))),
                }
                i += 1;
            }
            Ok(Command::Collections { apis })
        }
        "search" => parse_search(rest).map(Command::Search),
        "-h" | "--help" | "help" => Ok(Command::Help),
        other => Err(invalid(format!("unknown command: {other}"))),
    }
}

/// Prints usage to stderr.
pub fn print_usage() {
    eprintln!("Usage: stac <command> [OPTIONS]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  apis                    List configured APIs");
    eprintln!("  add <href> [--id ID]    Add an API and load its catalog");
    eprintln!("  remove <id|href>        Remove an API");
    eprintln!("  refresh [-f|--force]    Reload every API's catalog");
    eprintln!("  collections [-a ID]...  List collections");
    eprintln!("  search [OPTIONS]        Search items, optionally downloading them");
    eprintln!();
    eprintln!("Search options:");
    eprintln!("  -a, --api <ID>          API to search (repeatable, default: all)");
    eprintln!("  -c, --collection <IDS>  Comma separated collection ids (default: all)");
    eprintln!("  -b, --bbox <W,S,E,N>    Bounding box (default: whole world)");
    eprintln!("  -s, --start <DATE>      Start time, RFC 3339 or YYYY-MM-DD (required)");
    eprintln!("  -e, --end <DATE>        End time");
    eprintln!("  -l, --limit <N>         Items per page");
    eprintln!("  -p, --pages <N>         Maximum pages per API");
    eprintln!("  -q, --query <JSON>      Structured property filter");
    eprintln!("      --previews          Fetch thumbnails of the results");
    eprintln!("  -d, --download <DIR>    Download the results into DIR");
    eprintln!("      --assets <KEYS>     Comma separated asset keys (default: all)");
    eprintln!("      --stream-cogs       Reference GeoTIFFs by URL instead of downloading");
    eprintln!("      --vrt               Build a virtual raster per item");
    eprintln!("      --gdal-path <DIR>   Directory containing {GDALBUILDVRT}");
    eprintln!();
    eprintln!("Environment:");
    eprintln!(
        "  {}     Configuration directory",
        crate::config::CONFIG_DIR_ENV
    );
    eprintln!("  RUST_LOG               Log level (e.g. info, debug)");
}

/// Forwards task events to `on_event` until the task ends. Ctrl-C cancels
/// the task; its terminal event still arrives.
async fn drive<E>(handle: &mut TaskHandle<E>, mut on_event: impl FnMut(E)) {
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = handle.recv() => match event {
                Some(event) => on_event(event),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                eprintln!("Cancelling...");
                handle.cancel();
            }
        }
    }
}

/// Finds the API matching an id or href.
fn find_api<'a>(apis: &'a [Api], id_or_href: &str) -> Result<&'a Api> {
    let href = id_or_href.trim_end_matches('/');
    apis.iter()
        .find(|api| api.id() == id_or_href || api.href() == href)
        .ok_or_else(|| Error::UnknownApi(id_or_href.to_string()))
}

/// Pairs each API with the requested collections it serves. With no
/// collections requested every collection is searched.
fn search_targets(apis: &[Api], collections: &[String]) -> Vec<ApiCollections> {
    apis.iter()
        .filter_map(|api| {
            let ids: Vec<String> = if collections.is_empty() {
                api.collections().iter().map(|c| c.id.clone()).collect()
            } else if api.is_loaded() {
                let index = api.collection_index();
                collections
                    .iter()
                    .filter(|id| index.get(id.as_str()).is_some())
                    .cloned()
                    .collect()
            } else {
                collections.to_vec()
            };
            (!ids.is_empty()).then(|| ApiCollections::new(api.clone(), ids))
        })
        .collect()
}

/// Asset keys to download for `item`: the requested ones, or every asset in
/// band order.
fn requested_assets(item: &Item, apis: &[Api], requested: &[String]) -> Vec<String> {
    if !requested.is_empty() {
        return requested.to_vec();
    }
    let api = apis.iter().find(|api| api.href() == item.api_href);
    let index = api.map(Api::collection_index).unwrap_or_default();
    item.sorted_assets(item.collection(&index))
        .iter()
        .map(|asset| asset.key().to_string())
        .collect()
}

/// Replaces each cached API by its freshly loaded version. APIs that failed
/// to load keep their cached state. The flag is true if every API loaded.
fn merge_loaded(cached: Vec<Api>, loaded: &[Api]) -> (Vec<Api>, bool) {
    let mut complete = true;
    let merged = cached
        .into_iter()
        .map(|api| match loaded.iter().find(|l| l.id() == api.id()) {
            Some(fresh) => fresh.clone(),
            None => {
                complete = false;
                api
            }
        })
        .collect();
    (merged, complete)
}

struct Session {
    config: AppConfig,
    config_path: PathBuf,
    catalog_path: PathBuf,
    transport: Arc<dyn Transport>,
}

impl Session {
    fn open(dir: &Path) -> Result<Self> {
        let config_path = AppConfig::config_path(dir);
        let config = AppConfig::load_or_default(&config_path)?;
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.http)?);
        Ok(Self {
            config,
            config_path,
            catalog_path: AppConfig::catalog_path(dir),
            transport,
        })
    }

    /// Configured APIs, filled in from the catalog cache where possible.
    fn cached_apis(&self) -> Vec<Api> {
        let cached = match load_cache(&self.catalog_path) {
            Ok(apis) => apis,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                log::warn!("Ignoring catalog cache {}: {e}", self.catalog_path.display());
                Vec::new()
            }
        };
        apis_from_config(&self.config, &cached)
    }

    fn store(&mut self, apis: &[Api], refreshed: bool) -> Result<()> {
        save_cache(&self.catalog_path, apis)?;
        if refreshed {
            self.config.mark_refreshed(Utc::now());
        }
        self.config.save(&self.config_path)
    }

    /// Returns the APIs, reloading them when the cache is stale or `force`
    /// is set. APIs that fail to load keep their cached state.
    async fn refresh(&mut self, force: bool) -> Result<Vec<Api>> {
        let apis = self.cached_apis();
        let fresh = !self.config.needs_refresh(Utc::now()) && apis.iter().all(Api::is_loaded);
        if apis.is_empty() || (fresh && !force) {
            return Ok(apis);
        }

        let bar = make_catalog_bar();
        let mut handle = spawn_load_apis(Arc::clone(&self.transport), apis.clone());
        let mut outcome = None;
        drive(&mut handle, |event| match event {
            CatalogEvent::Loading { fraction, href } => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                bar.set_position((fraction * 100.0) as u64);
                bar.set_message(href);
            }
            CatalogEvent::ApiFailed { api_id, failure } => {
                bar.println(format!("  Failed to load {api_id}: {failure}"));
            }
            other => outcome = Some(other),
        })
        .await;
        bar.finish_and_clear();

        match outcome {
            Some(CatalogEvent::Finished(loaded)) => {
                let (merged, complete) = merge_loaded(apis, &loaded);
                if !complete {
                    log::warn!("Some APIs failed to load; the catalog stays due for refresh");
                }
                self.store(&merged, complete)?;
                println!("Loaded {}/{} API(s)", loaded.len(), merged.len());
                Ok(merged)
            }
            Some(CatalogEvent::Failed(failure)) => Err(Error::Failed(failure)),
            _ => Err(Error::Cancelled),
        }
    }

    async fn add(&mut self, href: &str, id: Option<String>) -> Result<()> {
        let api = id.map_or_else(|| Api::with_generated_id(href), |id| Api::new(id, href));
        self.config.add_api(api.id(), api.href());
        self.config.save(&self.config_path)?;
        println!("Added {} ({})", api.href(), api.id());

        let spinner = make_spinner(&format!("Loading {}", api.href()));
        let mut handle = spawn_load_api(Arc::clone(&self.transport), api);
        let mut outcome = None;
        drive(&mut handle, |event| outcome = Some(event)).await;
        spinner.finish_and_clear();

        match outcome {
            Some(ApiEvent::Loaded(loaded)) => {
                println!(
                    "Loaded {} with {} collection(s)",
                    loaded.title(),
                    loaded.collections().len()
                );
                let apis: Vec<Api> = self
                    .cached_apis()
                    .into_iter()
                    .map(|api| if api.id() == loaded.id() { loaded.clone() } else { api })
                    .collect();
                self.store(&apis, false)
            }
            Some(ApiEvent::Failed(failure)) => {
                eprintln!("Unable to load the API: {failure}");
                Ok(())
            }
            _ => Err(Error::Cancelled),
        }
    }

    fn remove(&mut self, id_or_href: &str) -> Result<()> {
        let apis = self.cached_apis();
        if !self.config.remove_api(id_or_href) {
            return Err(Error::UnknownApi(id_or_href.to_string()));
        }
        self.config.save(&self.config_path)?;
        let remaining: Vec<Api> = apis
            .into_iter()
            .filter(|api| self.config.apis.iter().any(|entry| entry.id == api.id()))
            .collect();
        save_cache(&self.catalog_path, &remaining)?;
        println!("Removed {id_or_href}");
        Ok(())
    }

    async fn search(&mut self, args: SearchArgs) -> Result<()> {
        let start = args
            .start
            .ok_or_else(|| invalid("search needs --start"))?;
        let apis = self.refresh(false).await?;
        let selected: Vec<Api> = if args.apis.is_empty() {
            apis.clone()
        } else {
            args.apis
                .iter()
                .map(|id| find_api(&apis, id).cloned())
                .collect::<Result<_>>()?
        };
        let targets = search_targets(&selected, &args.collections);
        if targets.is_empty() {
            println!("No matching collections to search.");
            return Ok(());
        }

        let mut params = SearchParams::new(start).with_config(&self.config.search);
        if let Some(bbox) = args.bbox {
            params = params.with_bbox(bbox);
        }
        if let Some(end) = args.end {
            params = params.with_end(end);
        }
        if let Some(limit) = args.limit {
            params = params.with_limit(limit);
        }
        if let Some(pages) = args.pages {
            params = params.with_page_limit(pages);
        }
        if let Some(query) = args.query.clone() {
            params = params.with_query(query);
        }

        let spinner = make_spinner("Searching...");
        let mut handle = spawn_search(Arc::clone(&self.transport), targets, params);
        let mut outcome = None;
        drive(&mut handle, |event| match event {
            SearchEvent::Page {
                api_id,
                collections,
                page,
            } => spinner.set_message(format!(
                "Searching {} on {api_id}, page {page}",
                collections.join(", ")
            )),
            other => outcome = Some(other),
        })
        .await;
        spinner.finish_and_clear();

        let items = match outcome {
            Some(SearchEvent::Completed(items)) => items,
            Some(SearchEvent::Failed(failure)) => return Err(Error::Failed(failure)),
            _ => return Err(Error::Cancelled),
        };
        print_items(&items);

        if args.previews {
            self.previews(&items).await;
        }
        if let Some(dir) = &args.download {
            self.download(&items, &apis, &args, dir).await?;
        }
        Ok(())
    }

    async fn previews(&self, items: &[Item]) {
        let base = std::env::temp_dir();
        for item in items.iter().filter(|item| item.thumbnail().is_some()) {
            let mut handle = spawn_preview(Arc::clone(&self.transport), item.clone(), base.clone());
            drive(&mut handle, |event| match event {
                PreviewEvent::Ready { item_id, path } => {
                    println!("  {item_id}: {}", path.display());
                }
                PreviewEvent::Failed { item_id, failure } => {
                    eprintln!("  {item_id}: preview failed: {failure}");
                }
                PreviewEvent::Cancelled => {}
            })
            .await;
        }
    }

    async fn download(
        &self,
        items: &[Item],
        apis: &[Api],
        args: &SearchArgs,
        dir: &Path,
    ) -> Result<()> {
        let mut config = self.config.download.clone();
        config.stream_cogs |= args.stream_cogs;
        config.add_to_layers |= args.vrt;
        if let Some(path) = &args.gdal_path {
            config.gdal_path = Some(path.clone());
        }
        let dir = if dir.as_os_str().is_empty() {
            default_download_dir(&config)
        } else {
            dir.to_path_buf()
        };

        let requests: Vec<DownloadRequest> = items
            .iter()
            .map(|item| {
                let assets = requested_assets(item, apis, &args.assets);
                DownloadRequest::new(item.clone(), DownloadOptions::from_config(assets, &config))
            })
            .collect();
        let total = requests.iter().map(DownloadRequest::steps).sum();

        let compositor = Arc::new(GdalBuildVrt::from_config(config.gdal_path.as_deref()));
        let downloader = Arc::new(Downloader::new(Arc::clone(&self.transport), compositor));
        let bar = make_step_bar(total);
        let mut handle = spawn_download(downloader, requests, dir);
        let mut outcome = None;
        drive(&mut handle, |event| match event {
            DownloadEvent::Step { step, message, .. } => {
                bar.set_position(step as u64);
                bar.set_message(message);
            }
            DownloadEvent::LayerReady { item_id, path, .. } => {
                bar.println(format!("  {item_id}: {}", path.display()));
            }
            DownloadEvent::ItemFailed { item_id, failure } => {
                bar.println(format!("  Error downloading {item_id}: {failure}"));
            }
            DownloadEvent::ToolMissing(_) => {
                bar.println(format!("  Unable to find \"{GDALBUILDVRT}\" in current path"));
            }
            other => outcome = Some(other),
        })
        .await;
        bar.finish_and_clear();

        match outcome {
            Some(DownloadEvent::Finished(stats)) => {
                print_summary(&stats);
                Ok(())
            }
            Some(DownloadEvent::Failed(failure)) => Err(Error::Failed(failure)),
            _ => Err(Error::Cancelled),
        }
    }
}

/// Runs the command line `args` (without the program name).
///
/// # Errors
///
/// Returns an error if the arguments are invalid, the configuration cannot
/// be read or written, or the command fails.
pub async fn run(args: &[String]) -> Result<()> {
    let command = parse_args(args)?;
    if command == Command::Help {
        print_usage();
        return Ok(());
    }

    let mut session = Session::open(&AppConfig::config_dir())?;
    match command {
        Command::Apis => {
            print_apis(&session.cached_apis());
            Ok(())
        }
        Command::Add { href, id } => session.add(&href, id).await,
        Command::Remove { api } => session.remove(&api),
        Command::Refresh { force } => session.refresh(force).await.map(|_| ()),
        Command::Collections { apis } => {
            let loaded = session.refresh(false).await?;
            let selected = if apis.is_empty() {
                loaded
            } else {
                apis.iter()
                    .map(|id| find_api(&loaded, id).cloned())
                    .collect::<Result<_>>()?
            };
            print_collections(&selected);
            Ok(())
        }
        Command::Search(args) => session.search(args).await,
        Command::Help => Ok(()),
    }
}
