//! HTTP transport for STAC documents and asset files.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem, part_path};

/// The network operations the rest of the crate depends on.
///
/// Implementations must classify failures as [`Error::Network`],
/// [`Error::Timeout`] or [`Error::HttpStatus`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches a JSON document.
    ///
    /// Without a body this is a GET; with a body the body is POSTed as JSON.
    async fn request(&self, url: &str, body: Option<&Value>) -> Result<Value>;

    /// Transfers the resource at `url` into `destination`.
    async fn download(&self, url: &str, destination: &Path) -> Result<()>;
}

/// [`Transport`] backed by `reqwest`.
///
/// Downloads stream into `{destination}.part` and are renamed on success, so
/// a failed transfer never leaves a truncated file under the final name.
#[derive(Debug, Clone)]
pub struct HttpTransport<F: FileSystem = TokioFileSystem> {
    client: reqwest::Client,
    fs: F,
}

impl HttpTransport<TokioFileSystem> {
    /// Creates a transport with the given timeouts and user agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            fs: TokioFileSystem,
        })
    }
}

impl<F: FileSystem> HttpTransport<F> {
    /// Creates a transport over an existing client and file system.
    #[must_use]
    pub const fn with_client(client: reqwest::Client, fs: F) -> Self {
        Self { client, fs }
    }

    /// Returns a reference to the underlying HTTP client.
    #[must_use]
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn stream_to_file(&self, response: reqwest::Response, part: &Path) -> Result<()> {
        let mut file = self.fs.create_file(part).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

/// Builds a configured HTTP client for STAC requests.
fn build_http_client(config: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .read_timeout(Duration::from_secs(config.read_timeout_secs))
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(30))
        .user_agent(&config.user_agent)
        .build()
}

/// Maps a non-success status to [`Error::HttpStatus`].
fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::HttpStatus {
            code: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
        })
    }
}

#[async_trait]
impl<F: FileSystem> Transport for HttpTransport<F> {
    async fn request(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        let builder = match body {
            Some(body) => {
                log::debug!("POST {url}");
                self.client.post(url).json(body)
            }
            None => {
                log::debug!("GET {url}");
                self.client.get(url)
            }
        };
        let response = check_status(builder.send().await?)?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidResponse(format!("{url} did not return JSON: {e}")))
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<()> {
        log::debug!("Downloading {url} to {}", destination.display());
        let response = check_status(self.client.get(url).send().await?)?;
        let part = part_path(destination);

        match self.stream_to_file(response, &part).await {
            Ok(()) => {
                self.fs.rename_file(&part, destination).await?;
                Ok(())
            }
            Err(e) => {
                let _ = self.fs.remove_file(&part).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serves every connection on a local port with `response` once the
    /// request head has arrived. An empty response keeps the connection open
    /// without replying.
    async fn serve(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&chunk[..n]),
                        }
                    }
                    if response.is_empty() {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    } else {
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                });
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn transport_is_object_safe() {
        fn assert_object(_: &dyn Transport) {}
        let transport = HttpTransport::new(&HttpConfig::default()).unwrap();
        assert_object(&transport);
    }

    #[test]
    fn http_transport_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HttpTransport>();
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let config = HttpConfig {
            connect_timeout_secs: 2,
            ..HttpConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        // Port 9 (discard) on localhost is closed on any sane test machine.
        let err = transport
            .request("http://127.0.0.1:9/stac", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NetworkUnreachable);
    }

    #[tokio::test]
    async fn not_found_is_http_status() {
        let base =
            serve("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        let transport = HttpTransport::new(&HttpConfig::default()).unwrap();

        let err = transport
            .request(&format!("{base}/stac"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HttpStatus);
        assert_eq!(err.describe(), "404 Not Found");

        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("B1.TIF");
        let err = transport
            .download(&format!("{base}/B1.TIF"), &destination)
            .await
            .unwrap_err();
        assert_eq!(err.describe(), "404 Not Found");
        assert!(!destination.exists());
        assert!(!part_path(&destination).exists());
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let base = serve("").await;
        let config = HttpConfig {
            read_timeout_secs: 1,
            ..HttpConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();

        let err = transport
            .request(&format!("{base}/stac"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.describe(), "Timeout");
    }
}
