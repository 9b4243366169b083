//! Test doubles shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::http::Transport;

type ErrorFactory = Box<dyn Fn() -> Error + Send + Sync>;

enum Reply {
    Json(Value),
    Fail(ErrorFactory),
}

/// A scripted [`Transport`].
///
/// Replies are queued per URL; the last reply for a URL repeats once the
/// queue is down to one entry. Downloads write the URL into the destination
/// unless a failure is scripted for it.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<(String, Option<Value>)>>,
    downloads: Mutex<Vec<(String, PathBuf)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, value: Value) -> Self {
        self.push(url, Reply::Json(value));
        self
    }

    pub fn fail(self, url: &str, error: impl Fn() -> Error + Send + Sync + 'static) -> Self {
        self.push(url, Reply::Fail(Box::new(error)));
        self
    }

    fn push(&self, url: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    fn next_reply(&self, url: &str) -> Option<Result<Value>> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(url)?;
        let reply = if queue.len() > 1 {
            queue.pop_front()?
        } else {
            match queue.front()? {
                Reply::Json(value) => return Some(Ok(value.clone())),
                Reply::Fail(factory) => return Some(Err(factory())),
            }
        };
        Some(match reply {
            Reply::Json(value) => Ok(value),
            Reply::Fail(factory) => Err(factory()),
        })
    }

    /// Every `request` call so far, in order.
    pub fn requests(&self) -> Vec<(String, Option<Value>)> {
        self.requests.lock().unwrap().clone()
    }

    /// Every `download` call so far, in order.
    pub fn downloads(&self) -> Vec<(String, PathBuf)> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), body.cloned()));
        self.next_reply(url).unwrap_or_else(|| {
            Err(Error::HttpStatus {
                code: 404,
                reason: "Not Found".to_string(),
            })
        })
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<()> {
        self.downloads
            .lock()
            .unwrap()
            .push((url.to_string(), destination.to_path_buf()));
        if let Some(Err(e)) = self.next_reply(url) {
            return Err(e);
        }
        std::fs::write(destination, url)?;
        Ok(())
    }
}
