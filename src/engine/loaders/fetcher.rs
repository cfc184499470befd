//! Byte fetching behind a trait, so loaders never care where bytes come from.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{ Mutex, PoisonError };
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;
use url::Url;

use super::error::FetchError;

/// Fetches the raw bytes behind a URL.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

impl<F: Fetcher> Fetcher for std::sync::Arc<F> {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<Bytes, FetchError>> + Send {
        (**self).fetch(url)
    }
}

/// `http(s)://` through reqwest, `file://` through tokio's filesystem API.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_http(&self, url: &Url) -> Result<Bytes, FetchError> {
        let response = self.client
            .get(url.clone())
            .send().await
            .map_err(|e| FetchError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        response.bytes().await.map_err(|e| FetchError::Transport {
            url: url.clone(),
            message: e.to_string(),
        })
    }

    async fn fetch_file(&self, url: &Url) -> Result<Bytes, FetchError> {
        let path = url
            .to_file_path()
            .map_err(|_| FetchError::UnsupportedScheme { url: url.clone() })?;
        let data = tokio::fs::read(&path).await.map_err(|source| FetchError::Io {
            url: url.clone(),
            source,
        })?;
        Ok(Bytes::from(data))
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Bytes, FetchError> {
        debug!(%url, "fetching");
        match url.scheme() {
            "http" | "https" => self.fetch_http(url).await,
            "file" => self.fetch_file(url).await,
            _ => Err(FetchError::UnsupportedScheme { url: url.clone() }),
        }
    }
}

#[derive(Debug, Clone)]
enum MemoryResponse {
    Body(Bytes),
    Status(u16),
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    response: MemoryResponse,
    delay: Duration,
}

/// In-memory fetcher for embedding pre-bundled assets and for tests.
///
/// Every request is recorded, so callers can check which URLs were asked for.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    entries: HashMap<Url, MemoryEntry>,
    requests: Mutex<Vec<Url>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: Url, body: impl Into<Bytes>) -> Self {
        self.insert(url, MemoryResponse::Body(body.into()), Duration::ZERO);
        self
    }

    /// Body that only becomes available after `delay`.
    pub fn with_delayed_body(mut self, url: Url, body: impl Into<Bytes>, delay: Duration) -> Self {
        self.insert(url, MemoryResponse::Body(body.into()), delay);
        self
    }

    /// Answer `url` with a non-2xx status.
    pub fn with_status(mut self, url: Url, status: u16) -> Self {
        self.insert(url, MemoryResponse::Status(status), Duration::ZERO);
        self
    }

    pub fn with_delayed_status(mut self, url: Url, status: u16, delay: Duration) -> Self {
        self.insert(url, MemoryResponse::Status(status), delay);
        self
    }

    fn insert(&mut self, url: Url, response: MemoryResponse, delay: Duration) {
        self.entries.insert(url, MemoryEntry { response, delay });
    }

    /// URLs requested so far, in request order.
    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn request_count(&self, url: &Url) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|u| *u == url)
            .count()
    }
}

impl Fetcher for MemoryFetcher {
    async fn fetch(&self, url: &Url) -> Result<Bytes, FetchError> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(url.clone());

        let entry = self.entries
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound { url: url.clone() })?;

        if !entry.delay.is_zero() {
            tokio::time::sleep(entry.delay).await;
        }

        match entry.response {
            MemoryResponse::Body(body) => Ok(body),
            MemoryResponse::Status(status) => Err(FetchError::Status { url: url.clone(), status }),
        }
    }
}
