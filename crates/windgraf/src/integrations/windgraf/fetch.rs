use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

const USER_AGENT: &str = concat!("windgraf/", env!("CARGO_PKG_VERSION"));

/// A fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub status: StatusCode,
    pub body: String,
}

impl Page {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Trait for fetching a station page
///
/// This trait allows for mocking the HTTP client for testing purposes
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Issue a plain GET for `url`.
    ///
    /// Any HTTP status is a successful fetch; only transport failures are errors.
    async fn fetch(&self, url: &str) -> Result<Page, FetchError>;
}

/// Real page fetcher using reqwest
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status();
        if status != StatusCode::OK {
            return Ok(Page::new(status, String::new()));
        }

        let body = response.text().await.map_err(request_error)?;
        Ok(Page::new(status, body))
    }
}

/// Mock fetcher for testing
///
/// Serves the queued pages in order, repeating the last one, and counts requests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockFetcher {
    pages: std::sync::Mutex<std::collections::VecDeque<Page>>,
    requests: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockFetcher {
    pub fn new(pages: impl IntoIterator<Item = Page>) -> Self {
        Self {
            pages: std::sync::Mutex::new(pages.into_iter().collect()),
            requests: Default::default(),
        }
    }

    /// Serve `body` with HTTP 200 forever
    pub fn ok(body: &str) -> Self {
        Self::new([Page::new(StatusCode::OK, body)])
    }

    /// Number of fetches issued so far
    pub fn requests(&self) -> usize {
        self.requests.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, _url: &str) -> Result<Page, FetchError> {
        self.requests
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut pages = self.pages.lock().unwrap();
        let page = if pages.len() > 1 {
            pages.pop_front().unwrap()
        } else {
            pages.front().cloned().expect("MockFetcher has no pages queued")
        };
        Ok(page)
    }
}
