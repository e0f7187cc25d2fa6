//! Renderer session abstraction
//!
//! The browser-automation driver is an external collaborator: the crawl
//! loop only needs `render(url) -> DOM text`. The shipped implementation
//! fetches over HTTP with a desktop user agent; a webdriver-backed session
//! implements the same trait without touching the rest of the crate.

use crate::{KagamiError, Result};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A session that can turn a URL into rendered DOM text
///
/// A navigation failure is a per-URL recoverable error: the caller logs it
/// and moves on to the next frontier entry.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &Url) -> Result<String>;
}

/// HTTP-backed renderer session
///
/// Follows redirects and decompresses like a browser would, but does not
/// execute JavaScript.
pub struct HttpRenderer {
    client: reqwest::Client,
}

impl HttpRenderer {
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(DESKTOP_USER_AGENT)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| KagamiError::Render {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(KagamiError::Render {
                url: url.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        response.text().await.map_err(|e| KagamiError::Render {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
