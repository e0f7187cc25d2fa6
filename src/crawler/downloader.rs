//! Bounded-concurrency resource downloads
//!
//! The orchestrator fetches one batch of resources through a bounded worker
//! pool and reports a per-entry outcome. A single entry's failure never
//! aborts its siblings or the caller: the mirror may end up with missing
//! resources, recorded in the returned outcomes and the log.
//!
//! The fetch mechanism is a strategy seam. The run phase uses the direct
//! HTTP client; the deferred (proxied) phase can swap in an external
//! download utility without the orchestrator noticing.

use crate::crawler::scheduler::SharedState;
use crate::paths::PathMapper;
use crate::proxy::Transport;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// How one resource body is obtained
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    async fn fetch(&self, url: &Url) -> std::result::Result<Vec<u8>, String>;
}

/// In-process HTTP client bound to a transport
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(transport: &Transport) -> reqwest::Result<Self> {
        Ok(Self {
            client: transport.build_client()?,
        })
    }
}

#[async_trait]
impl FetchStrategy for HttpFetcher {
    async fn fetch(&self, url: &Url) -> std::result::Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(body.to_vec())
    }
}

/// External-process fetch via a curl-style utility
///
/// The proxy binding travels as command-line arguments, so the deferred
/// phase can run through a program whose network stack is independent of
/// the in-process client.
pub struct CurlFetcher {
    program: String,
    transport_args: Vec<String>,
}

impl CurlFetcher {
    pub fn new(program: impl Into<String>, transport: &Transport) -> Self {
        Self {
            program: program.into(),
            transport_args: transport.curl_args(),
        }
    }
}

#[async_trait]
impl FetchStrategy for CurlFetcher {
    async fn fetch(&self, url: &Url) -> std::result::Result<Vec<u8>, String> {
        let output = tokio::process::Command::new(&self.program)
            .arg("-sS")
            .arg("--fail")
            .arg("--location")
            .args(&self.transport_args)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("failed to spawn {}: {}", self.program, e))?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }
}

/// Outcome of one entry in a batch
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Body written and the path recorded in the saved set
    Saved { url: String, path: PathBuf },
    /// Target path was already written this run
    Skipped { url: String, path: PathBuf },
    /// Network, HTTP, or filesystem failure; siblings unaffected
    Failed { url: String, reason: String },
}

impl FetchOutcome {
    pub fn url(&self) -> &str {
        match self {
            Self::Saved { url, .. } | Self::Skipped { url, .. } | Self::Failed { url, .. } => url,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Bounded worker pool fetching one batch at a time
///
/// `fetch_all` blocks the calling crawl step until every entry in the batch
/// completed or failed; download order within a batch is unspecified.
#[derive(Clone)]
pub struct Downloader {
    width: usize,
    mapper: PathMapper,
}

impl Downloader {
    pub fn new(width: usize, mapper: PathMapper) -> Self {
        Self { width, mapper }
    }

    /// Fetches a batch of `(source URL, target path)` entries concurrently
    pub async fn fetch_all(
        &self,
        entries: Vec<(Url, PathBuf)>,
        strategy: Arc<dyn FetchStrategy>,
        state: &SharedState,
    ) -> Vec<FetchOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.width));
        let mut join_set = JoinSet::new();

        for (url, path) in entries {
            let semaphore = semaphore.clone();
            let strategy = strategy.clone();
            let state = state.clone();
            let mapper = self.mapper.clone();

            join_set.spawn(async move {
                // Closed only if the semaphore is dropped, which it is not.
                let _permit = semaphore.acquire_owned().await.expect("pool semaphore closed");
                fetch_one(&url, path, strategy.as_ref(), &state, &mapper).await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("Download worker panicked: {}", e),
            }
        }
        outcomes
    }
}

async fn fetch_one(
    url: &Url,
    path: PathBuf,
    strategy: &dyn FetchStrategy,
    state: &SharedState,
    mapper: &PathMapper,
) -> FetchOutcome {
    // Reserve the path before fetching: two batch entries can map to the
    // same target, and the claim decides which one writes it.
    if !state.mark_saved(path.clone()) {
        tracing::debug!("Already saved: {} -> {}", url, path.display());
        return FetchOutcome::Skipped {
            url: url.to_string(),
            path,
        };
    }

    let body = match strategy.fetch(url).await {
        Ok(body) => body,
        Err(reason) => {
            tracing::warn!("Error downloading {}: {}", url, reason);
            state.release_saved(&path);
            return FetchOutcome::Failed {
                url: url.to_string(),
                reason,
            };
        }
    };

    let target = match mapper.prepare(&path) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!("Error preparing {}: {}", path.display(), e);
            state.release_saved(&path);
            return FetchOutcome::Failed {
                url: url.to_string(),
                reason: e.to_string(),
            };
        }
    };

    if let Err(e) = std::fs::write(&target, &body) {
        tracing::warn!("Error writing {}: {}", target.display(), e);
        state.release_saved(&path);
        return FetchOutcome::Failed {
            url: url.to_string(),
            reason: e.to_string(),
        };
    }

    tracing::info!("Downloaded: {} -> {}", url, target.display());
    FetchOutcome::Saved {
        url: url.to_string(),
        path,
    }
}
