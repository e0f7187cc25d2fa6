//! Crawl coordinator
//!
//! Drives the whole mirror: pops frontier entries, renders and saves
//! pages, dispatches same-origin resources to the download pool, defers
//! cross-origin resources, and alternates active crawl phases with pause
//! windows during which the deferred batch is flushed through the proxied
//! transport and a checkpoint is written.
//!
//! Per-URL failures are logged and skipped; the coordinator itself only
//! returns an error for startup-fatal conditions such as an unreadable
//! checkpoint file or no working proxy.

use crate::config::{Config, DeferredFetcher};
use crate::crawler::downloader::{CurlFetcher, Downloader, FetchStrategy, HttpFetcher};
use crate::crawler::extractor::{extract, Origin};
use crate::crawler::gate::CaptchaGate;
use crate::crawler::monitor::spawn_stdin_monitor;
use crate::crawler::scheduler::SharedState;
use crate::paths::PathMapper;
use crate::proxy::{load_credentials, select_working, Transport};
use crate::render::{HttpRenderer, Renderer};
use crate::state::StateStore;
use crate::url::{normalize_url, url_key};
use crate::Result;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use url::Url;

/// Why an active phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    /// No pending pages remain
    FrontierExhausted,
    /// The run period elapsed with pages still pending
    BudgetElapsed,
    /// The operator requested a stop
    Cancelled,
}

pub struct Coordinator {
    config: Arc<Config>,
    state: SharedState,
    mapper: PathMapper,
    store: StateStore,
    renderer: Box<dyn Renderer>,
    downloader: Downloader,
    gate: CaptchaGate,
    cancel: Arc<AtomicBool>,
    confirmations: mpsc::UnboundedReceiver<String>,
    pages_rendered: u64,
    resources_failed: u64,
}

impl Coordinator {
    /// Builds a coordinator, restoring checkpointed state unless `fresh`
    ///
    /// # Arguments
    /// * `config` - validated configuration
    /// * `fresh` - discard any existing checkpoint and start from the seed
    /// * `renderer` - the rendering session pages are fetched through
    /// * `cancel` - cooperative stop flag, checked between crawl steps
    /// * `confirmations` - operator input lines for the CAPTCHA gate
    pub fn new(
        config: Arc<Config>,
        fresh: bool,
        renderer: Box<dyn Renderer>,
        cancel: Arc<AtomicBool>,
        confirmations: mpsc::UnboundedReceiver<String>,
    ) -> Result<Self> {
        let site = normalize_url(&config.site.seed_url)?;
        let store = StateStore::new(&config.state.crawl_path, &config.state.deferred_path);

        if fresh {
            store.clear()?;
        }

        let state = match store.restore()? {
            Some((checkpoint, deferred)) => {
                tracing::info!(
                    "Resuming from checkpoint: {} visited, {} pending, {} deferred",
                    checkpoint.visited.len(),
                    checkpoint.frontier.len(),
                    deferred.len()
                );
                SharedState::from_checkpoint(checkpoint, deferred)
            }
            None => {
                tracing::info!("Starting fresh crawl of {}", site);
                SharedState::seeded(url_key(&site))
            }
        };

        let mapper = PathMapper::new(&config.site.save_root);
        let downloader = Downloader::new(config.crawler.max_concurrent_downloads, mapper.clone());
        let gate = CaptchaGate::new(&config.captcha);

        Ok(Self {
            config,
            state,
            mapper,
            store,
            renderer,
            downloader,
            gate,
            cancel,
            confirmations,
            pages_rendered: 0,
            resources_failed: 0,
        })
    }

    /// Runs the crawl to completion, cancellation, or fatal error
    pub async fn run(&mut self) -> Result<()> {
        let transport = self.resolve_transport().await?;

        // Same-origin resources always travel the direct route; the
        // deferred batch uses the resolved transport.
        let direct: Arc<dyn FetchStrategy> = Arc::new(HttpFetcher::new(&Transport::identity())?);
        let deferred: Arc<dyn FetchStrategy> = match self.config.crawler.deferred_fetcher {
            DeferredFetcher::Http => Arc::new(HttpFetcher::new(&transport)?),
            DeferredFetcher::Curl => Arc::new(CurlFetcher::new(
                self.config.crawler.curl_program.clone(),
                &transport,
            )),
        };

        self.run_with_strategies(direct, deferred).await
    }

    async fn run_with_strategies(
        &mut self,
        direct: Arc<dyn FetchStrategy>,
        deferred: Arc<dyn FetchStrategy>,
    ) -> Result<()> {
        loop {
            let outcome = self.run_phase(&direct).await?;

            match outcome {
                RunOutcome::Cancelled => {
                    // Stop means stop: snapshot immediately, no network
                    // work between the trigger and the exit.
                    self.checkpoint()?;
                    tracing::info!("Crawl stopped on request, checkpoint written");
                    return Ok(());
                }
                RunOutcome::FrontierExhausted => {
                    self.flush_deferred(&deferred).await;
                    self.checkpoint()?;
                    break;
                }
                RunOutcome::BudgetElapsed => {
                    tracing::info!(
                        "Run period elapsed, pausing for {}s ({} pages pending)",
                        self.config.crawler.pause_period_secs,
                        self.state.frontier_len()
                    );
                    // The pause lets the rate-limited site cool off before
                    // the proxied batch goes out.
                    self.pause().await;
                    if self.cancel.load(Ordering::SeqCst) {
                        self.checkpoint()?;
                        tracing::info!("Crawl stopped on request, checkpoint written");
                        return Ok(());
                    }
                    self.flush_deferred(&deferred).await;
                    self.checkpoint()?;
                }
            }
        }

        tracing::info!(
            "Crawl complete: {} pages rendered, {} files saved, {} resource failures, {} deferred unresolved",
            self.pages_rendered,
            self.state.saved_len(),
            self.resources_failed,
            self.state.deferred_len()
        );
        Ok(())
    }

    /// One active phase: processes pages until the frontier empties, the
    /// run period elapses, or the stop flag is set
    ///
    /// At least one page is processed per phase regardless of the budget,
    /// so a short run period still makes forward progress.
    async fn run_phase(&mut self, strategy: &Arc<dyn FetchStrategy>) -> Result<RunOutcome> {
        let started = Instant::now();
        let budget = Duration::from_secs(self.config.crawler.run_period_secs);
        let checkpoint_every = self.config.crawler.checkpoint_every;
        let mut pages_this_phase = 0u32;

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(RunOutcome::Cancelled);
            }
            if pages_this_phase > 0 && started.elapsed() >= budget {
                return Ok(RunOutcome::BudgetElapsed);
            }

            let key = match self.state.pop_next() {
                Some(key) => key,
                None => return Ok(RunOutcome::FrontierExhausted),
            };

            if let Err(e) = self.process_page(&key, strategy).await {
                tracing::warn!("Error processing {}: {}", key, e);
            }

            pages_this_phase += 1;
            if checkpoint_every > 0 && pages_this_phase % checkpoint_every == 0 {
                self.checkpoint()?;
            }

            let delay = self.config.crawler.page_delay_ms;
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
    }

    /// Renders one page, saves it, and dispatches its resources and links
    async fn process_page(&mut self, key: &str, strategy: &Arc<dyn FetchStrategy>) -> Result<()> {
        let url = Url::parse(key)?;

        let mut html = self.renderer.render(&url).await?;
        self.pages_rendered += 1;

        while self.gate.detect(&html) {
            if !self.gate.wait_for_clear(&mut self.confirmations).await {
                // Operator input is gone; treat it as a stop request.
                self.cancel.store(true, Ordering::SeqCst);
                return Ok(());
            }
            html = self.renderer.render(&url).await?;
            self.pages_rendered += 1;
        }

        let first_page = !self.state.first_page_saved();
        let mapped = self.mapper.map_page_url(&url, first_page);
        // Resolve the on-disk location before rewriting, so relative
        // references point at where the page actually lands.
        let page_path = self.mapper.prepare(&mapped)?;
        let page = extract(&html, &url, &page_path, &self.mapper);

        if !self.state.is_saved(&page_path) {
            std::fs::write(&page_path, &page.html)?;
            self.state.mark_saved(page_path.clone());
            tracing::info!("Saved page: {} -> {}", url, page_path.display());
        }
        self.state.set_first_page_saved();

        let mut batch = Vec::new();
        for entry in page.resources {
            match entry.origin {
                Origin::SameOrigin => {
                    if self.config.crawler.save_same_origin {
                        batch.push((entry.url, entry.local_path));
                    }
                }
                Origin::CrossOrigin => {
                    self.state.defer(url_key(&entry.url), entry.local_path);
                }
            }
        }

        if !batch.is_empty() {
            let outcomes = self
                .downloader
                .fetch_all(batch, strategy.clone(), &self.state)
                .await;
            self.resources_failed += outcomes.iter().filter(|o| o.is_failed()).count() as u64;
        }

        for link in page.links {
            if self.state.push_discovered(url_key(&link)) {
                tracing::debug!("Queued: {}", link);
            }
        }

        Ok(())
    }

    /// Attempts every deferred entry once and drops the ones that landed
    ///
    /// Entries that fail stay in the deferred map for the next flush (or
    /// the next resumed run).
    async fn flush_deferred(&mut self, strategy: &Arc<dyn FetchStrategy>) {
        let batch = self.state.deferred_batch();
        if batch.is_empty() {
            return;
        }
        tracing::info!("Flushing {} deferred downloads", batch.len());

        let mut resolved = Vec::new();
        let mut entries = Vec::new();
        for (key, path) in batch {
            match Url::parse(&key) {
                Ok(url) => entries.push((url, path)),
                Err(e) => {
                    // Cannot ever succeed, drop it rather than retry forever.
                    tracing::warn!("Dropping malformed deferred entry {}: {}", key, e);
                    resolved.push(key);
                }
            }
        }

        let outcomes = self
            .downloader
            .fetch_all(entries, strategy.clone(), &self.state)
            .await;
        for outcome in &outcomes {
            if outcome.is_failed() {
                self.resources_failed += 1;
            } else {
                resolved.push(outcome.url().to_string());
            }
        }

        self.state.clear_deferred(&resolved);
    }

    /// Writes the current crawl state and deferred map to disk
    fn checkpoint(&self) -> Result<()> {
        let (checkpoint, deferred) = self.state.snapshot();
        self.store.persist(&checkpoint, &deferred)?;
        Ok(())
    }

    async fn resolve_transport(&self) -> Result<Transport> {
        if !self.config.proxy.enabled {
            return Ok(Transport::identity());
        }
        let credentials = load_credentials(Path::new(&self.config.proxy.credentials_path))?;
        select_working(&credentials, &self.config.proxy.probe_url).await
    }

    /// Sleeps out the pause period in one-second slices so a stop request
    /// does not wait for the full window
    async fn pause(&self) {
        let total = Duration::from_secs(self.config.crawler.pause_period_secs);
        let started = Instant::now();
        while started.elapsed() < total {
            if self.cancel.load(Ordering::SeqCst) {
                return;
            }
            let remaining = total - started.elapsed();
            tokio::time::sleep(remaining.min(Duration::from_secs(1))).await;
        }
    }
}

/// Crawl entry point: wires up operator input, the renderer, and the
/// coordinator, then runs to completion
pub async fn run_crawl(config: Config, fresh: bool) -> Result<()> {
    let handles = spawn_stdin_monitor();
    let renderer = HttpRenderer::new()?;

    let mut coordinator = Coordinator::new(
        Arc::new(config),
        fresh,
        Box::new(renderer),
        handles.cancel,
        handles.confirmations,
    )?;
    coordinator.run().await
}
