//! Interactive CAPTCHA gate
//!
//! When a rendered page carries the configured marker, the crawl holds on
//! that page and waits for the operator to clear the challenge in a real
//! browser session, then re-renders the same URL. Detection is plain
//! substring matching against the rendered DOM; marker matching is
//! case-insensitive.

use crate::config::CaptchaConfig;
use crate::crawler::extractor::contains_captcha_marker;
use tokio::sync::mpsc;

pub struct CaptchaGate {
    enabled: bool,
    marker: String,
}

impl CaptchaGate {
    pub fn new(config: &CaptchaConfig) -> Self {
        Self {
            enabled: config.enabled,
            marker: config.marker.to_lowercase(),
        }
    }

    /// Returns true when the gate is enabled and the DOM carries the marker
    pub fn detect(&self, dom: &str) -> bool {
        self.enabled && contains_captcha_marker(&dom.to_lowercase(), &self.marker)
    }

    /// Blocks until the operator confirms the challenge is dealt with
    ///
    /// Consumes one line from the operator input channel. Returns false if
    /// the channel closed before a confirmation arrived, which means input
    /// is gone and the crawl should shut down rather than spin.
    pub async fn wait_for_clear(
        &self,
        confirmations: &mut mpsc::UnboundedReceiver<String>,
    ) -> bool {
        tracing::warn!("CAPTCHA detected. Solve it in the browser, then press Enter here.");
        match confirmations.recv().await {
            Some(_) => {
                tracing::info!("Operator confirmed, re-rendering page");
                true
            }
            None => {
                tracing::warn!("Operator input closed before CAPTCHA confirmation");
                false
            }
        }
    }
}
