use serde::Deserialize;

/// Main configuration structure for Kagami
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub state: StateConfig,
}

/// Target site configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Seed URL the crawl starts from
    #[serde(rename = "seed-url")]
    pub seed_url: String,

    /// Directory the mirrored site is written under
    #[serde(rename = "save-root")]
    pub save_root: String,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of concurrent resource downloads
    #[serde(rename = "max-concurrent-downloads", default = "default_max_downloads")]
    pub max_concurrent_downloads: usize,

    /// Running period before pausing for the deferred-resource flush (seconds)
    #[serde(rename = "run-period-secs", default = "default_run_period")]
    pub run_period_secs: u64,

    /// Pause period before the deferred-resource flush (seconds)
    #[serde(rename = "pause-period-secs", default = "default_pause_period")]
    pub pause_period_secs: u64,

    /// Optional delay between page visits (milliseconds)
    #[serde(rename = "page-delay-ms", default = "default_page_delay")]
    pub page_delay_ms: u64,

    /// Whether same-origin resources are downloaded during the run phase
    #[serde(rename = "save-same-origin", default = "default_true")]
    pub save_same_origin: bool,

    /// Pages processed between periodic checkpoints
    #[serde(rename = "checkpoint-every", default = "default_checkpoint_every")]
    pub checkpoint_every: u32,

    /// Fetch strategy for the deferred (proxied) phase
    #[serde(rename = "deferred-fetcher", default)]
    pub deferred_fetcher: DeferredFetcher,

    /// Program used by the external-process fetch strategy
    #[serde(rename = "curl-program", default = "default_curl_program")]
    pub curl_program: String,
}

/// Fetch strategy selection for the deferred phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeferredFetcher {
    /// In-process HTTP client bound to the proxy transport
    #[default]
    Http,
    /// External download utility (curl) invoked per resource
    Curl,
}

/// CAPTCHA gate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// Whether challenge detection is active
    #[serde(default)]
    pub enabled: bool,

    /// Marker substring that identifies a challenge page
    #[serde(default = "default_captcha_marker")]
    pub marker: String,
}

/// Proxy configuration for the deferred phase
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Whether the deferred flush goes through a proxy
    #[serde(default)]
    pub enabled: bool,

    /// Path to the credentials file, one `host:port:user:pass` per line
    #[serde(rename = "credentials-path", default = "default_credentials_path")]
    pub credentials_path: String,

    /// IP-echo endpoint used to validate a candidate proxy
    #[serde(rename = "probe-url", default = "default_probe_url")]
    pub probe_url: String,
}

/// Renderer session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RendererConfig {
    /// Whether a browser-backed renderer session runs headless
    #[serde(default = "default_true")]
    pub headless: bool,
}

/// Checkpoint file locations
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// Snapshot of visited set, frontier, and first-page flag
    #[serde(rename = "crawl-path", default = "default_crawl_path")]
    pub crawl_path: String,

    /// Snapshot of the deferred-resource map
    #[serde(rename = "deferred-path", default = "default_deferred_path")]
    pub deferred_path: String,
}

fn default_max_downloads() -> usize {
    10
}

fn default_run_period() -> u64 {
    300
}

fn default_pause_period() -> u64 {
    300
}

fn default_page_delay() -> u64 {
    100
}

fn default_checkpoint_every() -> u32 {
    25
}

fn default_true() -> bool {
    true
}

fn default_curl_program() -> String {
    "curl".to_string()
}

fn default_captcha_marker() -> String {
    "captcha".to_string()
}

fn default_credentials_path() -> String {
    "./proxies.txt".to_string()
}

fn default_probe_url() -> String {
    "https://api.ipify.org".to_string()
}

fn default_crawl_path() -> String {
    "./kagami-state.json".to_string()
}

fn default_deferred_path() -> String {
    "./kagami-deferred.json".to_string()
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_downloads(),
            run_period_secs: default_run_period(),
            pause_period_secs: default_pause_period(),
            page_delay_ms: default_page_delay(),
            save_same_origin: true,
            checkpoint_every: default_checkpoint_every(),
            deferred_fetcher: DeferredFetcher::Http,
            curl_program: default_curl_program(),
        }
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            marker: default_captcha_marker(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            credentials_path: default_credentials_path(),
            probe_url: default_probe_url(),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self { headless: true }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            crawl_path: default_crawl_path(),
            deferred_path: default_deferred_path(),
        }
    }
}
