//! Crawl engine: scheduling, extraction, downloads, and coordination

mod coordinator;
mod downloader;
mod extractor;
mod gate;
mod monitor;
mod scheduler;

pub use coordinator::{run_crawl, Coordinator};
pub use downloader::{CurlFetcher, Downloader, FetchOutcome, FetchStrategy, HttpFetcher};
pub use extractor::{contains_captcha_marker, extract, ExtractedPage, Origin, ResourceEntry};
pub use gate::CaptchaGate;
pub use monitor::{spawn_stdin_monitor, MonitorHandles};
pub use scheduler::SharedState;
