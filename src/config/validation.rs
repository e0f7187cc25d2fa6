//! Configuration validation
//!
//! Startup-fatal checks: a crawl never begins with a malformed seed or an
//! unusable proxy setup.

use crate::config::types::Config;
use crate::ConfigError;
use url::Url;

/// Validates a parsed configuration
///
/// # Checks
///
/// - The seed URL parses, uses HTTP(S), and has a host
/// - The save root is non-empty
/// - The download pool width is at least 1
/// - An enabled CAPTCHA gate has a non-empty marker
/// - An enabled proxy has a credentials path and a valid probe URL
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let seed = Url::parse(&config.site.seed_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.site.seed_url, e)))?;

    if seed.scheme() != "http" && seed.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "seed-url must be http or https, got {}",
            seed.scheme()
        )));
    }

    if seed.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "seed-url has no host: {}",
            config.site.seed_url
        )));
    }

    if config.site.save_root.trim().is_empty() {
        return Err(ConfigError::Validation(
            "save-root must not be empty".to_string(),
        ));
    }

    if config.crawler.max_concurrent_downloads == 0 {
        return Err(ConfigError::Validation(
            "max-concurrent-downloads must be at least 1".to_string(),
        ));
    }

    if config.captcha.enabled && config.captcha.marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "captcha marker must not be empty when detection is enabled".to_string(),
        ));
    }

    if config.proxy.enabled {
        if config.proxy.credentials_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "proxy credentials-path must not be empty when proxying is enabled".to_string(),
            ));
        }

        Url::parse(&config.proxy.probe_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("probe-url: {}", e)))?;
    }

    Ok(())
}
