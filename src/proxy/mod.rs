//! Proxy validation and transport selection
//!
//! The deferred (cross-origin) flush runs through a proxy. Candidates come
//! from a credentials file, one `host:port:user:pass` per line; each is
//! validated once with a probe request to an IP-echo endpoint, and the
//! first that answers 2xx wins. No retry, no backoff: a candidate that
//! fails its probe is discarded.

use crate::{ConfigError, KagamiError, Result};
use std::path::Path;
use std::time::Duration;

/// Proxy access credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCredential {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl ProxyCredential {
    /// Parses a `host:port:user:pass` line
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let parts: Vec<&str> = line.trim().splitn(4, ':').collect();
        if parts.len() != 4 {
            return Err(format!("expected host:port:user:pass, got {:?}", line));
        }

        let port: u16 = parts[1]
            .parse()
            .map_err(|_| format!("invalid port in {:?}", line))?;

        Ok(Self {
            host: parts[0].to_string(),
            port,
            user: parts[2].to_string(),
            password: parts[3].to_string(),
        })
    }

    /// The proxy endpoint URL
    pub fn proxy_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Transport configuration shared read-only by all download workers
///
/// Identity (no proxy) or a validated proxy endpoint with basic auth.
#[derive(Debug, Clone, Default)]
pub struct Transport {
    proxy: Option<ProxyCredential>,
}

impl Transport {
    /// Direct transport with no proxy
    pub fn identity() -> Self {
        Self { proxy: None }
    }

    /// Transport routed through the given proxy
    pub fn proxied(credential: ProxyCredential) -> Self {
        Self {
            proxy: Some(credential),
        }
    }

    pub fn is_proxied(&self) -> bool {
        self.proxy.is_some()
    }

    /// Builds an HTTP client bound to this transport
    pub fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(15))
            .gzip(true)
            .brotli(true);

        if let Some(credential) = &self.proxy {
            let proxy = reqwest::Proxy::all(credential.proxy_url())?
                .basic_auth(&credential.user, &credential.password);
            builder = builder.proxy(proxy);
        }

        builder.build()
    }

    /// Arguments binding an external curl invocation to this transport
    pub fn curl_args(&self) -> Vec<String> {
        match &self.proxy {
            Some(credential) => vec![
                "--proxy".to_string(),
                credential.proxy_url(),
                "--proxy-user".to_string(),
                format!("{}:{}", credential.user, credential.password),
            ],
            None => Vec::new(),
        }
    }
}

/// Loads proxy credentials from a file
///
/// Blank lines and `#` comments are skipped. A malformed line is a
/// configuration error: bad credentials found at startup abort the run
/// before any crawling begins.
pub fn load_credentials(path: &Path) -> std::result::Result<Vec<ProxyCredential>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut credentials = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let credential = ProxyCredential::parse(line).map_err(ConfigError::Validation)?;
        credentials.push(credential);
    }

    Ok(credentials)
}

/// Validates one candidate with a probe request
///
/// Success requires a 2xx answer from the probe endpoint through the
/// candidate proxy. Timeouts, auth rejections, and non-2xx statuses all
/// discard the candidate.
pub async fn validate(
    credential: &ProxyCredential,
    probe_url: &str,
) -> std::result::Result<Transport, String> {
    let transport = Transport::proxied(credential.clone());
    let client = transport.build_client().map_err(|e| e.to_string())?;

    let response = client
        .get(probe_url)
        .send()
        .await
        .map_err(|e| format!("probe failed: {}", e))?;

    if response.status().is_success() {
        Ok(transport)
    } else {
        Err(format!("probe answered HTTP {}", response.status().as_u16()))
    }
}

/// Tries candidates in order and returns the first validated transport
pub async fn select_working(
    candidates: &[ProxyCredential],
    probe_url: &str,
) -> Result<Transport> {
    for credential in candidates {
        match validate(credential, probe_url).await {
            Ok(transport) => {
                tracing::info!(
                    "Using proxy {}:{} (probe succeeded)",
                    credential.host,
                    credential.port
                );
                return Ok(transport);
            }
            Err(reason) => {
                tracing::warn!(
                    "Discarding proxy {}:{}: {}",
                    credential.host,
                    credential.port,
                    reason
                );
            }
        }
    }

    Err(KagamiError::NoWorkingProxy {
        tried: candidates.len(),
    })
}
