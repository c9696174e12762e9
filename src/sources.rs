// 🌐 Upstream Sources - exit-node feed and country lookup over HTTP
//
// Both are traits so the ingestion pipeline can run against fakes in tests.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::time::Duration;
use tracing::debug;

use crate::error::TransportError;

/// Default exit-node feed (one address per line)
pub const DEFAULT_FEED_URL: &str = "https://www.dan.me.uk/torlist/?exit";

/// Default country lookup service (`{base}/{ip}/country`)
pub const DEFAULT_LOOKUP_URL: &str = "https://ipinfo.io";

// ============================================================================
// TRAITS
// ============================================================================

/// Produces the raw list of candidate addresses for one ingestion cycle.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Vec<String>, TransportError>;
}

/// Maps an address to a country code. May fail or be unreliable.
#[async_trait]
pub trait CountryLookup: Send + Sync {
    async fn lookup(&self, address: &str) -> Result<String, TransportError>;
}

/// Build the shared HTTP client used by both upstream adapters.
pub fn build_http_client(timeout: Duration) -> Result<HttpClient, reqwest::Error> {
    HttpClient::builder()
        .timeout(timeout)
        .user_agent(concat!("exit-watch/", env!("CARGO_PKG_VERSION")))
        .build()
}

async fn get_text(http: &HttpClient, url: &str) -> Result<String, TransportError> {
    debug!(url = %url, "GET request");

    let response = http
        .get(url)
        .send()
        .await
        .map_err(|source| TransportError::Request {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response.text().await.map_err(|source| TransportError::Request {
        url: url.to_string(),
        source,
    })
}

/// Split a plaintext feed into addresses: one per line, trimmed, blanks dropped.
/// Duplicates are kept; the pipeline checks each occurrence against the store.
pub fn parse_feed(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// HTTP FEED
// ============================================================================

pub struct HttpFeed {
    http: HttpClient,
    url: String,
}

impl HttpFeed {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpFeed {
    async fn fetch(&self) -> Result<Vec<String>, TransportError> {
        let body = get_text(&self.http, &self.url).await?;
        Ok(parse_feed(&body))
    }
}

// ============================================================================
// IPINFO COUNTRY LOOKUP
// ============================================================================

/// Country lookup against an ipinfo-style `/{ip}/country` plaintext endpoint.
pub struct IpInfoLookup {
    http: HttpClient,
    base_url: String,
}

impl IpInfoLookup {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CountryLookup for IpInfoLookup {
    async fn lookup(&self, address: &str) -> Result<String, TransportError> {
        let url = format!("{}/{}/country", self.base_url, address);
        let body = get_text(&self.http, &url).await?;

        // Body ends with a newline ("US\n")
        let country = body.trim();
        if country.is_empty() {
            return Err(TransportError::EmptyBody { url });
        }

        Ok(country.to_string())
    }
}
