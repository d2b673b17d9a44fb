use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::blocking::Client;

use crate::core::config::NetworkConfig;
use crate::{Result, TileError};

/// Shared blocking HTTP client. Building the client once avoids the cost of
/// TLS and connection pool setup for every tile.
pub(crate) static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent("tilekeep/0.1")
        .build()
        .expect("failed to build reqwest blocking client")
});

/// Anything that can resolve a tile URL to encoded image bytes. The network
/// stage goes through this seam, so tests can supply a synchronous fake.
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Production fetcher: HTTP GET with the tile server's required referer
/// header and a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    referer: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            referer: config.referer.clone(),
            timeout: config.timeout,
        }
    }
}

impl TileFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("GET {}", url);
        let response = HTTP_CLIENT
            .get(url)
            .header("referer", &self.referer)
            .timeout(self.timeout)
            .send()?;

        if !response.status().is_success() {
            return Err(TileError::Status(response.status()));
        }

        Ok(response.bytes()?.to_vec())
    }
}
