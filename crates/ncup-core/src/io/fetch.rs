//! Whole-body HTTP downloads.
//!
//! No retries: a failed request is final for the current run.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::debug;

use crate::config::Config;
use crate::error::FetchError;

/// Downloads a URL into memory.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`. With `verify_tls == false` certificate errors are
    /// ignored; callers must then establish integrity by other means.
    async fn fetch(&self, url: &str, verify_tls: bool) -> Result<Bytes, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    secure: Client,
    insecure: Client,
}

impl HttpFetcher {
    pub fn new(connect_timeout: Duration, timeout: Duration) -> reqwest::Result<Self> {
        let builder = || {
            Client::builder()
                .user_agent(crate::USER_AGENT)
                .connect_timeout(connect_timeout)
                .timeout(timeout)
        };

        Ok(Self {
            secure: builder().build()?,
            insecure: builder().danger_accept_invalid_certs(true).build()?,
        })
    }

    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        Self::new(config.connect_timeout(), config.http_timeout())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, verify_tls: bool) -> Result<Bytes, FetchError> {
        let client = if verify_tls {
            &self.secure
        } else {
            &self.insecure
        };
        debug!(url, verify_tls, "fetching");

        let http = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };

        let response = client.get(url).send().await.map_err(http)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.bytes().await.map_err(http)
    }
}
