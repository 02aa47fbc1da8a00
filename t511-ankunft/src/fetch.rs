//! Fetching sources over HTTP.

use reqwest::blocking::Client;
use std::time::Duration;
use log::*;

use crate::buffer::ResponseBuffer;
use crate::errors::{FetchError, DependencyError};

/// Something that can GET a URL into a bounded buffer.
pub trait Fetcher: Send + Sync + 'static {
    /// Fetches `url` into `buf`. On error, `buf` holds nothing usable.
    fn fetch(&self, url: &str, buf: &mut ResponseBuffer) -> Result<(), FetchError>;
}

/// Says whether the network is up. Refresh cycles are skipped while it isn't.
pub trait NetworkGate: Send + Sync + 'static {
    fn is_ready(&self) -> bool;
}

/// Gate for hosts whose network is always up.
pub struct AlwaysReady;

impl NetworkGate for AlwaysReady {
    fn is_ready(&self) -> bool {
        true
    }
}

/// `Fetcher` backed by a blocking `reqwest` client.
pub struct HttpFetcher {
    cli: Client,
}

impl HttpFetcher {
    /// Builds the client. Every request is abandoned after `timeout`.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, DependencyError> {
        let cli = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(DependencyError::HttpClient)?;
        Ok(Self { cli })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, buf: &mut ResponseBuffer) -> Result<(), FetchError> {
        buf.clear();
        let resp = self.cli.get(url).send()?;
        let st = resp.status();
        debug!("Response code {} ({} bytes announced)", st.as_u16(),
               resp.content_length().map(|l| l.to_string()).unwrap_or_else(|| "?".into()));
        if !st.is_success() {
            Err(FetchError::StatusCode(st.as_u16()))?
        }
        if let Some(len) = resp.content_length() {
            // Not worth downloading something we'd throw away.
            if len > buf.limit() as u64 {
                Err(FetchError::Oversize { limit: buf.limit() })?
            }
        }
        buf.fill_from(resp)?;
        Ok(())
    }
}
