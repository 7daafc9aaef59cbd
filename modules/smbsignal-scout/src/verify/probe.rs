// URL liveness probe.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use smbsignal_common::UrlCheck;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait UrlProber: Send + Sync {
    /// Never fails: unreachable resources classify as `Timeout`.
    async fn probe(&self, url: &str) -> UrlCheck;
}

/// Map a probe response status. Access-restricted responses mean the
/// resource exists; unknown statuses are given the benefit of the doubt.
pub fn classify_status(status: u16) -> UrlCheck {
    match status {
        200 => UrlCheck::Live,
        301 | 302 | 303 | 307 | 308 => UrlCheck::Redirect,
        401 | 403 => UrlCheck::Live,
        404 | 410 => UrlCheck::Dead,
        _ => UrlCheck::Live,
    }
}

/// HEAD request without following redirects.
pub struct HttpUrlProber {
    client: reqwest::Client,
}

impl HttpUrlProber {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .context("Failed to build probe client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UrlProber for HttpUrlProber {
    async fn probe(&self, url: &str) -> UrlCheck {
        match self.client.head(url).send().await {
            Ok(resp) => classify_status(resp.status().as_u16()),
            Err(e) => {
                debug!(url, error = %e, "URL probe failed");
                UrlCheck::Timeout
            }
        }
    }
}
