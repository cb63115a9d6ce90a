//! Shared upstream HTTP access.
//!
//! One `reqwest::Client` carries the fixed user agent; every call sets its
//! own timeout so a slow host only fails its own unit of work. Relay fetches
//! go through a second client whose redirects never leave the allowlist.

use reqwest::redirect::Policy;
use reqwest::{header, Client, ClientBuilder, Response};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ScrapeError, ScrapeResult};
use crate::services::allowlist;

const MAX_REDIRECTS: usize = 10;

/// Follow a redirect only while the next hop is an allowlisted host.
/// A refused hop stops the chain and hands back the 3xx itself.
fn allowlisted_redirects() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if allowlist::is_allowed(attempt.url().as_str()) {
            attempt.follow()
        } else {
            warn!("Redirect to non-allowlisted host refused: {}", attempt.url());
            attempt.stop()
        }
    })
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    relay_client: Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        Self::with_builder(user_agent, |builder| builder)
    }

    /// Build both clients through `configure` (DNS overrides, proxies)
    pub fn with_builder<F>(user_agent: &str, configure: F) -> Result<Self, reqwest::Error>
    where
        F: Fn(ClientBuilder) -> ClientBuilder,
    {
        let base = || Client::builder().user_agent(user_agent).gzip(true);

        let client = configure(base())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()?;
        let relay_client = configure(base())
            .redirect(allowlisted_redirects())
            .build()?;

        Ok(Self {
            client,
            relay_client,
            user_agent: user_agent.to_string(),
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// GET and return the raw response; non-2xx is a fetch failure
    pub async fn get(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Duration,
    ) -> ScrapeResult<Response> {
        let mut request = self
            .client
            .get(url)
            .header(header::USER_AGENT, &self.user_agent)
            .timeout(timeout);
        if let Some(referer) = referer {
            request = request.header(header::REFERER, referer);
        }

        debug!("GET {}", url);
        let response = request
            .send()
            .await
            .map_err(|e| ScrapeError::fetch(url, e))?;

        response
            .error_for_status()
            .map_err(|e| ScrapeError::fetch(url, e))
    }

    /// GET for the image relay: every redirect hop must pass the allowlist,
    /// and anything but a 2xx (including a refused redirect) is a fetch failure
    pub async fn get_relayed(
        &self,
        url: &str,
        referer: &str,
        timeout: Duration,
    ) -> ScrapeResult<Response> {
        debug!("Relay GET {}", url);
        let response = self
            .relay_client
            .get(url)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::REFERER, referer)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ScrapeError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::fetch(url, format!("upstream answered {}", status)));
        }
        Ok(response)
    }

    /// GET a page body as text
    pub async fn get_text(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Duration,
    ) -> ScrapeResult<String> {
        self.get(url, referer, timeout)
            .await?
            .text()
            .await
            .map_err(|e| ScrapeError::fetch(url, e))
    }

    /// POST an urlencoded form and return the body as text
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> ScrapeResult<String> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .header(header::USER_AGENT, &self.user_agent)
            .form(form)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ScrapeError::fetch(url, e))?
            .error_for_status()
            .map_err(|e| ScrapeError::fetch(url, e))?;

        response
            .text()
            .await
            .map_err(|e| ScrapeError::fetch(url, e))
    }
}
