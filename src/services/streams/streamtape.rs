//! Streamtape: the direct media URL is present in the embed page markup.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, warn};

use super::HostResolver;
use crate::services::http::HttpFetcher;

lazy_static! {
    /// Extraction patterns in priority order
    static ref PATTERNS: Vec<Regex> = vec![
        Regex::new(
            r#"(?i)document\.getElementById\(['"]robotlink['"]\)\.innerHTML\s*=\s*['"]([^'"]+)['"]"#
        )
        .unwrap(),
        Regex::new(r#"(?i)(https?://(?:www\.)?streamtape\.com/get_video\?[^"'&<\s]+)"#).unwrap(),
        Regex::new(r#"(?i)(https?://[^"'<\s]+\.mp4[^"'<\s]*)"#).unwrap(),
    ];
}

/// First media URL found in a Streamtape page, normalised to `https:`
pub fn extract_video_url(html: &str) -> Option<String> {
    PATTERNS.iter().find_map(|re| {
        let raw = re.captures(html)?.get(1)?.as_str().trim();
        if raw.is_empty() {
            return None;
        }
        Some(normalize(raw))
    })
}

fn normalize(raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{}", raw.trim_start_matches('/'))
    }
}

pub struct StreamtapeResolver {
    http: HttpFetcher,
    timeout: Duration,
}

impl StreamtapeResolver {
    pub fn new(http: HttpFetcher, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

#[async_trait]
impl HostResolver for StreamtapeResolver {
    fn name(&self) -> &str {
        "STREAMTAPE"
    }

    fn can_handle(&self, url: &str) -> bool {
        url.contains("streamtape.com")
    }

    async fn resolve(&self, link: &str, referer: &str) -> Option<String> {
        let html = match self.http.get_text(link, Some(referer), self.timeout).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Streamtape fetch failed: {}", e);
                return None;
            }
        };

        let found = extract_video_url(&html);
        if found.is_none() {
            debug!("No Streamtape video pattern matched for {}", link);
        }
        found
    }
}
