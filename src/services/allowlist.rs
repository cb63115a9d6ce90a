//! Egress allowlist: the only gate before the relay fetches a URL or a
//! poster is trusted enough to be proxied.

use url::Url;

use crate::error::{ScrapeError, ScrapeResult};

/// Host substrings approved for egress. Kept separate from the stream
/// dispatch table: a host can be relayable without having a resolver.
pub const ALLOWED_HOSTS: &[&str] = &[
    "animeonline.ninja",
    "mp4upload.com",
    "fembed.com",
    "streamtape.com",
];

/// True when the URL parses and its hostname contains an approved substring
pub fn is_allowed(url: &str) -> bool {
    is_allowed_with(url, ALLOWED_HOSTS)
}

/// Policy check as a result, for callers that report the refusal
pub fn check(url: &str) -> ScrapeResult<()> {
    if is_allowed(url) {
        Ok(())
    } else {
        Err(ScrapeError::PolicyRejected(url.to_string()))
    }
}

pub fn is_allowed_with(url: &str, hosts: &[&str]) -> bool {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return false,
    };
    let host = parsed.host_str().unwrap_or("");
    !host.is_empty() && hosts.iter().any(|allowed| host.contains(allowed))
}
