//! Best-effort URL normalisation against a base page.

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    static ref SIZE_BEFORE_EXT: Regex = Regex::new(r"(?i)-\d+x\d+(\.[a-z]{2,4})$").unwrap();
    static ref SIZE_BEFORE_QUERY: Regex = Regex::new(r"(?i)-\d+x\d+(\?)").unwrap();
}

/// Resolve a possibly relative or protocol-less URL against `base`.
///
/// Returns `None` for empty input. When joining fails the input is returned
/// unchanged.
pub fn resolve(maybe_relative: &str, base: &str) -> Option<String> {
    if maybe_relative.is_empty() {
        return None;
    }
    if maybe_relative.starts_with("http://") || maybe_relative.starts_with("https://") {
        return Some(maybe_relative.to_string());
    }
    if maybe_relative.starts_with("//") {
        return Some(format!("https:{}", maybe_relative));
    }

    match Url::parse(base).and_then(|b| b.join(maybe_relative)) {
        Ok(joined) => Some(joined.to_string()),
        Err(_) => Some(maybe_relative.to_string()),
    }
}

/// True for an absolute `http`/`https` URL
pub fn is_web_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// `resolve`, keeping only results that are absolute `http`/`https` URLs.
/// `javascript:`, `mailto:` and `data:` links resolve to `None`.
pub fn resolve_web_link(maybe_relative: &str, base: &str) -> Option<String> {
    resolve(maybe_relative, base).filter(|url| is_web_url(url))
}

/// Strip a `-<w>x<h>` thumbnail suffix so the full-size asset is requested
pub fn prefer_largest_variant(url: &str) -> String {
    let stripped = SIZE_BEFORE_EXT.replacen(url, 1, "$1");
    SIZE_BEFORE_QUERY.replacen(&stripped, 1, "$1").into_owned()
}
