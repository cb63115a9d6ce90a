//! Poster discovery and relay addressing.

use scraper::ElementRef;

use crate::config::PLACEHOLDER_POSTER;
use crate::services::{allowlist, identity, url_resolver};

/// Image attributes in priority order: lazy-load attributes before `src`
pub const IMAGE_ATTRS: &[&str] = &["data-src", "data-lazy-src", "data-original", "src", "srcset"];

/// First non-empty image source on an `<img>` element
pub fn pick_image(img: ElementRef<'_>) -> Option<String> {
    IMAGE_ATTRS.iter().find_map(|attr| {
        let value = img.value().attr(attr)?.trim();
        if value.is_empty() {
            return None;
        }
        if *attr == "srcset" {
            return srcset_largest(value);
        }
        Some(value.to_string())
    })
}

/// Last candidate of a `srcset` list, without its width descriptor
fn srcset_largest(srcset: &str) -> Option<String> {
    srcset
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .last()
        .and_then(|part| part.split_whitespace().next())
        .map(String::from)
}

/// Builds relay addresses for posters that pass the allowlist
#[derive(Debug, Clone)]
pub struct PosterRelay {
    relay_base: String,
}

impl PosterRelay {
    /// `relay_base` is the absolute relay root ending in `/img/`
    pub fn new(relay_base: impl Into<String>) -> Self {
        Self {
            relay_base: relay_base.into(),
        }
    }

    /// Relay address for `target`, without any policy check
    pub fn address(&self, target: &str) -> String {
        format!("{}{}", self.relay_base, identity::encode_relay_payload(target))
    }

    /// Resolve, upsize and proxy a raw poster value; anything that cannot be
    /// relayed becomes the placeholder.
    pub fn proxied(&self, raw: Option<&str>, base: &str) -> String {
        let resolved = match raw.and_then(|r| url_resolver::resolve(r, base)) {
            Some(url) if url.starts_with("http") => url,
            _ => return PLACEHOLDER_POSTER.to_string(),
        };

        let normal = url_resolver::prefer_largest_variant(&resolved);
        if !allowlist::is_allowed(&normal) {
            return PLACEHOLDER_POSTER.to_string();
        }
        self.address(&normal)
    }
}
