//! Catalog scraper
//!
//! Walks a paginated listing (`<listing>`, `<listing>page/2/`, ...) strictly in
//! sequence and emits one [`CatalogEntry`] per distinct detail link.
//!
//! Paging stops when:
//! - a page cannot be fetched (treated as the end of the catalog),
//! - a page contributes no new entries,
//! - the page ceiling is reached.

use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::CatalogTable;
use crate::models::{CatalogEntry, MediaKind};
use crate::services::http::HttpFetcher;
use crate::services::poster::{pick_image, PosterRelay};
use crate::services::{identity, metrics, url_resolver};

/// Item containers across the site's listing templates
pub const ITEM_SELECTORS: &[&str] = &[
    "article.item.tvshows",
    ".animepost",
    "article.post",
    ".items .item",
    ".anime__item",
];

lazy_static! {
    static ref ITEM: Selector = Selector::parse(&ITEM_SELECTORS.join(", ")).unwrap();
    static ref ANCHOR: Selector = Selector::parse("a").unwrap();
    static ref IMG: Selector = Selector::parse("img").unwrap();
    static ref TITLE: Selector = Selector::parse(".title").unwrap();
}

/// Where an item title may come from, in priority order
#[derive(Debug, Clone, Copy)]
enum TitleSource {
    ImageAlt,
    TitleElement,
    AnchorTitle,
    AnchorText,
}

const TITLE_CHAIN: &[TitleSource] = &[
    TitleSource::ImageAlt,
    TitleSource::TitleElement,
    TitleSource::AnchorTitle,
    TitleSource::AnchorText,
];

/// One listing item before deduplication and poster relaying
#[derive(Debug, Clone, PartialEq)]
pub struct ListingItem {
    pub link: String,
    pub title: String,
    pub poster: Option<String>,
}

/// Extract every item of one listing page in document order
pub fn parse_listing(html: &str, base: &str) -> Vec<ListingItem> {
    let document = Html::parse_document(html);
    document
        .select(&ITEM)
        .filter_map(|item| parse_item(item, base))
        .collect()
}

fn parse_item(item: ElementRef<'_>, base: &str) -> Option<ListingItem> {
    let anchor = item.select(&ANCHOR).next()?;
    let href = anchor
        .value()
        .attr("href")
        .filter(|h| !h.is_empty())
        .or_else(|| anchor.value().attr("data-href"))
        .unwrap_or("");
    let link = url_resolver::resolve_web_link(href, base)?;

    let img = item.select(&IMG).next();
    let poster = img.and_then(pick_image);

    let title = TITLE_CHAIN
        .iter()
        .find_map(|source| title_from(*source, item, anchor, img))
        .unwrap_or_else(|| link.clone());

    Some(ListingItem {
        link,
        title,
        poster,
    })
}

fn title_from(
    source: TitleSource,
    item: ElementRef<'_>,
    anchor: ElementRef<'_>,
    img: Option<ElementRef<'_>>,
) -> Option<String> {
    let raw = match source {
        TitleSource::ImageAlt => img?.value().attr("alt")?.to_string(),
        TitleSource::TitleElement => item.select(&TITLE).next()?.text().collect(),
        TitleSource::AnchorTitle => anchor.value().attr("title")?.to_string(),
        TitleSource::AnchorText => anchor.text().collect(),
    };
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// URL of page `n` (1-based) of a listing
pub fn page_url(listing_url: &str, page: u32) -> String {
    if page <= 1 {
        listing_url.to_string()
    } else {
        format!("{}page/{}/", listing_url, page)
    }
}

pub struct CatalogScraper {
    catalogs: CatalogTable,
    http: HttpFetcher,
    posters: PosterRelay,
    timeout: Duration,
    max_pages: u32,
}

impl CatalogScraper {
    pub fn new(
        catalogs: CatalogTable,
        http: HttpFetcher,
        posters: PosterRelay,
        timeout: Duration,
        max_pages: u32,
    ) -> Self {
        Self {
            catalogs,
            http,
            posters,
            timeout,
            max_pages,
        }
    }

    /// Catalogs this scraper serves
    pub fn catalogs(&self) -> &CatalogTable {
        &self.catalogs
    }

    /// Scrape every page of a listing into deduplicated entries
    pub async fn scrape(&self, listing_url: &str) -> Vec<CatalogEntry> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut entries = Vec::new();

        for page in 1..=self.max_pages {
            let url = page_url(listing_url, page);
            info!("Fetching catalog page: {}", url);

            let html = match self.http.get_text(&url, None, self.timeout).await {
                Ok(html) => html,
                Err(e) => {
                    info!("Stop paging at page {}: {}", page, e);
                    metrics::catalog_page("failed");
                    break;
                }
            };
            metrics::catalog_page("fetched");

            let mut added = 0usize;
            for item in parse_listing(&html, listing_url) {
                if !seen.insert(item.link.clone()) {
                    continue;
                }
                entries.push(CatalogEntry {
                    external_id: identity::encode(&item.link),
                    kind: MediaKind::Series,
                    name: item.title,
                    poster: self.posters.proxied(item.poster.as_deref(), listing_url),
                });
                added += 1;
            }

            debug!("Catalog page {} added {} entries", page, added);
            if added == 0 {
                info!("No new items on page {}, stopping", page);
                break;
            }
        }

        entries
    }
}
