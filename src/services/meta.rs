//! Series detail extraction: title, poster, synopsis and the
//! season → episode tree.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ScrapeResult;
use crate::models::{Episode, MediaKind, SeriesMeta};
use crate::services::http::HttpFetcher;
use crate::services::poster::{pick_image, PosterRelay};
use crate::services::{identity, url_resolver};

/// Title selectors in priority order
pub const TITLE_SELECTORS: &[&str] = &[".entry-title", "h1"];

/// Poster image selectors in priority order
pub const POSTER_SELECTORS: &[&str] = &[".thumb img", "img"];

/// Season block containers
pub const SEASON_SELECTORS: &[&str] = &["#seasons .se-c", ".se-c"];

/// Episode anchors inside a season block
pub const SEASON_EPISODE_SELECTORS: &[&str] = &["ul.episodios li a", ".episodios a"];

/// Episode anchors when the page has no season blocks
pub const FLAT_EPISODE_SELECTORS: &[&str] = &[
    "ul.episodios li a",
    ".episodios a",
    "li.episodiolist a",
    ".ep__item a",
];

lazy_static! {
    static ref TITLES: Vec<Selector> = parse_all(TITLE_SELECTORS);
    static ref POSTERS: Vec<Selector> = parse_all(POSTER_SELECTORS);
    static ref SEASONS: Selector = Selector::parse(&SEASON_SELECTORS.join(", ")).unwrap();
    static ref SEASON_EPISODES: Selector =
        Selector::parse(&SEASON_EPISODE_SELECTORS.join(", ")).unwrap();
    static ref FLAT_EPISODES: Selector =
        Selector::parse(&FLAT_EPISODE_SELECTORS.join(", ")).unwrap();
    static ref SEASON_LABEL: Selector = Selector::parse(".title").unwrap();
    static ref SYNOPSIS: Selector = Selector::parse("#info .wp-content").unwrap();
    static ref FIRST_INTEGER: Regex = Regex::new(r"[0-9]+").unwrap();
}

fn parse_all(selectors: &[&str]) -> Vec<Selector> {
    selectors
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
}

/// Episode as found on the page, before identifiers are assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeLink {
    pub link: String,
    pub title: String,
    pub season: u32,
    pub episode: u32,
}

/// Everything a detail page yields, with posters and links still raw
#[derive(Debug, Clone, PartialEq)]
pub struct DetailPage {
    pub title: String,
    pub poster: Option<String>,
    pub synopsis: String,
    pub episodes: Vec<EpisodeLink>,
}

/// Parse a detail page. `detail_url` is the base for relative links and the
/// target of the synthetic episode when none are found.
pub fn parse_detail(html: &str, detail_url: &str) -> DetailPage {
    let document = Html::parse_document(html);

    let title = TITLES
        .iter()
        .find_map(|sel| {
            let text: String = document.select(sel).next()?.text().collect();
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        })
        .unwrap_or_else(|| detail_url.to_string());

    let poster = POSTERS
        .iter()
        .find_map(|sel| document.select(sel).next().and_then(pick_image));

    let synopsis = document
        .select(&SYNOPSIS)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let mut seen = HashSet::new();
    let blocks: Vec<ElementRef<'_>> = document.select(&SEASONS).collect();
    let mut episodes = if blocks.is_empty() {
        flat_episodes(&document, detail_url, &mut seen)
    } else {
        season_episodes(&blocks, detail_url, &mut seen)
    };

    if episodes.is_empty() {
        debug!("No episodes found, synthesising one for {}", detail_url);
        episodes.push(EpisodeLink {
            link: detail_url.to_string(),
            title: "Episodio 1".to_string(),
            season: 1,
            episode: 1,
        });
    }

    DetailPage {
        title,
        poster,
        synopsis,
        episodes,
    }
}

/// Season number from the first integer of a block label, else its ordinal
pub fn season_number(label: &str, ordinal: u32) -> u32 {
    FIRST_INTEGER
        .find(label)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(ordinal)
}

fn season_episodes(
    blocks: &[ElementRef<'_>],
    base: &str,
    seen: &mut HashSet<String>,
) -> Vec<EpisodeLink> {
    let mut episodes = Vec::new();
    for (index, block) in blocks.iter().enumerate() {
        let label: String = block
            .select(&SEASON_LABEL)
            .flat_map(|el| el.text())
            .collect();
        let season = season_number(label.trim(), index as u32 + 1);

        for (position, anchor) in block.select(&SEASON_EPISODES).enumerate() {
            if let Some(ep) = episode_from(anchor, base, season, position as u32 + 1, seen) {
                episodes.push(ep);
            }
        }
    }
    episodes
}

fn flat_episodes(document: &Html, base: &str, seen: &mut HashSet<String>) -> Vec<EpisodeLink> {
    document
        .select(&FLAT_EPISODES)
        .enumerate()
        .filter_map(|(position, anchor)| episode_from(anchor, base, 1, position as u32 + 1, seen))
        .collect()
}

/// Build one episode from an anchor; anchors without a web link or pointing at a
/// link already emitted are skipped but still occupy their ordinal.
fn episode_from(
    anchor: ElementRef<'_>,
    base: &str,
    season: u32,
    number: u32,
    seen: &mut HashSet<String>,
) -> Option<EpisodeLink> {
    let href = anchor.value().attr("href").unwrap_or("");
    let link = url_resolver::resolve_web_link(href, base)?;
    if !seen.insert(link.clone()) {
        return None;
    }

    let text: String = anchor.text().collect();
    let title = match text.trim() {
        "" => format!("Episodio {}", number),
        t => t.to_string(),
    };

    Some(EpisodeLink {
        link,
        title,
        season,
        episode: number,
    })
}

pub struct MetaExtractor {
    http: HttpFetcher,
    posters: PosterRelay,
    timeout: Duration,
}

impl MetaExtractor {
    pub fn new(http: HttpFetcher, posters: PosterRelay, timeout: Duration) -> Self {
        Self {
            http,
            posters,
            timeout,
        }
    }

    /// Fetch and extract a series. Only the page fetch can fail.
    pub async fn extract_meta(&self, detail_url: &str) -> ScrapeResult<SeriesMeta> {
        let html = self.http.get_text(detail_url, None, self.timeout).await?;
        let page = parse_detail(&html, detail_url);
        info!(
            "Extracted {} episodes for {}",
            page.episodes.len(),
            detail_url
        );

        Ok(SeriesMeta {
            external_id: identity::encode(detail_url),
            kind: MediaKind::Series,
            name: page.title,
            poster: self.posters.proxied(page.poster.as_deref(), detail_url),
            synopsis: page.synopsis,
            episodes: page
                .episodes
                .into_iter()
                .map(|ep| Episode {
                    external_id: identity::encode(&ep.link),
                    title: ep.title,
                    season: ep.season,
                    episode: ep.episode,
                })
                .collect(),
        })
    }
}
