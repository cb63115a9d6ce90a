//! Stream resolution
//!
//! An episode page lists *player options*; each option is exchanged for an
//! embed page through the site's negotiation endpoint, and each embed page
//! lists player links on individual hosts. Hosts with a dedicated
//! [`HostResolver`] are resolved to direct media URLs, every other link is
//! passed through for the client to open.
//!
//! Options are negotiated concurrently. As soon as one option's embed page is
//! read, its links are claimed against the run-wide seen set and dispatched
//! concurrently, so a slow option never holds back the others. Everything is
//! joined before returning.

pub mod mp4upload;
pub mod streamtape;

use async_trait::async_trait;
use futures::future::join_all;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ScrapeError, ScrapeResult};
use crate::models::StreamCandidate;
use crate::services::http::HttpFetcher;
use crate::services::{metrics, url_resolver};

pub use mp4upload::{HeadlessChrome, Mp4UploadResolver, PageScripts};
pub use streamtape::StreamtapeResolver;

/// Label used when a player link carries no visible text
const DEFAULT_LABEL: &str = "Servidor";

lazy_static! {
    static ref PLAYER_OPTION: Selector = Selector::parse("li.dooplay_player_option").unwrap();
    static ref IFRAME: Selector = Selector::parse("iframe").unwrap();
    static ref PLAYER_LINK: Selector = Selector::parse("li[onclick], div.ODDIV li").unwrap();
    static ref SPAN: Selector = Selector::parse("span").unwrap();
    static ref GO_TO_PLAYER: Regex = Regex::new(r#"go_to_player\(['"]([^'"]+)['"]\)"#).unwrap();
}

/// Resolves a player link on one embed host to a directly playable URL
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Host label shown to the client, e.g. `STREAMTAPE`
    fn name(&self) -> &str;

    /// Check if this resolver can handle the given link
    fn can_handle(&self, url: &str) -> bool;

    /// `None` means the link is handed to the client as an external URL
    async fn resolve(&self, link: &str, referer: &str) -> Option<String>;
}

/// Backend tokens of one player option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerOption {
    pub post: String,
    pub nume: String,
}

/// A player link discovered on an embed page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerLink {
    pub url: String,
    pub label: String,
    pub embed_url: String,
}

/// Player options of an episode page; options missing a token are dropped
pub fn parse_player_options(html: &str) -> Vec<PlayerOption> {
    let document = Html::parse_document(html);
    document
        .select(&PLAYER_OPTION)
        .filter_map(|el| {
            let post = el.value().attr("data-post").filter(|v| !v.is_empty())?;
            let nume = el.value().attr("data-nume").filter(|v| !v.is_empty())?;
            Some(PlayerOption {
                post: post.to_string(),
                nume: nume.to_string(),
            })
        })
        .collect()
}

/// Embed URL from a negotiation response: a JSON `embed_url` field, or the
/// first `<iframe src>` of an HTML fragment.
pub fn parse_embed_url(body: &str, base: &str) -> ScrapeResult<String> {
    let raw = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => json
            .get("embed_url")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .and_then(|field| {
                if field.contains("<iframe") {
                    first_iframe_src(field)
                } else {
                    (!field.is_empty()).then(|| field.to_string())
                }
            }),
        Err(_) => first_iframe_src(body),
    };

    raw.and_then(|r| url_resolver::resolve(&r, base))
        .ok_or_else(|| ScrapeError::Parse("no embed URL in negotiation response".to_string()))
}

fn first_iframe_src(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let src = fragment
        .select(&IFRAME)
        .filter_map(|el| el.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty())?;
    Some(src.to_string())
}

/// Player links of an embed page, resolved against the embed URL
pub fn parse_player_links(html: &str, embed_url: &str) -> Vec<PlayerLink> {
    let document = Html::parse_document(html);
    let base = Url::parse(embed_url).ok();

    document
        .select(&PLAYER_LINK)
        .filter_map(|el| {
            let onclick = el.value().attr("onclick").unwrap_or("");
            let raw = GO_TO_PLAYER.captures(onclick)?.get(1)?.as_str().trim();
            if raw.is_empty() {
                return None;
            }
            let raw = if raw.starts_with("//") {
                format!("https:{}", raw)
            } else {
                raw.to_string()
            };
            let url = base
                .as_ref()
                .and_then(|b| b.join(&raw).ok())
                .map(|u| u.to_string())
                .unwrap_or(raw);

            let text: String = el.select(&SPAN).flat_map(|s| s.text()).collect();
            let label = match text.trim() {
                "" => DEFAULT_LABEL.to_string(),
                t => t.to_string(),
            };

            Some(PlayerLink {
                url,
                label,
                embed_url: embed_url.to_string(),
            })
        })
        .collect()
}

/// Keep the links whose URL nobody has claimed yet in this run.
/// The first option to reach a link owns it.
fn claim_links(seen: &Mutex<HashSet<String>>, links: Vec<PlayerLink>) -> Vec<PlayerLink> {
    let mut seen = seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    links
        .into_iter()
        .filter(|link| seen.insert(link.url.clone()))
        .collect()
}

/// Drop candidates whose key was already produced, keeping the first
pub fn dedup_candidates(candidates: Vec<StreamCandidate>) -> Vec<StreamCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| !c.key().is_empty() && seen.insert(c.key().to_string()))
        .collect()
}

pub struct StreamResolver {
    http: HttpFetcher,
    negotiation_endpoint: String,
    timeout: Duration,
    resolvers: Vec<Arc<dyn HostResolver>>,
}

impl StreamResolver {
    pub fn new(
        http: HttpFetcher,
        negotiation_endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            negotiation_endpoint: negotiation_endpoint.into(),
            timeout,
            resolvers: Vec::new(),
        }
    }

    /// Register a dedicated host resolver; earlier registrations win
    pub fn add_resolver<R: HostResolver + 'static>(&mut self, resolver: R) {
        self.resolvers.push(Arc::new(resolver));
    }

    pub fn resolver_names(&self) -> Vec<&str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Resolve an episode page into deduplicated stream candidates.
    /// Every failure degrades to fewer (possibly zero) candidates.
    pub async fn resolve_streams(&self, episode_url: &str) -> Vec<StreamCandidate> {
        let html = match self.http.get_text(episode_url, None, self.timeout).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Episode page unavailable: {}", e);
                return Vec::new();
            }
        };

        let options = parse_player_options(&html);
        if options.is_empty() {
            info!("No player options on {}", episode_url);
            return Vec::new();
        }
        debug!("Found {} player options on {}", options.len(), episode_url);

        let seen = Mutex::new(HashSet::new());
        let per_option = join_all(
            options
                .iter()
                .map(|option| self.option_candidates(option, episode_url, &seen)),
        )
        .await;

        let streams = dedup_candidates(per_option.into_iter().flatten().collect());
        info!(
            "Resolved {} streams ({} direct) for {}",
            streams.len(),
            streams.iter().filter(|s| s.is_playable()).count(),
            episode_url
        );
        streams
    }

    /// Discover one option's links, keep those no other option claimed first,
    /// and resolve them concurrently
    async fn option_candidates(
        &self,
        option: &PlayerOption,
        episode_url: &str,
        seen: &Mutex<HashSet<String>>,
    ) -> Vec<StreamCandidate> {
        let links = claim_links(seen, self.discover_links(option, episode_url).await);
        join_all(links.iter().map(|link| self.dispatch(link))).await
    }

    /// Negotiate one option into its embed page and list its player links
    async fn discover_links(&self, option: &PlayerOption, episode_url: &str) -> Vec<PlayerLink> {
        let form = [
            ("action", "doo_player_ajax"),
            ("post", option.post.as_str()),
            ("nume", option.nume.as_str()),
            ("type", "movie"),
        ];
        let body = match self
            .http
            .post_form(&self.negotiation_endpoint, &form, self.timeout)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                warn!("Negotiation failed for option {}/{}: {}", option.post, option.nume, e);
                return Vec::new();
            }
        };

        let embed_url = match parse_embed_url(&body, &self.negotiation_endpoint) {
            Ok(url) => url,
            Err(e) => {
                debug!("Option {}/{} dropped: {}", option.post, option.nume, e);
                return Vec::new();
            }
        };

        match self
            .http
            .get_text(&embed_url, Some(episode_url), self.timeout)
            .await
        {
            Ok(html) => parse_player_links(&html, &embed_url),
            Err(e) => {
                warn!("Embed page unavailable: {}", e);
                Vec::new()
            }
        }
    }

    /// Produce exactly one candidate for a player link
    async fn dispatch(&self, link: &PlayerLink) -> StreamCandidate {
        let resolver = match self.resolvers.iter().find(|r| r.can_handle(&link.url)) {
            Some(r) => r,
            None => {
                metrics::stream_candidate("other", "passthrough");
                return StreamCandidate::External {
                    title: link.label.clone(),
                    external_url: link.url.clone(),
                };
            }
        };

        match resolver.resolve(&link.url, &link.embed_url).await {
            Some(url) => {
                metrics::stream_candidate(resolver.name(), "direct");
                StreamCandidate::Playable {
                    title: format!("{} (directo)", resolver.name()),
                    url,
                }
            }
            None => {
                metrics::stream_candidate(resolver.name(), "fallback");
                StreamCandidate::External {
                    title: resolver.name().to_string(),
                    external_url: link.url.clone(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Instant;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn episode_page(options: &[(&str, &str)]) -> String {
        let items: String = options
            .iter()
            .map(|(post, nume)| {
                format!(
                    r#"<li class="dooplay_player_option" data-post="{post}" data-nume="{nume}">Opción</li>"#
                )
            })
            .collect();
        format!(r#"<html><body><ul id="playeroptionsul">{items}</ul></body></html>"#)
    }

    fn embed_page(links: &[(&str, &str)]) -> String {
        let items: String = links
            .iter()
            .map(|(link, label)| {
                format!(r#"<li onclick="go_to_player('{link}')"><span>{label}</span></li>"#)
            })
            .collect();
        format!(r#"<html><body><div class="ODDIV"><ul>{items}</ul></div></body></html>"#)
    }

    /// Client that sends `streamtape.com` to the mock server
    fn fetcher_for(server: &MockServer) -> HttpFetcher {
        let addr: SocketAddr = server.address().to_owned();
        HttpFetcher::with_builder("test-agent", |builder| {
            builder.resolve("streamtape.com", addr)
        })
        .unwrap()
    }

    struct Unresolvable;

    #[async_trait]
    impl HostResolver for Unresolvable {
        fn name(&self) -> &str {
            "MP4UPLOAD"
        }
        fn can_handle(&self, url: &str) -> bool {
            url.contains("mp4upload.com")
        }
        async fn resolve(&self, _link: &str, _referer: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_parse_player_options() {
        let html = r#"
            <li class="dooplay_player_option" data-post="10" data-nume="1"></li>
            <li class="dooplay_player_option" data-post="10"></li>
            <li class="dooplay_player_option" data-post="10" data-nume="2"></li>
        "#;
        let options = parse_player_options(html);
        assert_eq!(
            options,
            vec![
                PlayerOption {
                    post: "10".into(),
                    nume: "1".into(),
                },
                PlayerOption {
                    post: "10".into(),
                    nume: "2".into(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_embed_url_variants() {
        let base = "https://ww3.animeonline.ninja/wp-admin/admin-ajax.php";
        assert_eq!(
            parse_embed_url(
                r#"{"embed_url":"https://embed.example/v/1","type":"iframe"}"#,
                base
            )
            .ok()
            .as_deref(),
            Some("https://embed.example/v/1")
        );
        assert_eq!(
            parse_embed_url(
                r#"{"embed_url":"<iframe class=\"metaframe\" src=\"https://embed.example/v/2\"></iframe>"}"#,
                base
            )
            .ok()
            .as_deref(),
            Some("https://embed.example/v/2")
        );
        assert_eq!(
            parse_embed_url(
                r#"<div><iframe src=""></iframe><iframe src="//embed.example/v/3"></iframe></div>"#,
                base
            )
            .ok()
            .as_deref(),
            Some("https://embed.example/v/3")
        );
        assert!(matches!(
            parse_embed_url(r#"{"embed_url":null}"#, base),
            Err(ScrapeError::Parse(_))
        ));
        assert!(parse_embed_url("<p>no player</p>", base).is_err());
    }

    #[test]
    fn test_parse_player_links() {
        let html = r#"
            <ul>
              <li onclick="go_to_player('https://streamtape.com/e/abc')"><span>Streamtape</span></li>
              <li onclick="go_to_player(&quot;//ok.example/v/1&quot;)"><span></span></li>
              <li onclick="go_to_player('/relative/2')"><span>Rel</span></li>
              <li onclick="somethingElse()"><span>ignored</span></li>
              <li onclick="go_to_player('  ')"><span>blank</span></li>
            </ul>
        "#;
        let links = parse_player_links(html, "https://embed.example/v/9");
        let urls: Vec<_> = links.iter().map(|l| (l.url.as_str(), l.label.as_str())).collect();
        assert_eq!(
            urls,
            vec![
                ("https://streamtape.com/e/abc", "Streamtape"),
                ("https://ok.example/v/1", "Servidor"),
                ("https://embed.example/relative/2", "Rel"),
            ]
        );
        assert!(links.iter().all(|l| l.embed_url == "https://embed.example/v/9"));
    }

    #[test]
    fn test_dedup_candidates() {
        let candidates = vec![
            StreamCandidate::Playable {
                title: "A".into(),
                url: "https://x/1.mp4".into(),
            },
            StreamCandidate::External {
                title: "B".into(),
                external_url: "https://x/1.mp4".into(),
            },
            StreamCandidate::External {
                title: "C".into(),
                external_url: "https://x/2".into(),
            },
            StreamCandidate::External {
                title: "C".into(),
                external_url: "https://x/2".into(),
            },
        ];
        let deduped = dedup_candidates(candidates);
        assert_eq!(deduped.len(), 2);
        assert!(deduped[0].is_playable());
    }

    #[tokio::test]
    async fn test_direct_and_passthrough_candidates() {
        let server = MockServer::start().await;
        let port = server.address().port();
        let uri = server.uri();
        let streamtape_link = format!("http://streamtape.com:{}/e/abc", port);
        let embed_url = format!("{}/embed/1", uri);

        Mock::given(method("GET"))
            .and(path("/episodio/naruto-1x1/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(episode_page(&[("77", "1")])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/wp-admin/admin-ajax.php"))
            .and(body_string_contains("action=doo_player_ajax"))
            .and(body_string_contains("post=77"))
            .and(body_string_contains("nume=1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(r#"{{"embed_url":"{}","type":"iframe"}}"#, embed_url)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/embed/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(embed_page(&[
                (streamtape_link.as_str(), "Streamtape"),
                ("https://ok.example/v/1", "OK.ru"),
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/e/abc"))
            .and(header("referer", embed_url.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<video src="https://cdn.example/naruto-1.mp4"></video>"#),
            )
            .mount(&server)
            .await;

        let http = fetcher_for(&server);
        let mut resolver = StreamResolver::new(
            http.clone(),
            format!("{}/wp-admin/admin-ajax.php", uri),
            Duration::from_secs(5),
        );
        resolver.add_resolver(StreamtapeResolver::new(http, Duration::from_secs(5)));

        let streams = resolver
            .resolve_streams(&format!("{}/episodio/naruto-1x1/", uri))
            .await;

        assert_eq!(
            streams,
            vec![
                StreamCandidate::Playable {
                    title: "STREAMTAPE (directo)".to_string(),
                    url: "https://cdn.example/naruto-1.mp4".to_string(),
                },
                StreamCandidate::External {
                    title: "OK.ru".to_string(),
                    external_url: "https://ok.example/v/1".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_links_deduplicated_across_options_and_fallback_title() {
        let server = MockServer::start().await;
        let uri = server.uri();

        Mock::given(method("GET"))
            .and(path("/ep/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(episode_page(&[("1", "1"), ("1", "2"), ("1", "3")])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("nume=1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<iframe src="{}/embed/a"></iframe>"#,
                uri
            )))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("nume=2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(r#"{{"embed_url":"{}/embed/b"}}"#, uri))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("nume=3"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>nothing here</p>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/embed/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(embed_page(&[
                ("https://www.mp4upload.com/embed-x.html", "MP4"),
                ("https://ok.example/v/1", ""),
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/embed/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string(embed_page(&[
                ("https://ok.example/v/1", "Duplicate"),
            ])))
            .mount(&server)
            .await;

        let mut resolver = StreamResolver::new(
            HttpFetcher::new("test-agent").unwrap(),
            format!("{}/wp-admin/admin-ajax.php", uri),
            Duration::from_secs(5),
        );
        resolver.add_resolver(Unresolvable);

        let streams = resolver.resolve_streams(&format!("{}/ep/", uri)).await;
        assert_eq!(
            streams,
            vec![
                StreamCandidate::External {
                    title: "MP4UPLOAD".to_string(),
                    external_url: "https://www.mp4upload.com/embed-x.html".to_string(),
                },
                StreamCandidate::External {
                    title: "Servidor".to_string(),
                    external_url: "https://ok.example/v/1".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_episode_page_failure_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let resolver = StreamResolver::new(
            HttpFetcher::new("test-agent").unwrap(),
            format!("{}/wp-admin/admin-ajax.php", server.uri()),
            Duration::from_secs(5),
        );
        assert!(resolver.resolve_streams(&server.uri()).await.is_empty());
    }

    #[tokio::test]
    async fn test_page_without_options_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let resolver = StreamResolver::new(
            HttpFetcher::new("test-agent").unwrap(),
            format!("{}/wp-admin/admin-ajax.php", server.uri()),
            Duration::from_secs(5),
        );
        assert!(resolver.resolve_streams(&server.uri()).await.is_empty());
    }

    /// Records how long after construction its first resolution started
    struct StartedAt {
        origin: Instant,
        started: Mutex<Option<Duration>>,
    }

    #[async_trait]
    impl HostResolver for Arc<StartedAt> {
        fn name(&self) -> &str {
            "MP4UPLOAD"
        }
        fn can_handle(&self, url: &str) -> bool {
            url.contains("mp4upload.com")
        }
        async fn resolve(&self, _link: &str, _referer: &str) -> Option<String> {
            let mut started = self.started.lock().unwrap();
            started.get_or_insert(self.origin.elapsed());
            Some("https://cdn.example/fast.mp4".to_string())
        }
    }

    #[tokio::test]
    async fn test_slow_option_does_not_hold_back_other_links() {
        let server = MockServer::start().await;
        let uri = server.uri();

        Mock::given(method("GET"))
            .and(path("/ep/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(episode_page(&[("5", "1"), ("5", "2")])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("nume=1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(r#"{{"embed_url":"{}/embed/slow"}}"#, uri))
                    .set_delay(Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("nume=2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(r#"{{"embed_url":"{}/embed/fast"}}"#, uri)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/embed/slow"))
            .respond_with(ResponseTemplate::new(200).set_body_string(embed_page(&[(
                "https://ok.example/v/slow",
                "Lento",
            )])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/embed/fast"))
            .respond_with(ResponseTemplate::new(200).set_body_string(embed_page(&[(
                "https://www.mp4upload.com/embed-fast.html",
                "MP4",
            )])))
            .mount(&server)
            .await;

        let recorder = Arc::new(StartedAt {
            origin: Instant::now(),
            started: Mutex::new(None),
        });
        let mut resolver = StreamResolver::new(
            HttpFetcher::new("test-agent").unwrap(),
            format!("{}/wp-admin/admin-ajax.php", uri),
            Duration::from_secs(5),
        );
        resolver.add_resolver(recorder.clone());

        let streams = resolver.resolve_streams(&format!("{}/ep/", uri)).await;

        assert_eq!(streams.len(), 2);
        let started = recorder.started.lock().unwrap().expect("fast link dispatched");
        assert!(started < Duration::from_millis(1000), "dispatched after {:?}", started);
    }
}
