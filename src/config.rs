use std::env;

/// Placeholder poster used whenever an image cannot be relayed
pub const PLACEHOLDER_POSTER: &str = "https://stremio.com/website/stremio-logo-small.png";

/// Path prefix under which the image relay is mounted
pub const IMAGE_RELAY_PREFIX: &str = "/img/";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub public_base_url: String,

    // Source site
    pub site_base_url: String,
    pub user_agent: String,

    // Timeouts
    pub fetch_timeout_ms: u64,
    pub resolve_timeout_ms: u64,
    pub browser_timeout_ms: u64,
    pub relay_timeout_ms: u64,
    pub streams_deadline_ms: u64,

    // Scraping
    pub max_catalog_pages: u32,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "7000".to_string())
            .parse()
            .unwrap_or(7000);

        Self {
            // Server
            port,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| format!("http://127.0.0.1:{}", port)),

            // Source site
            site_base_url: env::var("SITE_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "https://ww3.animeonline.ninja".to_string()),
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string()),

            // Timeouts
            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "15000".to_string())
                .parse()
                .unwrap_or(15_000),
            resolve_timeout_ms: env::var("RESOLVE_TIMEOUT_MS")
                .unwrap_or_else(|_| "20000".to_string())
                .parse()
                .unwrap_or(20_000),
            browser_timeout_ms: env::var("BROWSER_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30_000),
            relay_timeout_ms: env::var("RELAY_TIMEOUT_MS")
                .unwrap_or_else(|_| "15000".to_string())
                .parse()
                .unwrap_or(15_000),
            streams_deadline_ms: env::var("STREAMS_DEADLINE_MS")
                .unwrap_or_else(|_| "90000".to_string())
                .parse()
                .unwrap_or(90_000),

            // Scraping
            max_catalog_pages: env::var("MAX_CATALOG_PAGES")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
        }
    }

    /// Root URL of the image relay, e.g. `http://127.0.0.1:7000/img/`
    pub fn relay_base(&self) -> String {
        format!("{}{}", self.public_base_url, IMAGE_RELAY_PREFIX)
    }

    /// Backend endpoint that exchanges player-option tokens for an embed URL
    pub fn negotiation_endpoint(&self) -> String {
        format!("{}/wp-admin/admin-ajax.php", self.site_base_url)
    }

    /// Catalog table derived from the site base
    pub fn catalogs(&self) -> CatalogTable {
        CatalogTable::new(vec![
            CatalogDef {
                id: "animeonline_castellano".to_string(),
                name: "AnimeOnline Castellano".to_string(),
                url: format!("{}/genero/anime-castellano/", self.site_base_url),
            },
            CatalogDef {
                id: "animeonline_emision".to_string(),
                name: "AnimeOnline En Emisión".to_string(),
                url: format!("{}/genero/en-emision-1/", self.site_base_url),
            },
        ])
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// One browsable listing on the source site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogDef {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Immutable mapping from catalog identifier to listing URL
#[derive(Debug, Clone, Default)]
pub struct CatalogTable {
    entries: Vec<CatalogDef>,
}

impl CatalogTable {
    pub fn new(entries: Vec<CatalogDef>) -> Self {
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&CatalogDef> {
        self.entries.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogDef> {
        self.entries.iter()
    }
}
