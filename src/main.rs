mod config;
mod error;
mod models;
mod routes;
mod services;

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::{
    catalog::CatalogScraper,
    http::HttpFetcher,
    meta::MetaExtractor,
    poster::PosterRelay,
    streams::{HeadlessChrome, Mp4UploadResolver, StreamResolver, StreamtapeResolver},
};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub http: HttpFetcher,
    pub catalog: CatalogScraper,
    pub meta: MetaExtractor,
    pub streams: StreamResolver,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire the pipeline from configuration and a shared HTTP client
    pub fn new(config: Config, http: HttpFetcher) -> Self {
        let fetch_timeout = Duration::from_millis(config.fetch_timeout_ms);
        let resolve_timeout = Duration::from_millis(config.resolve_timeout_ms);
        let browser_timeout = Duration::from_millis(config.browser_timeout_ms);
        let posters = PosterRelay::new(config.relay_base());

        let catalog = CatalogScraper::new(
            config.catalogs(),
            http.clone(),
            posters.clone(),
            fetch_timeout,
            config.max_catalog_pages,
        );
        let meta = MetaExtractor::new(http.clone(), posters, fetch_timeout);

        let mut streams =
            StreamResolver::new(http.clone(), config.negotiation_endpoint(), resolve_timeout);
        streams.add_resolver(StreamtapeResolver::new(http.clone(), resolve_timeout));
        streams.add_resolver(Mp4UploadResolver::new(Arc::new(HeadlessChrome::new(
            http.user_agent(),
            browser_timeout,
        ))));

        Self {
            config,
            http,
            catalog,
            meta,
            streams,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/live", get(routes::health::live))
        // Add-on protocol
        .route("/manifest.json", get(routes::addon::manifest))
        .route("/catalog/:type/:id", get(routes::addon::catalog))
        .route("/meta/:type/:id", get(routes::addon::meta))
        .route("/stream/:type/:id", get(routes::addon::streams))
        // Image relay
        .route("/img/*payload", get(routes::image::relay))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "animeonline_addon=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();
    let port = config.port;

    tracing::info!("Starting AnimeOnline Addon v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Source site: {}", config.site_base_url);
    tracing::info!("Image relay: {}", config.relay_base());

    let http = HttpFetcher::new(&config.user_agent)?;
    let state = Arc::new(AppState::new(config, http));
    tracing::info!(
        "Stream resolvers: {}",
        state.streams.resolver_names().join(", ")
    );

    let app = build_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}/manifest.json", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
