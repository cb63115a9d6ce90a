//! Add-on protocol routes
//!
//! Every handler answers `200` with a JSON envelope; failures inside the
//! pipeline only ever shrink the payload.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::PLACEHOLDER_POSTER;
use crate::models::{
    CatalogEntry, CatalogResponse, Manifest, ManifestCatalog, MediaKind, MetaBody, MetaResponse,
    StreamsResponse,
};
use crate::services::{identity, metrics};
use crate::AppState;

/// Strip the `.json` suffix the protocol appends to resource ids
fn resource_id(raw: &str) -> &str {
    raw.strip_suffix(".json").unwrap_or(raw)
}

/// GET /manifest.json
pub async fn manifest(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(Manifest {
        id: "org.animeonline.addon".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: "AnimeOnline".to_string(),
        description: "Series, seasons and streams from animeonline.ninja".to_string(),
        resources: vec![
            "catalog".to_string(),
            "meta".to_string(),
            "stream".to_string(),
        ],
        types: vec![MediaKind::Series],
        id_prefixes: vec![identity::ID_PREFIX.to_string()],
        catalogs: state
            .catalog
            .catalogs()
            .iter()
            .map(|c| ManifestCatalog {
                kind: MediaKind::Series,
                id: c.id.clone(),
                name: c.name.clone(),
            })
            .collect(),
    })
}

/// GET /catalog/:type/:id.json
pub async fn catalog(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
) -> Json<CatalogResponse> {
    let id = resource_id(&id);
    let def = match state.catalog.catalogs().get(id) {
        Some(def) => def,
        None => {
            info!("Unknown catalog requested: {}/{}", kind, id);
            return Json(CatalogResponse { metas: Vec::new() });
        }
    };

    let mut metas = state.catalog.scrape(&def.url).await;
    metrics::catalog_entries(&def.id, metas.len());
    info!("Catalog {} produced {} entries", def.id, metas.len());

    if metas.is_empty() {
        metas.push(CatalogEntry {
            external_id: identity::encode(&def.url),
            kind: MediaKind::Series,
            name: "Fallback Anime".to_string(),
            poster: PLACEHOLDER_POSTER.to_string(),
        });
    }

    Json(CatalogResponse { metas })
}

/// GET /meta/:type/:id.json
pub async fn meta(
    State(state): State<Arc<AppState>>,
    Path((_kind, id)): Path<(String, String)>,
) -> Json<MetaResponse> {
    let id = resource_id(&id);
    let detail_url = match identity::decode(id) {
        Ok(url) => url,
        Err(e) => {
            info!("Meta request with foreign id: {}", e);
            return Json(MetaResponse {
                meta: MetaBody::Empty {},
            });
        }
    };

    match state.meta.extract_meta(&detail_url).await {
        Ok(mut meta) => {
            meta.external_id = id.to_string();
            Json(MetaResponse {
                meta: MetaBody::Found(meta),
            })
        }
        Err(e) => {
            warn!("Meta handler error: {}", e);
            Json(MetaResponse {
                meta: MetaBody::Empty {},
            })
        }
    }
}

/// GET /stream/:type/:id.json
pub async fn streams(
    State(state): State<Arc<AppState>>,
    Path((_kind, id)): Path<(String, String)>,
) -> Json<StreamsResponse> {
    let id = resource_id(&id);
    info!("Stream request: {}", id);

    let episode_url = match identity::decode(id) {
        Ok(url) => url,
        Err(e) => {
            info!("Stream request with foreign id: {}", e);
            return Json(StreamsResponse {
                streams: Vec::new(),
            });
        }
    };

    let deadline = Duration::from_millis(state.config.streams_deadline_ms);
    let streams = match tokio::time::timeout(deadline, state.streams.resolve_streams(&episode_url))
        .await
    {
        Ok(streams) => streams,
        Err(_) => {
            warn!("Stream resolution for {} exceeded {:?}", episode_url, deadline);
            Vec::new()
        }
    };

    Json(StreamsResponse { streams })
}
