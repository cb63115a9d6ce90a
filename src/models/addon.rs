use serde::{Deserialize, Serialize};

/// Content type exposed by the add-on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Series,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Series => write!(f, "series"),
        }
    }
}

/// One series summary produced from a listing page item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "id")]
    pub external_id: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub name: String,
    pub poster: String,
}

/// Full metadata of a series detail page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMeta {
    #[serde(rename = "id")]
    pub external_id: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub name: String,
    pub poster: String,
    #[serde(rename = "description")]
    pub synopsis: String,
    #[serde(rename = "videos")]
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    #[serde(rename = "id")]
    pub external_id: String,
    pub title: String,
    pub season: u32,
    pub episode: u32,
}

/// A resolved stream: either directly playable or an external page the
/// client has to open itself. Exactly one URL is ever present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamCandidate {
    Playable {
        title: String,
        url: String,
    },
    External {
        title: String,
        #[serde(rename = "externalUrl")]
        external_url: String,
    },
}

impl StreamCandidate {
    pub fn title(&self) -> &str {
        match self {
            StreamCandidate::Playable { title, .. } | StreamCandidate::External { title, .. } => {
                title
            }
        }
    }

    /// Deduplication key: playable URL, else external URL, else title
    pub fn key(&self) -> &str {
        match self {
            StreamCandidate::Playable { url, .. } if !url.is_empty() => url,
            StreamCandidate::External { external_url, .. } if !external_url.is_empty() => {
                external_url
            }
            other => other.title(),
        }
    }

    pub fn is_playable(&self) -> bool {
        matches!(self, StreamCandidate::Playable { .. })
    }
}

// ============================================================================
// Handler envelopes
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub metas: Vec<CatalogEntry>,
}

/// `meta` is serialised as `{}` when the series could not be resolved
#[derive(Debug, Serialize)]
pub struct MetaResponse {
    pub meta: MetaBody,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MetaBody {
    Found(SeriesMeta),
    Empty {},
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreamsResponse {
    pub streams: Vec<StreamCandidate>,
}

// ============================================================================
// Manifest
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: String,
    pub version: String,
    pub name: String,
    pub description: String,
    pub resources: Vec<String>,
    pub types: Vec<MediaKind>,
    pub id_prefixes: Vec<String>,
    pub catalogs: Vec<ManifestCatalog>,
}

#[derive(Debug, Serialize)]
pub struct ManifestCatalog {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub id: String,
    pub name: String,
}
