//! The two cache tiers: raw remote sources and finished derivatives.
//!
//! The source group is built first; the thumbnail loader closes over the
//! source loader (which carries the source group's handle), resolving the
//! loader-to-cache cycle at construction time.

pub mod group;

pub use group::{Group, Loader, Weigh};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocket::tokio;

use crate::codec;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::iiif::params::TransformDescriptor;
use crate::iiif::planner::{self, Maxima};
use crate::source::{self, SourceLoader};

/// Content cache for remotely fetched source bytes, keyed by origin URL.
pub struct SourceCache {
    group: Group<DownloadLoader>,
}

struct DownloadLoader {
    client: reqwest::Client,
}

#[rocket::async_trait]
impl Loader for DownloadLoader {
    type Value = Vec<u8>;
    type Context = ();

    async fn load(&self, key: &str, _ctx: ()) -> Result<Vec<u8>> {
        source::download(&self.client, key).await
    }
}

impl SourceCache {
    pub fn new(budget: usize, client: reqwest::Client) -> Self {
        Self {
            group: Group::new("images", budget, DownloadLoader { client }),
        }
    }

    pub async fn get(&self, url: &str) -> Result<Arc<Vec<u8>>> {
        self.group.get(url, ()).await
    }

    pub fn contains(&self, url: &str) -> bool {
        self.group.contains(url)
    }

    pub fn len(&self) -> usize {
        self.group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }
}

/// A finished derivative: encoded output bytes plus the modification time
/// inherited from its source, for conditional HTTP responses.
#[derive(Debug, Clone)]
pub struct Derivative {
    pub bytes: Vec<u8>,
    pub mod_time: DateTime<Utc>,
}

impl Weigh for Derivative {
    fn weight(&self) -> usize {
        self.bytes.len()
    }
}

/// What the derivative loader needs beyond the request path: the resolved
/// identifier and the already-validated transform parameters.
#[derive(Debug, Clone)]
pub struct ThumbnailContext {
    pub identifier: String,
    pub descriptor: TransformDescriptor,
}

/// Result cache for encoded derivatives, keyed by the full request path.
pub struct ThumbnailCache {
    group: Group<ThumbnailLoader>,
}

struct ThumbnailLoader {
    config: AppConfig,
    sources: SourceLoader,
}

#[rocket::async_trait]
impl Loader for ThumbnailLoader {
    type Value = Derivative;
    type Context = ThumbnailContext;

    async fn load(&self, _key: &str, ctx: ThumbnailContext) -> Result<Derivative> {
        let raw = self.sources.resolve(&ctx.identifier).await?;
        let mod_time = raw.mod_time;

        let maxima = Maxima::from(&self.config);
        let descriptor = ctx.descriptor;

        // Decode and both transform passes are CPU-bound; keep them off
        // the async workers.
        let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let img = codec::decode(&raw.bytes)?;
            let (width, height) = codec::dimensions(&img);
            let plan = planner::plan(&descriptor, width, height, &maxima)?;
            planner::render(img, &plan)
        })
        .await
        .map_err(|e| Error::Internal(format!("render task failed: {}", e)))??;

        Ok(Derivative { bytes, mod_time })
    }
}

impl ThumbnailCache {
    pub fn new(budget: usize, config: AppConfig, sources: SourceLoader) -> Self {
        Self {
            group: Group::new("thumbnails", budget, ThumbnailLoader { config, sources }),
        }
    }

    pub async fn get(&self, path: &str, ctx: ThumbnailContext) -> Result<Arc<Derivative>> {
        self.group.get(path, ctx).await
    }

    pub fn contains(&self, path: &str) -> bool {
        self.group.contains(path)
    }

    pub fn len(&self) -> usize {
        self.group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }
}
