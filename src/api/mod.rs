//! HTTP surface of the IIIF service.
//!
//! Identifiers may span any number of path segments (they can be
//! percent-encoded URLs), so everything below `/` and `/demo` goes through
//! one catch-all route that dispatches on the tail, in the same precedence
//! order the original router used: `info.json`, then the image pattern,
//! then `{viewer}.html`, then the redirect to `info.json`.

pub mod error;
pub mod serve;

use std::convert::Infallible;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::debug;
use rocket::http::uri::fmt::Path;
use rocket::http::uri::Segments;
use rocket::request::{FromRequest, FromSegments, Outcome, Request};
use rocket::response::Redirect;
use rocket::tokio;
use rocket::State;
use rocket_dyn_templates::{context, Metadata, Template};
use serde::Serialize;

use crate::cache::{ThumbnailCache, ThumbnailContext};
use crate::codec;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::iiif::params::TransformDescriptor;
use crate::iiif::profile::ImageInfo;
use crate::source::SourceLoader;
use serve::{etag_for, ImageResponse, InfoResponse};

/// The raw path tail. Segments are percent-decoded at most once: routers
/// hand them over decoded, but a decoded segment that still contains `%`
/// (a double-encoded identifier) is resolved by the source loader.
pub struct IiifPath(pub Vec<String>);

impl<'r> FromSegments<'r> for IiifPath {
    type Error = Infallible;

    fn from_segments(segments: Segments<'r, Path>) -> std::result::Result<Self, Infallible> {
        Ok(IiifPath(segments.map(str::to_string).collect()))
    }
}

/// Scheme and host as the client sees them, honoring reverse-proxy
/// headers. The service itself never terminates TLS, so without a
/// forwarded protocol the scheme is plain `http`.
pub struct RequestedBase {
    pub scheme: String,
    pub host: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestedBase {
    type Error = Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Infallible> {
        let headers = req.headers();

        let scheme = headers
            .get_one("X-Forwarded-Proto")
            .unwrap_or("http")
            .to_string();
        let host = headers
            .get_one("X-Forwarded-Host")
            .map(str::to_string)
            .or_else(|| req.host().map(|host| host.to_string()))
            .unwrap_or_else(|| "localhost".to_string());

        Outcome::Success(RequestedBase { scheme, host })
    }
}

#[derive(Responder)]
pub enum ApiResponse {
    Image(ImageResponse),
    Info(InfoResponse),
    Html(Template),
    Redirect(Redirect),
}

#[derive(Serialize)]
struct TitledUrl {
    url: String,
    title: String,
}

#[derive(Serialize)]
struct EncodedUrl {
    url: String,
    encoded: String,
}

#[get("/")]
pub async fn index(config: &State<AppConfig>) -> Template {
    let images = vec![
        TitledUrl {
            url: "https://www.nasa.gov/sites/default/files/thumbnails/image/blacksea_amo_2017149_lrg.jpg".to_string(),
            title: "NASA view of the Black Sea".to_string(),
        },
        TitledUrl {
            url: "http://futurist.se/gldt/wp-content/uploads/12.10/gldt1210.png".to_string(),
            title: "Linux distributions as of 2010".to_string(),
        },
    ];
    let viewers = vec![
        TitledUrl {
            url: "openseadragon.html".to_string(),
            title: "OpenSeadragon".to_string(),
        },
        TitledUrl {
            url: "leaflet.html".to_string(),
            title: "Leaflet-IIIF".to_string(),
        },
        TitledUrl {
            url: "iiifviewer.html".to_string(),
            title: "IIIF Viewer".to_string(),
        },
        TitledUrl {
            url: "info.json".to_string(),
            title: "JSON-LD profile".to_string(),
        },
    ];

    let files = list_images(&config.images).await;
    Template::render("index", context! { files, images, viewers })
}

#[get("/demo")]
pub async fn demo(config: &State<AppConfig>) -> Template {
    let url = "http://dosimple.ch/yoan.png".to_string();
    let urls = vec![EncodedUrl {
        encoded: BASE64.encode(&url),
        url,
    }];

    let files = list_images(&config.images).await;
    Template::render("demo", context! { files, urls })
}

async fn list_images(root: &str) -> Vec<String> {
    let mut files = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(root).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
    }
    files.sort();
    files
}

#[get("/<path..>?<dl>")]
#[allow(clippy::too_many_arguments)]
pub async fn dispatch(
    path: IiifPath,
    dl: Option<&str>,
    base: RequestedBase,
    config: &State<AppConfig>,
    thumbnails: &State<ThumbnailCache>,
    loader: &State<SourceLoader>,
    metadata: Metadata<'_>,
) -> Result<ApiResponse> {
    let segments = path.0;
    let last = match segments.last() {
        Some(last) => last.as_str(),
        None => return Err(Error::NotFound("/".to_string())),
    };

    if last == "info.json" {
        if segments.len() < 2 {
            return Err(Error::NotFound(last.to_string()));
        }
        let identifier = segments[..segments.len() - 1].join("/");
        return info(&identifier, base, config, loader).await.map(ApiResponse::Info);
    }

    if segments.len() >= 5 && last.contains('.') {
        return image(&segments, dl.is_some(), thumbnails)
            .await
            .map(ApiResponse::Image);
    }

    if segments.len() >= 2 {
        if let Some(viewer) = last.strip_suffix(".html") {
            let identifier = segments[..segments.len() - 1].join("/");
            return viewer_page(viewer, &identifier, &metadata).map(ApiResponse::Html);
        }
    }

    let identifier = SourceLoader::sanitize(&segments.join("/"));
    debug!("redirecting {:?} to its info.json", identifier);
    Ok(ApiResponse::Redirect(Redirect::to(format!(
        "{}://{}/{}/info.json",
        base.scheme, base.host, identifier
    ))))
}

/// The image technical properties, rebuilt per request; only the source
/// bytes behind it are cached.
async fn info(
    identifier: &str,
    base: RequestedBase,
    config: &State<AppConfig>,
    loader: &State<SourceLoader>,
) -> Result<InfoResponse> {
    let identifier = SourceLoader::sanitize(identifier);
    let raw = loader.resolve(&identifier).await?;

    let bytes = Arc::clone(&raw.bytes);
    let (width, height) = tokio::task::spawn_blocking(move || -> Result<(u32, u32)> {
        let img = codec::decode(&bytes)?;
        Ok(codec::dimensions(&img))
    })
    .await
    .map_err(|e| Error::Internal(format!("decode task failed: {}", e)))??;

    let document = ImageInfo::new(&base.scheme, &base.host, &identifier, width, height, config);
    let body = serde_json::to_vec_pretty(&document)
        .map_err(|e| Error::Internal(format!("cannot create the profile: {}", e)))?;

    Ok(InfoResponse {
        body,
        mod_time: raw.mod_time,
        etag: etag_for(&format!("/{}/info.json", identifier)),
        max_age: config.cache.http,
    })
}

async fn image(
    segments: &[String],
    attachment: bool,
    thumbnails: &State<ThumbnailCache>,
) -> Result<ImageResponse> {
    let tail = &segments[segments.len() - 4..];
    let (region, size, rotation) = (&tail[0], &tail[1], &tail[2]);
    let (quality, format) = match tail[3].rsplit_once('.') {
        Some(pair) => pair,
        None => return Err(Error::Format(tail[3].clone())),
    };

    let descriptor = TransformDescriptor::parse(region, size, rotation, quality, format)?;
    let identifier = segments[..segments.len() - 4].join("/");
    let path = format!("/{}", segments.join("/"));

    let derivative = thumbnails
        .get(
            &path,
            ThumbnailContext {
                identifier: identifier.clone(),
                descriptor: descriptor.clone(),
            },
        )
        .await?;

    Ok(ImageResponse {
        bytes: derivative.bytes.clone(),
        content_type: descriptor.format.content_type(),
        mod_time: derivative.mod_time,
        etag: etag_for(&path),
        filename: disposition_filename(&identifier, region, size, rotation, &tail[3]),
        attachment,
    })
}

fn viewer_page(viewer: &str, identifier: &str, metadata: &Metadata<'_>) -> Result<Template> {
    let name = format!("viewer/{}", viewer);
    if !metadata.contains_template(&name) {
        return Err(Error::NotFound(format!("{}.html", viewer)));
    }

    let image = SourceLoader::sanitize(identifier);
    Ok(Template::render(name, context! { image }))
}

/// `identifier-region-size-rotation-quality.format` with path and header
/// delimiters defanged.
fn disposition_filename(
    identifier: &str,
    region: &str,
    size: &str,
    rotation: &str,
    quality_format: &str,
) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        identifier, region, size, rotation, quality_format
    )
    .replace(['/', ':'], "_")
    .replace(',', "")
}
