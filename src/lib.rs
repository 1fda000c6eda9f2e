#[macro_use]
extern crate rocket;

pub mod api;
pub mod cache;
pub mod codec;
pub mod config;
pub mod cors;
pub mod error;
pub mod iiif;
pub mod source;

use std::sync::Arc;
use std::time::Duration;

use rocket::figment::Figment;
use rocket::{Build, Rocket};
use rocket_dyn_templates::Template;

use cache::{SourceCache, ThumbnailCache};
use config::AppConfig;
use cors::CORS;
use source::SourceLoader;

/// Builds the Rocket instance from an extracted configuration.
///
/// The source cache is built first so the thumbnail loader can close over
/// its handle; both groups then travel through managed state.
pub fn server(figment: Figment, config: AppConfig) -> Rocket<Build> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to build HTTP client");

    let sources = Arc::new(SourceCache::new(config.cache.images_size(), client.clone()));
    let loader = SourceLoader::new(&config.images, client, Some(sources.clone()));
    let thumbnails = ThumbnailCache::new(
        config.cache.thumbnails_size(),
        config.clone(),
        loader.clone(),
    );

    let figment = figment
        .merge(("address", config.host.clone()))
        .merge(("port", config.port))
        .merge(("template_dir", config.templates.clone()));

    rocket::custom(figment)
        .attach(CORS)
        .attach(Template::fairing())
        .manage(config)
        .manage(sources)
        .manage(thumbnails)
        .manage(loader)
        .mount("/", routes![api::index, api::demo, api::dispatch])
}
