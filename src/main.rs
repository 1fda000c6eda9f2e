use dotenv::dotenv;
use env_logger::Env;
use log::info;
use rocket::figment::{
    providers::{Format, Toml},
    Figment, Profile,
};
use rocket::Config;

use iiifd::config::AppConfig;

#[rocket::launch]
fn rocket() -> _ {
    dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    // Load config
    let figment = Figment::from(Config::default())
        .merge(Toml::file("App.toml").nested())
        .select(Profile::from_env_or("APP_PROFILE", "default"));

    let config = figment.extract::<AppConfig>().unwrap();
    info!("Configuration loaded successfully");

    info!(
        "Starting IIIF image server on {}:{} (images: {:?})",
        config.host, config.port, config.images
    );

    iiifd::server(figment, config)
}
