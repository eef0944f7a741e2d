use actix_web::{middleware, web, App, HttpServer};
use flagatlas::Store;
use std::sync::Mutex;

mod config;
mod handlers;
mod render;

use config::ServerConfig;

/// Shared application state
pub struct AppState {
    pub store: Mutex<Store>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting FlagAtlas server");

    let config = ServerConfig::from_env();
    log::info!("Opening database at: {}", config.database.display());
    let store = Store::open(&config.database)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let state = web::Data::new(AppState {
        store: Mutex::new(store),
    });

    log::info!("Listening on {}:{}", config.host, config.port);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
