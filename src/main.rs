use std::net::SocketAddr;

use axum::Router;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::CONFIG;

mod config;
mod controller;
mod database;
mod relay;
mod schema;
mod service;
mod utils;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(CONFIG.log_level.clone())),
        )
        .init();

    database::init();
    service::settings::load_from_database();
    // Start the detached notify worker before the first request needs it.
    service::notify::get_notify_manager();

    let app = Router::new()
        .merge(relay::create_relay_router())
        .merge(controller::create_api_router())
        .fallback(controller::handle_404);
    let app = if CONFIG.base_path.is_empty() {
        app
    } else {
        Router::new().nest(&CONFIG.base_path, app)
    };

    let addr = format!("{}:{}", &CONFIG.host, CONFIG.port);
    info!("server start at {}", &addr);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("failed to start server");
}
