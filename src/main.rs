use actix_web::{web, App, HttpServer};
use rps_lobby::bus::NotificationBus;
use rps_lobby::config::Config;
use rps_lobby::http::lobby_handler::{configure_routes, AppState};
use rps_lobby::middleware::cors_middleware;
use rps_lobby::store::StoreBackend;
use rps_lobby::telemetry::init_telemetry;
use std::io;
use tokio::signal;

#[tokio::main]
async fn main() -> io::Result<()> {
    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");

    // Initialize telemetry
    init_telemetry(&config.server.rust_log);

    let store = StoreBackend::from_config(&config.store)
        .await
        .expect("Failed to open shared store");
    let bus = NotificationBus::from_config(&config.bus);

    tracing::info!(
        store = ?store.kind(),
        policy = %config.lobby.policy,
        "Starting rps-lobby on {}:{}",
        config.server.host,
        config.server.port
    );

    let state = web::Data::new(AppState::new(store, bus, config.lobby.clone()));
    let app_state = state.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(cors_middleware())
            .wrap(actix_web::middleware::Logger::default())
            .configure(configure_routes)
    })
    .bind((config.server.host.clone(), config.server.port))?
    .run();

    // Graceful shutdown
    let server_handle = server.handle();
    tokio::spawn(async move {
        signal::ctrl_c().await.expect("Failed to listen for shutdown signal");
        tracing::info!("Shutdown signal received, stopping server...");
        state.shutdown().await;
        server_handle.stop(true).await;
    });

    server.await
}
