use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use haven_api::{
    app,
    state::{AppState, AuthConfig},
};
use haven_catalog::repository::RoomRepository;
use haven_catalog::CatalogService;
use haven_order::engine::{EngineConfig, ReservationEngine};
use haven_order::repository::OrderRepository;
use haven_store::{LedgerGatewayClient, MemoryOrderStore, MemoryRoomStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "haven_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = haven_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Haven API on port {}", config.server.port);

    let (rooms, orders): (Arc<dyn RoomRepository>, Arc<dyn OrderRepository>) =
        match &config.storage.data_dir {
            Some(dir) => (
                Arc::new(MemoryRoomStore::open(dir).expect("Failed to open room region")),
                Arc::new(MemoryOrderStore::open(dir).expect("Failed to open order regions")),
            ),
            None => (
                Arc::new(MemoryRoomStore::ephemeral()),
                Arc::new(MemoryOrderStore::ephemeral()),
            ),
        };

    let ledger = Arc::new(LedgerGatewayClient::new(&config.ledger.gateway_url));

    let engine_config = EngineConfig {
        holding_fee: config.business_rules.holding_fee,
        service_account: config.ledger.service_account.clone(),
        grace_period: Duration::from_secs(config.business_rules.grace_period_seconds),
        night_seconds: config.business_rules.night_seconds,
    };
    let engine = Arc::new(ReservationEngine::new(
        rooms.clone(),
        orders,
        ledger,
        engine_config,
    ));
    let catalog = Arc::new(CatalogService::new(rooms));

    let app_state = AppState {
        catalog,
        engine,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");
    axum::serve(listener, app).await.expect("Server error");
}
