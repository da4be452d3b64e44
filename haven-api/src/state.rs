use std::sync::Arc;

use haven_catalog::CatalogService;
use haven_order::engine::ReservationEngine;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
    pub engine: Arc<ReservationEngine>,
    pub auth: AuthConfig,
}
