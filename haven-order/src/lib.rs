pub mod engine;
pub mod expiry;
pub mod models;
pub mod repository;

pub use engine::{EngineConfig, MockLedger, ReservationEngine, ReservationError};
pub use models::{OrderStatus, ReservationOrder};
