pub mod repository;
pub mod room;
pub mod service;

pub use room::{CatalogError, Room, RoomDraft};
pub use service::CatalogService;
