pub mod app_config;
pub mod ledger_gateway;
pub mod orders;
pub mod rooms;
pub mod snapshot;

pub use ledger_gateway::LedgerGatewayClient;
pub use orders::MemoryOrderStore;
pub use rooms::MemoryRoomStore;
