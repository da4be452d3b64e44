use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single value transfer recorded on the external ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transfer {
    /// Sender's ledger account.
    pub from: String,
    /// Receiver's ledger account.
    pub to: String,
    /// Transferred amount in the ledger's smallest unit.
    pub amount: u64,
    /// Fee charged by the ledger for this transfer.
    pub fee: u64,
    /// Caller-chosen correlation tag carried with the transfer.
    pub memo: u64,
}

/// An immutable, ordered record in the ledger. Not every block carries a
/// transfer operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub transfer: Option<Transfer>,
}

/// Ledger-side failures. These are remote errors and must surface as values,
/// never as panics.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Transfer rejected: {0}")]
    Rejected(String),
}

/// Client for the external payment ledger. All three calls are potentially
/// slow remote operations.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a transfer; returns the index of the block it was recorded in.
    async fn transfer(&self, to: &str, amount: u64, fee: u64, memo: u64)
        -> Result<u64, LedgerError>;

    /// Fetch up to `length` blocks starting at index `start`.
    async fn query_blocks(&self, start: u64, length: u64) -> Result<Vec<Block>, LedgerError>;

    /// The ledger's current per-transfer fee.
    async fn transfer_fee(&self) -> Result<u64, LedgerError>;
}
