use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status in the lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PaymentPending,
    Completed,
}

/// A priced obligation tied to a room and a payer, progressing from pending
/// to settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationOrder {
    /// Correlation id; used verbatim as the ledger transfer memo.
    pub memo: u64,
    pub room_id: Uuid,
    /// Ledger account the payment must come from.
    pub payer: String,
    pub nights: u32,
    /// Total due, frozen at creation: nights x nightly price + holding fee.
    /// Never recomputed afterwards.
    pub amount: u64,
    pub status: OrderStatus,
    /// Ledger block carrying the verified payment, once completed.
    pub paid_at_block: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl ReservationOrder {
    pub fn new(memo: u64, room_id: Uuid, payer: String, nights: u32, amount: u64) -> Self {
        Self {
            memo,
            room_id,
            payer,
            nights,
            amount,
            status: OrderStatus::PaymentPending,
            paid_at_block: None,
            created_at: Utc::now(),
        }
    }

    /// Transition to `Completed` with the confirming block index.
    pub fn complete(mut self, block: u64) -> Self {
        self.status = OrderStatus::Completed;
        self.paid_at_block = Some(block);
        self
    }
}
