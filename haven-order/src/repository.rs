use async_trait::async_trait;
use haven_core::BoxError;

use crate::models::ReservationOrder;

/// Repository contract for the two order regions: pending (keyed by memo)
/// and settled (keyed by payer).
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert into the pending region. Returns `false` on a memo collision
    /// so the caller can draw a fresh one.
    async fn insert_pending(&self, order: &ReservationOrder) -> Result<bool, BoxError>;

    async fn get_pending(&self, memo: u64) -> Result<Option<ReservationOrder>, BoxError>;

    /// Atomic remove-if-present. Completion and timeout expiry both funnel
    /// through this call, and exactly one of them observes `Some`.
    async fn remove_pending(&self, memo: u64) -> Result<Option<ReservationOrder>, BoxError>;

    /// Append to the payer's settled history. Settled orders are an audit
    /// trail and are never mutated.
    async fn insert_settled(&self, order: &ReservationOrder) -> Result<(), BoxError>;

    async fn settled_for_payer(&self, payer: &str) -> Result<Vec<ReservationOrder>, BoxError>;
}
