use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use haven_catalog::repository::{ReleaseOutcome, ReserveOutcome, RoomRepository};
use haven_core::ledger::{Block, LedgerClient, LedgerError, Transfer};
use haven_core::BoxError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::expiry::ExpiryScheduler;
use crate::models::ReservationOrder;
use crate::repository::OrderRepository;

/// Real seconds one reserved night spans in production.
pub const DEFAULT_NIGHT_SECONDS: u64 = 86_400;
/// How long an unpaid pending order is kept before it is discarded.
pub const DEFAULT_GRACE_PERIOD_SECONDS: u64 = 900;
/// Memo used on holding-fee refund transfers.
pub const REFUND_MEMO: u64 = 0;
/// Attempts at drawing an unused correlation memo before giving up.
const MEMO_RETRY_LIMIT: u32 = 8;

/// Engine configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Refundable deposit added to every order, in the ledger's smallest
    /// unit. Operations that need it fail while it is unset.
    pub holding_fee: Option<u64>,
    /// Ledger account payments must be addressed to.
    pub service_account: String,
    /// Unpaid pending orders are discarded after this delay.
    pub grace_period: Duration,
    /// Real seconds per reserved night. Test configurations compress this,
    /// down to zero.
    pub night_seconds: u64,
}

impl EngineConfig {
    pub fn new(holding_fee: Option<u64>, service_account: impl Into<String>) -> Self {
        Self {
            holding_fee,
            service_account: service_account.into(),
            grace_period: Duration::from_secs(DEFAULT_GRACE_PERIOD_SECONDS),
            night_seconds: DEFAULT_NIGHT_SECONDS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Room {0} is booked")]
    Booked(Uuid),

    #[error("Room {0} is not booked")]
    NotBooked(Uuid),

    #[error("Invalid order payload: {0}")]
    InvalidPayload(String),

    #[error("Ledger transfer failed: {0}")]
    PaymentFailed(String),

    #[error("Store error: {0}")]
    Store(String),
}

/// Orchestrates the reservation order lifecycle: pending-order creation,
/// payment verification against the external ledger, room state transitions,
/// and the holding-fee refund at checkout.
pub struct ReservationEngine {
    rooms: Arc<dyn RoomRepository>,
    orders: Arc<dyn OrderRepository>,
    ledger: Arc<dyn LedgerClient>,
    expiry: ExpiryScheduler,
    config: EngineConfig,
}

impl ReservationEngine {
    /// Wire the engine and spawn its expiry worker. Requires a running
    /// tokio runtime.
    pub fn new(
        rooms: Arc<dyn RoomRepository>,
        orders: Arc<dyn OrderRepository>,
        ledger: Arc<dyn LedgerClient>,
        config: EngineConfig,
    ) -> Self {
        let expiry = ExpiryScheduler::start(orders.clone());
        Self {
            rooms,
            orders,
            ledger,
            expiry,
            config,
        }
    }

    /// The configured holding fee, or 0 while none is set.
    pub fn reservation_fee(&self) -> u64 {
        self.config.holding_fee.unwrap_or(0)
    }

    /// Settled history for one payer.
    pub async fn settled_orders(
        &self,
        payer: &str,
    ) -> Result<Vec<ReservationOrder>, ReservationError> {
        self.orders.settled_for_payer(payer).await.map_err(store_err)
    }

    /// Open a pending, time-bounded payment obligation against a free room.
    pub async fn create_order(
        &self,
        room_id: Uuid,
        payer: &str,
        nights: u32,
    ) -> Result<ReservationOrder, ReservationError> {
        if nights == 0 {
            return Err(ReservationError::InvalidPayload(
                "an order must cover at least one night".to_string(),
            ));
        }
        let fee = self.holding_fee()?;
        let room = self
            .rooms
            .get(room_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| ReservationError::NotFound(format!("room {room_id}")))?;
        if room.is_reserved {
            return Err(ReservationError::Booked(room_id));
        }

        let amount = (nights as u64)
            .checked_mul(room.price_per_night)
            .and_then(|v| v.checked_add(fee))
            .ok_or_else(|| {
                ReservationError::InvalidPayload("order amount overflows".to_string())
            })?;

        let mut order =
            ReservationOrder::new(rand::random(), room_id, payer.to_string(), nights, amount);
        let mut attempts = 1;
        while !self.orders.insert_pending(&order).await.map_err(store_err)? {
            if attempts >= MEMO_RETRY_LIMIT {
                return Err(ReservationError::Store(
                    "could not allocate an unused memo".to_string(),
                ));
            }
            order.memo = rand::random();
            attempts += 1;
        }

        self.expiry.schedule(order.memo, self.config.grace_period);
        info!(
            memo = order.memo,
            room_id = %room_id,
            payer,
            amount,
            "Reservation order created"
        );
        Ok(order)
    }

    /// Verify a claimed ledger payment and, exactly once, settle the order
    /// and reserve the room.
    pub async fn complete_order(
        &self,
        room_id: Uuid,
        payer: &str,
        nights: u32,
        ledger_block: u64,
        memo: u64,
    ) -> Result<ReservationOrder, ReservationError> {
        self.holding_fee()?;
        self.rooms
            .get(room_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| ReservationError::NotFound(format!("room {room_id}")))?;

        let pending = self
            .orders
            .get_pending(memo)
            .await
            .map_err(store_err)?
            .ok_or_else(|| ReservationError::NotFound(format!("pending order {memo}")))?;
        if pending.payer != payer || pending.room_id != room_id || pending.nights != nights {
            return Err(ReservationError::NotFound(format!("pending order {memo}")));
        }

        // The only suspension point: no store lock is held while the ledger
        // answers, and nothing has been mutated yet.
        self.verify_payment(ledger_block, &pending).await?;

        // Linearization point. Completion and timeout expiry race on this
        // removal; whichever observes the entry proceeds, the other fails.
        let Some(pending) = self.orders.remove_pending(memo).await.map_err(store_err)? else {
            warn!(memo, "Payment verified but the pending order was already gone");
            return Err(ReservationError::NotFound(format!("pending order {memo}")));
        };

        let completed = pending.complete(ledger_block);
        self.orders
            .insert_settled(&completed)
            .await
            .map_err(store_err)?;

        let span = (nights as u64)
            .checked_mul(self.config.night_seconds)
            .and_then(|s| i64::try_from(s).ok())
            .ok_or_else(|| {
                ReservationError::InvalidPayload("reservation span overflows".to_string())
            })?;
        let ends_at = Utc::now() + chrono::Duration::seconds(span);

        match self
            .rooms
            .reserve_if_free(room_id, payer, ends_at)
            .await
            .map_err(store_err)?
        {
            ReserveOutcome::Reserved => {
                info!(
                    memo,
                    room_id = %room_id,
                    payer,
                    block = ledger_block,
                    "Reservation completed"
                );
                Ok(completed)
            }
            ReserveOutcome::Occupied => {
                // The payment was real and stays settled for the audit
                // trail; the room was taken while we were verifying.
                warn!(memo, room_id = %room_id, "Order settled but the room was reserved concurrently");
                Err(ReservationError::Booked(room_id))
            }
            ReserveOutcome::Missing => {
                Err(ReservationError::NotFound(format!("room {room_id}")))
            }
        }
    }

    /// End an elapsed reservation: refund the holding fee to the occupant,
    /// then free the room. Returns the refund's block index.
    pub async fn end_reservation(
        &self,
        room_id: Uuid,
        caller: &str,
    ) -> Result<u64, ReservationError> {
        let fee = self.holding_fee()?;
        let room = self
            .rooms
            .get(room_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| ReservationError::NotFound(format!("room {room_id}")))?;
        if !room.is_reserved {
            return Err(ReservationError::NotBooked(room_id));
        }
        let (Some(occupant), Some(ends_at)) =
            (room.reserved_to.as_deref(), room.reservation_ends_at)
        else {
            return Err(ReservationError::NotBooked(room_id));
        };
        if occupant != caller || Utc::now() < ends_at {
            // Cannot end early, and cannot end someone else's stay.
            return Err(ReservationError::Booked(room_id));
        }

        let transfer_fee = self
            .ledger
            .transfer_fee()
            .await
            .map_err(|e| ReservationError::PaymentFailed(e.to_string()))?;
        let refund = fee
            .checked_sub(transfer_fee)
            .filter(|r| *r > 0)
            .ok_or_else(|| {
                ReservationError::PaymentFailed(format!(
                    "transfer fee {transfer_fee} consumes the holding fee {fee}"
                ))
            })?;
        let block = self
            .ledger
            .transfer(caller, refund, transfer_fee, REFUND_MEMO)
            .await
            .map_err(|e| ReservationError::PaymentFailed(e.to_string()))?;

        match self
            .rooms
            .release_if_occupied_by(room_id, caller)
            .await
            .map_err(store_err)?
        {
            ReleaseOutcome::Released => {
                info!(room_id = %room_id, caller, refund, block, "Reservation ended, holding fee refunded");
                Ok(block)
            }
            other => {
                // The refund went out but the room moved under us while the
                // transfer was in flight. Report rather than overwrite.
                warn!(room_id = %room_id, ?other, "Release lost a race after the refund transfer");
                Err(ReservationError::NotBooked(room_id))
            }
        }
    }

    fn holding_fee(&self) -> Result<u64, ReservationError> {
        self.config
            .holding_fee
            .ok_or_else(|| ReservationError::NotFound("holding fee is not configured".to_string()))
    }

    /// Check that `block` carries a transfer matching the pending order:
    /// same memo, sent by the payer to the service account, for the exact
    /// amount frozen at creation.
    async fn verify_payment(
        &self,
        block: u64,
        pending: &ReservationOrder,
    ) -> Result<(), ReservationError> {
        let blocks = self
            .ledger
            .query_blocks(block, 1)
            .await
            .map_err(|e| ReservationError::NotFound(format!("payment not verified: {e}")))?;
        let matched = blocks
            .iter()
            .filter(|b| b.index == block)
            .filter_map(|b| b.transfer.as_ref())
            .any(|t| {
                t.memo == pending.memo
                    && t.from == pending.payer
                    && t.to == self.config.service_account
                    && t.amount == pending.amount
            });
        if matched {
            Ok(())
        } else {
            Err(ReservationError::NotFound(format!(
                "no matching transfer in block {block}"
            )))
        }
    }
}

fn store_err(e: BoxError) -> ReservationError {
    ReservationError::Store(e.to_string())
}

/// Transfers addressed to this account are rejected; lets tests exercise
/// refund failure without reaching a real ledger.
pub const MOCK_REJECTED_ACCOUNT: &str = "mock-rejected-account";

/// In-process ledger double: an append-only chain of blocks.
pub struct MockLedger {
    fee: u64,
    blocks: tokio::sync::Mutex<Vec<Block>>,
}

impl MockLedger {
    pub fn new(fee: u64) -> Self {
        Self {
            fee,
            blocks: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Record a deposit as if the payer had transferred out-of-band.
    /// Returns the block index to cite on completion.
    pub async fn deposit(&self, from: &str, to: &str, amount: u64, memo: u64) -> u64 {
        self.append(from, to, amount, self.fee, memo).await
    }

    /// Number of blocks on the chain so far.
    pub async fn chain_len(&self) -> usize {
        self.blocks.lock().await.len()
    }

    async fn append(&self, from: &str, to: &str, amount: u64, fee: u64, memo: u64) -> u64 {
        let mut chain = self.blocks.lock().await;
        let index = chain.len() as u64;
        chain.push(Block {
            index,
            timestamp: Utc::now(),
            transfer: Some(Transfer {
                from: from.to_string(),
                to: to.to_string(),
                amount,
                fee,
                memo,
            }),
        });
        index
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn transfer(
        &self,
        to: &str,
        amount: u64,
        fee: u64,
        memo: u64,
    ) -> Result<u64, LedgerError> {
        if to == MOCK_REJECTED_ACCOUNT {
            return Err(LedgerError::Rejected("simulated ledger outage".to_string()));
        }
        Ok(self.append("mock-service", to, amount, fee, memo).await)
    }

    async fn query_blocks(&self, start: u64, length: u64) -> Result<Vec<Block>, LedgerError> {
        let chain = self.blocks.lock().await;
        Ok(chain
            .iter()
            .filter(|b| b.index >= start && b.index < start.saturating_add(length))
            .cloned()
            .collect())
    }

    async fn transfer_fee(&self) -> Result<u64, LedgerError> {
        Ok(self.fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;
    use chrono::{DateTime, Utc};
    use haven_catalog::repository::RemoveOutcome;
    use haven_catalog::room::{Room, RoomDraft};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    // In-crate memory repositories. The production implementations live in
    // haven-store; these mirror their per-key atomicity for engine tests.

    #[derive(Default)]
    struct MemRooms {
        rooms: Mutex<HashMap<Uuid, Room>>,
    }

    #[async_trait]
    impl RoomRepository for MemRooms {
        async fn insert(&self, room: &Room) -> Result<(), BoxError> {
            self.rooms.lock().await.insert(room.id, room.clone());
            Ok(())
        }

        async fn get(&self, id: Uuid) -> Result<Option<Room>, BoxError> {
            Ok(self.rooms.lock().await.get(&id).cloned())
        }

        async fn list(&self) -> Result<Vec<Room>, BoxError> {
            Ok(self.rooms.lock().await.values().cloned().collect())
        }

        async fn update_details(
            &self,
            id: Uuid,
            draft: &RoomDraft,
        ) -> Result<Option<Room>, BoxError> {
            let mut rooms = self.rooms.lock().await;
            let Some(room) = rooms.get_mut(&id) else {
                return Ok(None);
            };
            room.name = draft.name.clone();
            room.description = draft.description.clone();
            room.image_url = draft.image_url.clone();
            room.price_per_night = draft.price_per_night;
            Ok(Some(room.clone()))
        }

        async fn remove_if_free(&self, id: Uuid) -> Result<RemoveOutcome, BoxError> {
            let mut rooms = self.rooms.lock().await;
            match rooms.get(&id) {
                None => Ok(RemoveOutcome::Missing),
                Some(r) if r.is_reserved => Ok(RemoveOutcome::Reserved),
                Some(_) => {
                    let removed = rooms.remove(&id);
                    Ok(removed.map(RemoveOutcome::Removed).unwrap_or(RemoveOutcome::Missing))
                }
            }
        }

        async fn reserve_if_free(
            &self,
            id: Uuid,
            occupant: &str,
            ends_at: DateTime<Utc>,
        ) -> Result<ReserveOutcome, BoxError> {
            let mut rooms = self.rooms.lock().await;
            let Some(room) = rooms.get_mut(&id) else {
                return Ok(ReserveOutcome::Missing);
            };
            if room.is_reserved {
                return Ok(ReserveOutcome::Occupied);
            }
            room.is_reserved = true;
            room.reserved_to = Some(occupant.to_string());
            room.reservation_ends_at = Some(ends_at);
            Ok(ReserveOutcome::Reserved)
        }

        async fn release_if_occupied_by(
            &self,
            id: Uuid,
            occupant: &str,
        ) -> Result<ReleaseOutcome, BoxError> {
            let mut rooms = self.rooms.lock().await;
            let Some(room) = rooms.get_mut(&id) else {
                return Ok(ReleaseOutcome::Missing);
            };
            if !room.is_reserved {
                return Ok(ReleaseOutcome::NotReserved);
            }
            if room.reserved_to.as_deref() != Some(occupant) {
                return Ok(ReleaseOutcome::OccupantMismatch);
            }
            room.is_reserved = false;
            room.reserved_to = None;
            room.reservation_ends_at = None;
            Ok(ReleaseOutcome::Released)
        }
    }

    #[derive(Default)]
    struct MemOrders {
        pending: Mutex<HashMap<u64, ReservationOrder>>,
        settled: Mutex<HashMap<String, Vec<ReservationOrder>>>,
    }

    #[async_trait]
    impl OrderRepository for MemOrders {
        async fn insert_pending(&self, order: &ReservationOrder) -> Result<bool, BoxError> {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&order.memo) {
                return Ok(false);
            }
            pending.insert(order.memo, order.clone());
            Ok(true)
        }

        async fn get_pending(&self, memo: u64) -> Result<Option<ReservationOrder>, BoxError> {
            Ok(self.pending.lock().await.get(&memo).cloned())
        }

        async fn remove_pending(&self, memo: u64) -> Result<Option<ReservationOrder>, BoxError> {
            Ok(self.pending.lock().await.remove(&memo))
        }

        async fn insert_settled(&self, order: &ReservationOrder) -> Result<(), BoxError> {
            self.settled
                .lock()
                .await
                .entry(order.payer.clone())
                .or_default()
                .push(order.clone());
            Ok(())
        }

        async fn settled_for_payer(
            &self,
            payer: &str,
        ) -> Result<Vec<ReservationOrder>, BoxError> {
            Ok(self
                .settled
                .lock()
                .await
                .get(payer)
                .cloned()
                .unwrap_or_default())
        }
    }

    struct Fixture {
        rooms: Arc<MemRooms>,
        orders: Arc<MemOrders>,
        ledger: Arc<MockLedger>,
        engine: ReservationEngine,
        room_id: Uuid,
    }

    const SERVICE: &str = "haven-service";
    const HOLDING_FEE: u64 = 5;
    const NIGHTLY: u64 = 10;
    const LEDGER_FEE: u64 = 1;

    async fn fixture(night_seconds: u64, grace: Duration) -> Fixture {
        fixture_with_fee(Some(HOLDING_FEE), LEDGER_FEE, night_seconds, grace).await
    }

    async fn fixture_with_fee(
        holding_fee: Option<u64>,
        ledger_fee: u64,
        night_seconds: u64,
        grace: Duration,
    ) -> Fixture {
        let rooms = Arc::new(MemRooms::default());
        let orders = Arc::new(MemOrders::default());
        let ledger = Arc::new(MockLedger::new(ledger_fee));

        let room = Room::new(
            "owner".to_string(),
            RoomDraft {
                name: "Sea View".to_string(),
                description: None,
                image_url: None,
                price_per_night: NIGHTLY,
            },
        );
        let room_id = room.id;
        rooms.insert(&room).await.unwrap();

        let config = EngineConfig {
            holding_fee,
            service_account: SERVICE.to_string(),
            grace_period: grace,
            night_seconds,
        };
        let engine = ReservationEngine::new(
            rooms.clone(),
            orders.clone(),
            ledger.clone(),
            config,
        );
        Fixture {
            rooms,
            orders,
            ledger,
            engine,
            room_id,
        }
    }

    async fn room(f: &Fixture) -> Room {
        f.rooms.get(f.room_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_create_order_freezes_amount() {
        let f = fixture(60, Duration::from_secs(300)).await;

        let order = f.engine.create_order(f.room_id, "alice", 3).await.unwrap();
        assert_eq!(order.amount, 3 * NIGHTLY + HOLDING_FEE);
        assert_eq!(order.status, OrderStatus::PaymentPending);
        assert_eq!(order.payer, "alice");
        assert!(f.orders.get_pending(order.memo).await.unwrap().is_some());

        // Creating the obligation does not touch the room.
        let room = room(&f).await;
        assert!(!room.is_reserved);
        assert!(room.occupancy_consistent());
    }

    #[tokio::test]
    async fn test_create_order_rejects_zero_nights() {
        let f = fixture(60, Duration::from_secs(300)).await;
        let err = f.engine.create_order(f.room_id, "alice", 0).await.unwrap_err();
        assert!(matches!(err, ReservationError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_create_order_unknown_room() {
        let f = fixture(60, Duration::from_secs(300)).await;
        let err = f
            .engine
            .create_order(Uuid::new_v4(), "alice", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_order_requires_holding_fee() {
        let f = fixture_with_fee(None, LEDGER_FEE, 60, Duration::from_secs(300)).await;
        assert_eq!(f.engine.reservation_fee(), 0);
        let err = f.engine.create_order(f.room_id, "alice", 1).await.unwrap_err();
        assert!(matches!(err, ReservationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_order_on_reserved_room_is_booked() {
        let f = fixture(60, Duration::from_secs(300)).await;
        f.rooms
            .reserve_if_free(f.room_id, "bob", Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();

        let err = f.engine.create_order(f.room_id, "alice", 2).await.unwrap_err();
        assert!(matches!(err, ReservationError::Booked(_)));
        // No obligation was opened.
        assert!(f.orders.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_complete_order_reserves_room() {
        let f = fixture(60, Duration::from_secs(300)).await;
        let order = f.engine.create_order(f.room_id, "alice", 3).await.unwrap();

        let block = f
            .ledger
            .deposit("alice", SERVICE, order.amount, order.memo)
            .await;
        let before = Utc::now();
        let completed = f
            .engine
            .complete_order(f.room_id, "alice", 3, block, order.memo)
            .await
            .unwrap();

        assert_eq!(completed.status, OrderStatus::Completed);
        assert_eq!(completed.paid_at_block, Some(block));
        assert!(f.orders.get_pending(order.memo).await.unwrap().is_none());
        let settled = f.engine.settled_orders("alice").await.unwrap();
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].memo, order.memo);

        let room = room(&f).await;
        assert!(room.is_reserved);
        assert!(room.occupancy_consistent());
        assert_eq!(room.reserved_to.as_deref(), Some("alice"));
        let span = (room.reservation_ends_at.unwrap() - before).num_seconds();
        // 3 nights at 60 real seconds each.
        assert!((179..=181).contains(&span), "unexpected span {span}");
    }

    #[tokio::test]
    async fn test_complete_order_rejects_unverified_payment() {
        let f = fixture(60, Duration::from_secs(300)).await;
        let order = f.engine.create_order(f.room_id, "alice", 3).await.unwrap();

        // Cited block does not exist.
        let err = f
            .engine
            .complete_order(f.room_id, "alice", 3, 99, order.memo)
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::NotFound(_)));

        // Transfer exists but the amount is short by one unit.
        let short = f
            .ledger
            .deposit("alice", SERVICE, order.amount - 1, order.memo)
            .await;
        let err = f
            .engine
            .complete_order(f.room_id, "alice", 3, short, order.memo)
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::NotFound(_)));

        // Right amount, wrong memo.
        let wrong_memo = f
            .ledger
            .deposit("alice", SERVICE, order.amount, order.memo.wrapping_add(1))
            .await;
        let err = f
            .engine
            .complete_order(f.room_id, "alice", 3, wrong_memo, order.memo)
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::NotFound(_)));

        // Right everything, wrong sender.
        let wrong_sender = f
            .ledger
            .deposit("mallory", SERVICE, order.amount, order.memo)
            .await;
        let err = f
            .engine
            .complete_order(f.room_id, "alice", 3, wrong_sender, order.memo)
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::NotFound(_)));

        // Nothing was mutated by any of the failed attempts.
        assert!(f.orders.get_pending(order.memo).await.unwrap().is_some());
        assert!(!room(&f).await.is_reserved);
    }

    #[tokio::test]
    async fn test_complete_order_after_expiry_is_not_found() {
        let f = fixture(60, Duration::from_secs(300)).await;
        let order = f.engine.create_order(f.room_id, "alice", 2).await.unwrap();
        let block = f
            .ledger
            .deposit("alice", SERVICE, order.amount, order.memo)
            .await;

        // Simulate the expiry having already removed the obligation.
        f.orders.remove_pending(order.memo).await.unwrap();

        let err = f
            .engine
            .complete_order(f.room_id, "alice", 2, block, order.memo)
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::NotFound(_)));
        assert!(!room(&f).await.is_reserved);
    }

    #[tokio::test]
    async fn test_completion_and_expiry_race_has_one_winner() {
        let f = fixture(60, Duration::from_secs(300)).await;
        let order = f.engine.create_order(f.room_id, "alice", 1).await.unwrap();
        let block = f
            .ledger
            .deposit("alice", SERVICE, order.amount, order.memo)
            .await;

        let orders = f.orders.clone();
        let memo = order.memo;
        let expiry = tokio::spawn(async move { orders.remove_pending(memo).await.unwrap() });
        let completion = f
            .engine
            .complete_order(f.room_id, "alice", 1, block, order.memo)
            .await;
        let expired = expiry.await.unwrap();

        // Exactly one side observed the pending entry.
        assert!(
            completion.is_ok() ^ expired.is_some(),
            "completion: {:?}, expiry took entry: {}",
            completion.as_ref().map(|o| o.memo),
            expired.is_some()
        );
        let settled = f.engine.settled_orders("alice").await.unwrap();
        assert_eq!(settled.len(), usize::from(completion.is_ok()));
        assert_eq!(room(&f).await.is_reserved, completion.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpaid_order_expires_after_grace_period() {
        let f = fixture(60, Duration::from_millis(50)).await;
        let order = f.engine.create_order(f.room_id, "alice", 2).await.unwrap();
        let block = f
            .ledger
            .deposit("alice", SERVICE, order.amount, order.memo)
            .await;

        // Let the grace period elapse and the expiry worker drain.
        for _ in 0..50 {
            if f.orders.get_pending(order.memo).await.unwrap().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(f.orders.get_pending(order.memo).await.unwrap().is_none());

        let err = f
            .engine
            .complete_order(f.room_id, "alice", 2, block, order.memo)
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_end_reservation_preconditions() {
        let f = fixture(3600, Duration::from_secs(300)).await;

        // Free room cannot be ended.
        let err = f.engine.end_reservation(f.room_id, "alice").await.unwrap_err();
        assert!(matches!(err, ReservationError::NotBooked(_)));

        let order = f.engine.create_order(f.room_id, "alice", 1).await.unwrap();
        let block = f
            .ledger
            .deposit("alice", SERVICE, order.amount, order.memo)
            .await;
        f.engine
            .complete_order(f.room_id, "alice", 1, block, order.memo)
            .await
            .unwrap();

        // Deadline is an hour away: the occupant cannot check out early...
        let err = f.engine.end_reservation(f.room_id, "alice").await.unwrap_err();
        assert!(matches!(err, ReservationError::Booked(_)));
        // ...and a stranger can never check out at all.
        let err = f.engine.end_reservation(f.room_id, "mallory").await.unwrap_err();
        assert!(matches!(err, ReservationError::Booked(_)));

        let room = room(&f).await;
        assert!(room.is_reserved);
        assert!(room.occupancy_consistent());
    }

    #[tokio::test]
    async fn test_end_reservation_refunds_and_frees() {
        // night_seconds = 0 makes the reservation end immediately.
        let f = fixture(0, Duration::from_secs(300)).await;
        let order = f.engine.create_order(f.room_id, "alice", 1).await.unwrap();
        let block = f
            .ledger
            .deposit("alice", SERVICE, order.amount, order.memo)
            .await;
        f.engine
            .complete_order(f.room_id, "alice", 1, block, order.memo)
            .await
            .unwrap();

        let chain_before = f.ledger.chain_len().await;
        let refund_block = f.engine.end_reservation(f.room_id, "alice").await.unwrap();

        // Exactly one refund transfer, for the fee minus the ledger's cut.
        assert_eq!(f.ledger.chain_len().await, chain_before + 1);
        let refund = f
            .ledger
            .query_blocks(refund_block, 1)
            .await
            .unwrap()
            .remove(0)
            .transfer
            .unwrap();
        assert_eq!(refund.to, "alice");
        assert_eq!(refund.amount, HOLDING_FEE - LEDGER_FEE);
        assert_eq!(refund.memo, REFUND_MEMO);

        let room = room(&f).await;
        assert!(!room.is_reserved);
        assert!(room.reserved_to.is_none());
        assert!(room.reservation_ends_at.is_none());
        assert!(room.occupancy_consistent());
    }

    #[tokio::test]
    async fn test_end_reservation_ledger_failure_keeps_room() {
        let f = fixture(0, Duration::from_secs(300)).await;
        let payer = MOCK_REJECTED_ACCOUNT;
        let order = f.engine.create_order(f.room_id, payer, 1).await.unwrap();
        let block = f
            .ledger
            .deposit(payer, SERVICE, order.amount, order.memo)
            .await;
        f.engine
            .complete_order(f.room_id, payer, 1, block, order.memo)
            .await
            .unwrap();

        let err = f.engine.end_reservation(f.room_id, payer).await.unwrap_err();
        assert!(matches!(err, ReservationError::PaymentFailed(_)));

        // The reservation stays active; the caller may retry.
        let room = room(&f).await;
        assert!(room.is_reserved);
        assert_eq!(room.reserved_to.as_deref(), Some(payer));
    }

    #[tokio::test]
    async fn test_end_reservation_fails_when_transfer_fee_eats_deposit() {
        let f = fixture_with_fee(Some(HOLDING_FEE), HOLDING_FEE, 0, Duration::from_secs(300)).await;
        let order = f.engine.create_order(f.room_id, "alice", 1).await.unwrap();
        let block = f
            .ledger
            .deposit("alice", SERVICE, order.amount, order.memo)
            .await;
        f.engine
            .complete_order(f.room_id, "alice", 1, block, order.memo)
            .await
            .unwrap();

        let err = f.engine.end_reservation(f.room_id, "alice").await.unwrap_err();
        assert!(matches!(err, ReservationError::PaymentFailed(_)));
        assert!(room(&f).await.is_reserved);
    }
}
