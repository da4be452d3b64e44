use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use haven_core::BoxError;
use haven_order::models::ReservationOrder;
use haven_order::repository::OrderRepository;
use parking_lot::RwLock;
use tracing::info;

use crate::snapshot;

const PENDING_FILE: &str = "pending_orders.json";
const SETTLED_FILE: &str = "settled_orders.json";

/// Snapshot-backed order store covering both regions: pending orders keyed
/// by memo and settled orders keyed by payer. The regions are independent
/// and hold independent locks; `remove_pending` is the atomic
/// remove-if-present the engine's race rule is built on.
pub struct MemoryOrderStore {
    pending: RwLock<HashMap<u64, ReservationOrder>>,
    settled: RwLock<HashMap<String, Vec<ReservationOrder>>>,
    pending_region: Option<PathBuf>,
    settled_region: Option<PathBuf>,
}

impl MemoryOrderStore {
    /// In-memory only; contents die with the process.
    pub fn ephemeral() -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            settled: RwLock::new(HashMap::new()),
            pending_region: None,
            settled_region: None,
        }
    }

    /// Load (or create) both order regions under `dir`.
    pub fn open(dir: &Path) -> Result<Self, BoxError> {
        std::fs::create_dir_all(dir)?;
        let pending_region = dir.join(PENDING_FILE);
        let settled_region = dir.join(SETTLED_FILE);

        let pending: Vec<ReservationOrder> = snapshot::load(&pending_region)?;
        let settled: Vec<ReservationOrder> = snapshot::load(&settled_region)?;
        info!(
            pending = pending.len(),
            settled = settled.len(),
            dir = %dir.display(),
            "Order regions loaded"
        );

        let mut by_payer: HashMap<String, Vec<ReservationOrder>> = HashMap::new();
        for order in settled {
            by_payer.entry(order.payer.clone()).or_default().push(order);
        }

        Ok(Self {
            pending: RwLock::new(pending.into_iter().map(|o| (o.memo, o)).collect()),
            settled: RwLock::new(by_payer),
            pending_region: Some(pending_region),
            settled_region: Some(settled_region),
        })
    }

    fn persist_pending(&self, pending: &HashMap<u64, ReservationOrder>) -> Result<(), BoxError> {
        if let Some(region) = &self.pending_region {
            let items: Vec<&ReservationOrder> = pending.values().collect();
            snapshot::save(region, &items)?;
        }
        Ok(())
    }

    fn persist_settled(
        &self,
        settled: &HashMap<String, Vec<ReservationOrder>>,
    ) -> Result<(), BoxError> {
        if let Some(region) = &self.settled_region {
            let items: Vec<&ReservationOrder> = settled.values().flatten().collect();
            snapshot::save(region, &items)?;
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderStore {
    async fn insert_pending(&self, order: &ReservationOrder) -> Result<bool, BoxError> {
        let mut pending = self.pending.write();
        if pending.contains_key(&order.memo) {
            return Ok(false);
        }
        pending.insert(order.memo, order.clone());
        self.persist_pending(&pending)?;
        Ok(true)
    }

    async fn get_pending(&self, memo: u64) -> Result<Option<ReservationOrder>, BoxError> {
        Ok(self.pending.read().get(&memo).cloned())
    }

    async fn remove_pending(&self, memo: u64) -> Result<Option<ReservationOrder>, BoxError> {
        let mut pending = self.pending.write();
        let removed = pending.remove(&memo);
        if removed.is_some() {
            self.persist_pending(&pending)?;
        }
        Ok(removed)
    }

    async fn insert_settled(&self, order: &ReservationOrder) -> Result<(), BoxError> {
        let mut settled = self.settled.write();
        settled
            .entry(order.payer.clone())
            .or_default()
            .push(order.clone());
        self.persist_settled(&settled)
    }

    async fn settled_for_payer(&self, payer: &str) -> Result<Vec<ReservationOrder>, BoxError> {
        Ok(self
            .settled
            .read()
            .get(payer)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_order::models::OrderStatus;
    use std::sync::Arc;
    use uuid::Uuid;

    fn order(memo: u64, payer: &str) -> ReservationOrder {
        ReservationOrder::new(memo, Uuid::new_v4(), payer.to_string(), 2, 25)
    }

    #[tokio::test]
    async fn test_pending_insert_detects_memo_collision() {
        let store = MemoryOrderStore::ephemeral();
        assert!(store.insert_pending(&order(7, "alice")).await.unwrap());
        assert!(!store.insert_pending(&order(7, "bob")).await.unwrap());
        // The original entry is untouched.
        let stored = store.get_pending(7).await.unwrap().unwrap();
        assert_eq!(stored.payer, "alice");
    }

    #[tokio::test]
    async fn test_remove_pending_yields_some_exactly_once() {
        let store = Arc::new(MemoryOrderStore::ephemeral());
        store.insert_pending(&order(7, "alice")).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.remove_pending(7).await.unwrap().is_some()
            }));
        }
        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(store.get_pending(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settled_history_accumulates_per_payer() {
        let store = MemoryOrderStore::ephemeral();
        store
            .insert_settled(&order(1, "alice").complete(10))
            .await
            .unwrap();
        store
            .insert_settled(&order(2, "alice").complete(11))
            .await
            .unwrap();
        store
            .insert_settled(&order(3, "bob").complete(12))
            .await
            .unwrap();

        let alice = store.settled_for_payer("alice").await.unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice.iter().all(|o| o.status == OrderStatus::Completed));
        assert_eq!(store.settled_for_payer("bob").await.unwrap().len(), 1);
        assert!(store.settled_for_payer("carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_regions_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = MemoryOrderStore::open(dir.path()).unwrap();
            store.insert_pending(&order(7, "alice")).await.unwrap();
            store
                .insert_settled(&order(8, "alice").complete(42))
                .await
                .unwrap();
        }

        let reopened = MemoryOrderStore::open(dir.path()).unwrap();
        let pending = reopened.get_pending(7).await.unwrap().unwrap();
        assert_eq!(pending.status, OrderStatus::PaymentPending);
        let settled = reopened.settled_for_payer("alice").await.unwrap();
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].paid_at_block, Some(42));
    }
}
