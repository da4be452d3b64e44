use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haven_catalog::repository::{
    ReleaseOutcome, RemoveOutcome, ReserveOutcome, RoomRepository,
};
use haven_catalog::room::{Room, RoomDraft};
use haven_core::BoxError;
use parking_lot::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::snapshot;

const REGION_FILE: &str = "rooms.json";

/// Snapshot-backed room store. Every write happens under a single lock
/// acquisition and hits the snapshot file before the lock is released, so
/// the conditional operations are atomic per key and the region survives a
/// restart. No method awaits while the lock is held.
pub struct MemoryRoomStore {
    rooms: RwLock<HashMap<Uuid, Room>>,
    region: Option<PathBuf>,
}

impl MemoryRoomStore {
    /// In-memory only; contents die with the process.
    pub fn ephemeral() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            region: None,
        }
    }

    /// Load (or create) the room region under `dir`.
    pub fn open(dir: &Path) -> Result<Self, BoxError> {
        std::fs::create_dir_all(dir)?;
        let region = dir.join(REGION_FILE);
        let rooms: Vec<Room> = snapshot::load(&region)?;
        info!(count = rooms.len(), path = %region.display(), "Room region loaded");
        Ok(Self {
            rooms: RwLock::new(rooms.into_iter().map(|r| (r.id, r)).collect()),
            region: Some(region),
        })
    }

    fn persist(&self, rooms: &HashMap<Uuid, Room>) -> Result<(), BoxError> {
        if let Some(region) = &self.region {
            let items: Vec<&Room> = rooms.values().collect();
            snapshot::save(region, &items)?;
        }
        Ok(())
    }
}

#[async_trait]
impl RoomRepository for MemoryRoomStore {
    async fn insert(&self, room: &Room) -> Result<(), BoxError> {
        let mut rooms = self.rooms.write();
        rooms.insert(room.id, room.clone());
        self.persist(&rooms)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Room>, BoxError> {
        Ok(self.rooms.read().get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Room>, BoxError> {
        let mut rooms: Vec<Room> = self.rooms.read().values().cloned().collect();
        rooms.sort_by_key(|r| r.created_at);
        Ok(rooms)
    }

    async fn update_details(&self, id: Uuid, draft: &RoomDraft) -> Result<Option<Room>, BoxError> {
        let mut rooms = self.rooms.write();
        let Some(room) = rooms.get_mut(&id) else {
            return Ok(None);
        };
        room.name = draft.name.clone();
        room.description = draft.description.clone();
        room.image_url = draft.image_url.clone();
        room.price_per_night = draft.price_per_night;
        let updated = room.clone();
        self.persist(&rooms)?;
        Ok(Some(updated))
    }

    async fn remove_if_free(&self, id: Uuid) -> Result<RemoveOutcome, BoxError> {
        let mut rooms = self.rooms.write();
        match rooms.get(&id) {
            None => return Ok(RemoveOutcome::Missing),
            Some(room) if room.is_reserved => return Ok(RemoveOutcome::Reserved),
            Some(_) => {}
        }
        // Presence was just checked under this same lock.
        let Some(room) = rooms.remove(&id) else {
            return Ok(RemoveOutcome::Missing);
        };
        self.persist(&rooms)?;
        Ok(RemoveOutcome::Removed(room))
    }

    async fn reserve_if_free(
        &self,
        id: Uuid,
        occupant: &str,
        ends_at: DateTime<Utc>,
    ) -> Result<ReserveOutcome, BoxError> {
        let mut rooms = self.rooms.write();
        let Some(room) = rooms.get_mut(&id) else {
            return Ok(ReserveOutcome::Missing);
        };
        if room.is_reserved {
            return Ok(ReserveOutcome::Occupied);
        }
        room.is_reserved = true;
        room.reserved_to = Some(occupant.to_string());
        room.reservation_ends_at = Some(ends_at);
        self.persist(&rooms)?;
        Ok(ReserveOutcome::Reserved)
    }

    async fn release_if_occupied_by(
        &self,
        id: Uuid,
        occupant: &str,
    ) -> Result<ReleaseOutcome, BoxError> {
        let mut rooms = self.rooms.write();
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
        self.persist(&rooms)?;
        Ok(ReleaseOutcome::Released)
    }
}
