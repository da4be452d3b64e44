use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::repository::{RemoveOutcome, RoomRepository};
use crate::room::{CatalogError, Room, RoomDraft};

/// Room listing CRUD. Occupancy transitions never go through here; those
/// belong to the reservation engine.
pub struct CatalogService {
    rooms: Arc<dyn RoomRepository>,
}

impl CatalogService {
    pub fn new(rooms: Arc<dyn RoomRepository>) -> Self {
        Self { rooms }
    }

    pub async fn create_room(&self, owner: &str, draft: RoomDraft) -> Result<Room, CatalogError> {
        draft.validate()?;
        let room = Room::new(owner.to_string(), draft);
        self.rooms.insert(&room).await.map_err(store_err)?;
        info!(room_id = %room.id, owner, "Room listed");
        Ok(room)
    }

    pub async fn list_rooms(&self) -> Result<Vec<Room>, CatalogError> {
        self.rooms.list().await.map_err(store_err)
    }

    pub async fn get_room(&self, id: Uuid) -> Result<Room, CatalogError> {
        self.rooms
            .get(id)
            .await
            .map_err(store_err)?
            .ok_or(CatalogError::NotFound(id))
    }

    pub async fn update_room(
        &self,
        caller: &str,
        id: Uuid,
        draft: RoomDraft,
    ) -> Result<Room, CatalogError> {
        draft.validate()?;
        self.check_owner(caller, id).await?;
        self.rooms
            .update_details(id, &draft)
            .await
            .map_err(store_err)?
            .ok_or(CatalogError::NotFound(id))
    }

    /// Delete a listing. Refused while the room is reserved.
    pub async fn delete_room(&self, caller: &str, id: Uuid) -> Result<Room, CatalogError> {
        self.check_owner(caller, id).await?;
        match self.rooms.remove_if_free(id).await.map_err(store_err)? {
            RemoveOutcome::Removed(room) => {
                info!(room_id = %id, caller, "Room delisted");
                Ok(room)
            }
            RemoveOutcome::Reserved => Err(CatalogError::Booked(id)),
            RemoveOutcome::Missing => Err(CatalogError::NotFound(id)),
        }
    }

    async fn check_owner(&self, caller: &str, id: Uuid) -> Result<(), CatalogError> {
        let room = self.get_room(id).await?;
        if room.owner != caller {
            return Err(CatalogError::NotOwner(id));
        }
        Ok(())
    }
}

fn store_err(e: haven_core::BoxError) -> CatalogError {
    CatalogError::Store(e.to_string())
}
