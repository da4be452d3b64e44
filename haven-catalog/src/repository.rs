use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haven_core::BoxError;
use uuid::Uuid;

use crate::room::{Room, RoomDraft};

/// Result of an atomic reserve attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    Occupied,
    Missing,
}

/// Result of an atomic release attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    OccupantMismatch,
    NotReserved,
    Missing,
}

/// Result of an atomic remove attempt.
#[derive(Debug)]
pub enum RemoveOutcome {
    Removed(Room),
    Reserved,
    Missing,
}

/// Repository contract for room state.
///
/// The conditional operations evaluate their precondition and apply the
/// write under a single atomic step per key; callers rely on this to commit
/// state after an external call without re-taking a long-held lock.
#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn insert(&self, room: &Room) -> Result<(), BoxError>;

    async fn get(&self, id: Uuid) -> Result<Option<Room>, BoxError>;

    async fn list(&self) -> Result<Vec<Room>, BoxError>;

    /// Overwrite the caller-editable fields, leaving occupancy untouched.
    /// Returns the updated room, or `None` when the id is unknown.
    async fn update_details(&self, id: Uuid, draft: &RoomDraft) -> Result<Option<Room>, BoxError>;

    /// Remove the room unless it is currently reserved.
    async fn remove_if_free(&self, id: Uuid) -> Result<RemoveOutcome, BoxError>;

    /// Mark the room reserved iff it is currently free.
    async fn reserve_if_free(
        &self,
        id: Uuid,
        occupant: &str,
        ends_at: DateTime<Utc>,
    ) -> Result<ReserveOutcome, BoxError>;

    /// Clear the occupancy fields iff `occupant` currently holds the room.
    async fn release_if_occupied_by(
        &self,
        id: Uuid,
        occupant: &str,
    ) -> Result<ReleaseOutcome, BoxError>;
}
