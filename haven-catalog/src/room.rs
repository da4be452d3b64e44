use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest accepted room name.
pub const MAX_NAME_LEN: usize = 120;
/// Longest accepted description or image reference.
pub const MAX_TEXT_LEN: usize = 4096;

/// A bookable unit with a nightly price and an occupancy window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Price per night in the ledger's smallest unit.
    pub price_per_night: u64,
    pub is_reserved: bool,
    /// Ledger account of the current occupant, while reserved.
    pub reserved_to: Option<String>,
    pub reservation_ends_at: Option<DateTime<Utc>>,
    /// Ledger account of the listing owner.
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Create a free room from a validated draft.
    pub fn new(owner: String, draft: RoomDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: draft.name,
            description: draft.description,
            image_url: draft.image_url,
            price_per_night: draft.price_per_night,
            is_reserved: false,
            reserved_to: None,
            reservation_ends_at: None,
            owner,
            created_at: Utc::now(),
        }
    }

    /// `is_reserved` holds exactly when both occupancy fields are set.
    pub fn occupancy_consistent(&self) -> bool {
        self.reserved_to.is_some() == self.is_reserved
            && self.reservation_ends_at.is_some() == self.is_reserved
    }
}

/// Caller-supplied room fields, validated before they touch the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDraft {
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price_per_night: u64,
}

impl RoomDraft {
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::InvalidPayload(
                "room name must not be empty".to_string(),
            ));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(CatalogError::InvalidPayload(format!(
                "room name exceeds {} bytes",
                MAX_NAME_LEN
            )));
        }
        for (field, value) in [
            ("description", &self.description),
            ("image_url", &self.image_url),
        ] {
            if let Some(text) = value {
                if text.len() > MAX_TEXT_LEN {
                    return Err(CatalogError::InvalidPayload(format!(
                        "{} exceeds {} bytes",
                        field, MAX_TEXT_LEN
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Room not found: {0}")]
    NotFound(Uuid),

    #[error("Caller does not own room {0}")]
    NotOwner(Uuid),

    #[error("Invalid room payload: {0}")]
    InvalidPayload(String),

    #[error("Room {0} is currently reserved")]
    Booked(Uuid),

    #[error("Store error: {0}")]
    Store(String),
}
