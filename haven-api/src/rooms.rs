use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use haven_catalog::room::{Room, RoomDraft};
use uuid::Uuid;

use crate::{auth::GuestClaims, error::ApiError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/rooms", get(list_rooms).post(create_room))
        .route(
            "/v1/rooms/{id}",
            get(get_room).put(update_room).delete(delete_room),
        )
}

async fn list_rooms(State(state): State<AppState>) -> Result<Json<Vec<Room>>, ApiError> {
    Ok(Json(state.catalog.list_rooms().await?))
}

async fn get_room(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(state.catalog.get_room(id).await?))
}

async fn create_room(
    State(state): State<AppState>,
    claims: GuestClaims,
    Json(draft): Json<RoomDraft>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(state.catalog.create_room(&claims.sub, draft).await?))
}

async fn update_room(
    State(state): State<AppState>,
    claims: GuestClaims,
    Path(id): Path<Uuid>,
    Json(draft): Json<RoomDraft>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(
        state.catalog.update_room(&claims.sub, id, draft).await?,
    ))
}

async fn delete_room(
    State(state): State<AppState>,
    claims: GuestClaims,
    Path(id): Path<Uuid>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(state.catalog.delete_room(&claims.sub, id).await?))
}
