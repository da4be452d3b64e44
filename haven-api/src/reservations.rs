use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use haven_order::models::ReservationOrder;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{auth::GuestClaims, error::ApiError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/rooms/{id}/orders", post(create_order))
        .route("/v1/rooms/{id}/orders/complete", post(complete_order))
        .route("/v1/rooms/{id}/checkout", post(checkout))
        .route("/v1/reservation-fee", get(reservation_fee))
        .route("/v1/orders/settled", get(settled_orders))
}

#[derive(Debug, Deserialize)]
struct CreateOrderRequest {
    nights: u32,
}

async fn create_order(
    State(state): State<AppState>,
    claims: GuestClaims,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<ReservationOrder>, ApiError> {
    Ok(Json(
        state
            .engine
            .create_order(id, &claims.sub, req.nights)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct CompleteOrderRequest {
    nights: u32,
    /// Ledger block claimed to contain the payment.
    ledger_block: u64,
    /// Correlation id returned by order creation.
    memo: u64,
}

async fn complete_order(
    State(state): State<AppState>,
    claims: GuestClaims,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteOrderRequest>,
) -> Result<Json<ReservationOrder>, ApiError> {
    Ok(Json(
        state
            .engine
            .complete_order(id, &claims.sub, req.nights, req.ledger_block, req.memo)
            .await?,
    ))
}

#[derive(Debug, Serialize)]
struct CheckoutResponse {
    status: &'static str,
    /// Block index of the holding-fee refund transfer.
    refund_block: u64,
}

async fn checkout(
    State(state): State<AppState>,
    claims: GuestClaims,
    Path(id): Path<Uuid>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let refund_block = state.engine.end_reservation(id, &claims.sub).await?;
    Ok(Json(CheckoutResponse {
        status: "PAYMENT_COMPLETED",
        refund_block,
    }))
}

#[derive(Debug, Serialize)]
struct FeeResponse {
    fee: u64,
}

async fn reservation_fee(State(state): State<AppState>) -> Json<FeeResponse> {
    Json(FeeResponse {
        fee: state.engine.reservation_fee(),
    })
}

async fn settled_orders(
    State(state): State<AppState>,
    claims: GuestClaims,
) -> Result<Json<Vec<ReservationOrder>>, ApiError> {
    Ok(Json(state.engine.settled_orders(&claims.sub).await?))
}
