use axum::{
    extract::{FromRequestParts, State},
    http::request::Parts,
    routing::post,
    Json, Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

pub const GUEST_ROLE: &str = "GUEST";

/// JWT claims for a guest session. `sub` carries the guest's ledger account,
/// which is what payments are verified against and refunds are sent to.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GuestClaims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

impl FromRequestParts<AppState> for GuestClaims {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".to_string()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("expected a bearer token".to_string()))?;

        let data = decode::<GuestClaims>(
            token,
            &DecodingKey::from_secret(state.auth.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| ApiError::Unauthorized(format!("invalid token: {e}")))?;

        if data.claims.role != GUEST_ROLE {
            return Err(ApiError::Unauthorized("wrong role".to_string()));
        }
        Ok(data.claims)
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/auth/guest", post(login_guest))
}

#[derive(Debug, Deserialize)]
struct GuestTokenRequest {
    /// Ledger account to bind the session to; generated when omitted.
    #[serde(default)]
    account: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    account: String,
}

async fn login_guest(
    State(state): State<AppState>,
    Json(req): Json<GuestTokenRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let account = req
        .account
        .unwrap_or_else(|| format!("guest-{}", Uuid::new_v4()));
    let claims = GuestClaims {
        sub: account.clone(),
        role: GUEST_ROLE.to_owned(),
        exp: (Utc::now() + Duration::seconds(state.auth.expiration as i64)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.auth.secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Token encoding failed: {e}")))?;

    Ok(Json(AuthResponse { token, account }))
}
