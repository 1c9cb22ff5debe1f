use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{
    error::ApiError,
    models::{auth::AdminUser, token::RedemptionClaim},
    services::tokens::TokenService,
    AppState,
};

/// POST /redeem — staff scan endpoint. Accepts any of the claim shapes a
/// scanner may produce; the state machine consumes the token exactly once.
pub async fn redeem_meal(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let claim = RedemptionClaim::from_request(&body).map_err(ApiError::Validation)?;
    let result = TokenService::redeem(&state.db, &claim).await?;
    Ok(Json(json!({
        "message": "Meal verified successfully!",
        "redemption": result,
    })))
}
