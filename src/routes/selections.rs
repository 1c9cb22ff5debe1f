use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::ApiError,
    models::{
        auth::AuthenticatedUser,
        selection::{MealQrQuery, PreviewSelectionsRequest, SubmitSelectionsRequest},
    },
    services::{selections::SelectionService, tokens::TokenService},
    AppState,
};

/// POST /selections — submit or edit the week's picks.
pub async fn submit(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<SubmitSelectionsRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let outcome = SelectionService::submit(
        &state.db,
        state.config.limit_policy,
        user.user_id,
        &body,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Your weekly menu has been saved successfully!",
            "result": outcome,
        })),
    ))
}

/// POST /selections/preview — dry-run pricing, no writes.
pub async fn preview(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<PreviewSelectionsRequest>,
) -> Result<Json<Value>, ApiError> {
    let outcome = SelectionService::preview(
        &state.db,
        state.config.limit_policy,
        user.user_id,
        &body.selections,
    )
    .await?;
    Ok(Json(serde_json::to_value(outcome).map_err(|e| ApiError::Internal(e.into()))?))
}

/// GET /selections — the current week's picks.
pub async fn get_current_week(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    let week = SelectionService::list_current_week(&state.db, user.user_id).await?;
    Ok(Json(serde_json::to_value(week).map_err(|e| ApiError::Internal(e.into()))?))
}

/// GET /selections/qr?meal_date=&meal_type= — mint (idempotently) and return
/// the redemption token for one slot.
pub async fn generate_meal_qr(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<MealQrQuery>,
) -> Result<Json<Value>, ApiError> {
    let token = TokenService::issue_for_selection(
        &state.db,
        user.user_id,
        params.meal_date,
        params.meal_type,
    )
    .await?;

    if !token.is_valid {
        return Err(ApiError::Conflict(
            "This meal has already been redeemed.".into(),
        ));
    }

    let claim: crate::models::token::RedemptionClaim =
        serde_json::from_value(token.payload.clone()).map_err(|e| ApiError::Internal(e.into()))?;
    Ok(Json(json!({
        "claim": token.payload,
        "qr_data": claim.to_qr_data(),
    })))
}
