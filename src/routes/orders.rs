use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    error::ApiError,
    models::{auth::AuthenticatedGuest, order::PlaceOrderRequest},
    services::orders::OrderService,
    AppState,
};

/// POST /guest/orders — price, debit and book in one transaction; the QR
/// comes back with the confirmation.
pub async fn place_order(
    State(state): State<AppState>,
    guest: AuthenticatedGuest,
    Json(body): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let response = OrderService::place_order(&state.db, guest.guest_id, &body).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Order placed successfully!",
            "order": response,
        })),
    ))
}

/// GET /guest/orders — the guest's orders, latest first.
pub async fn list_orders(
    State(state): State<AppState>,
    guest: AuthenticatedGuest,
) -> Result<Json<Value>, ApiError> {
    let orders = OrderService::list_orders(&state.db, guest.guest_id).await?;
    Ok(Json(json!({
        "count": orders.len(),
        "orders": orders,
    })))
}
