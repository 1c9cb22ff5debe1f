use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::ApiError,
    models::{
        auth::{AuthenticatedAccount, AuthenticatedUser},
        wallet::{format_paise, parse_amount, CreateRechargeOrderRequest},
    },
    services::{
        entitlement::EntitlementStore,
        payments::PaymentService,
        wallet::WalletService,
    },
    AppState,
};

fn payments_or_unavailable(state: &AppState) -> Result<&PaymentService, ApiError> {
    state
        .payments
        .as_deref()
        .ok_or_else(|| ApiError::ExternalService("Payment gateway is not configured.".into()))
}

/// GET /wallet — balance for the authenticated student or guest.
pub async fn get_wallet(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
) -> Result<Json<Value>, ApiError> {
    let balance = WalletService::balance(&state.db, account.account_ref()).await?;
    Ok(Json(json!({
        "owner_kind": account.owner_kind,
        "balance": format_paise(balance),
    })))
}

/// GET /wallet/transactions — the account's ledger, latest first.
pub async fn list_transactions(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
) -> Result<Json<Value>, ApiError> {
    let txns = WalletService::list_transactions(&state.db, account.account_ref(), 100).await?;
    Ok(Json(json!({ "transactions": txns })))
}

/// GET /usage-stats — per-item consumption counts for the current month.
pub async fn usage_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    let stats =
        EntitlementStore::monthly_stats(&state.db, user.user_id, Utc::now().date_naive()).await?;
    Ok(Json(serde_json::to_value(stats).map_err(|e| ApiError::Internal(e.into()))?))
}

/// POST /wallet/recharge/order — start a gateway-backed recharge.
pub async fn create_recharge_order(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Json(body): Json<CreateRechargeOrderRequest>,
) -> Result<Json<Value>, ApiError> {
    let payments = payments_or_unavailable(&state)?;
    let amount_paise = parse_amount(&body.amount).map_err(ApiError::Validation)?;
    if amount_paise == 0 {
        return Err(ApiError::Validation("Amount must be positive.".into()));
    }
    let order = payments
        .create_recharge(&state.db, account.account_ref(), amount_paise)
        .await?;
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub gateway_order_id: String,
    pub payment_id: String,
    pub signature: String,
}

/// POST /payments/confirm — checkout-callback capture. The client-supplied
/// signature is verified before anything is trusted.
pub async fn confirm_payment(
    State(state): State<AppState>,
    _account: AuthenticatedAccount,
    Json(body): Json<ConfirmPaymentRequest>,
) -> Result<Json<Value>, ApiError> {
    let payments = payments_or_unavailable(&state)?;
    if !payments.verify_checkout_signature(
        &body.gateway_order_id,
        &body.payment_id,
        &body.signature,
    ) {
        return Err(ApiError::Unauthorized("Payment verification failed.".into()));
    }
    let new_balance =
        PaymentService::apply_capture(&state.db, &body.gateway_order_id, &body.payment_id)
            .await?;
    match new_balance {
        Some(balance) => Ok(Json(json!({
            "message": "Payment verified and wallet recharged.",
            "new_balance": format_paise(balance),
        }))),
        None => Ok(Json(json!({
            "message": "Payment already processed.",
        }))),
    }
}

/// POST /payments/webhook — gateway-delivered events, HMAC-verified against
/// the raw body.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payments = payments_or_unavailable(&state)?;
    let signature = headers
        .get("x-razorpay-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing webhook signature.".into()))?;
    payments.handle_webhook(&state.db, &body, signature).await?;
    Ok(Json(json!({ "success": true })))
}
