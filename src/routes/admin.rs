use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{
        auth::AdminUser,
        menu::{CreateMenuItemRequest, SetWeeklyMenuRequest, UpdateMenuItemRequest},
        user::UserRole,
        wallet::{format_paise, parse_amount, AdminRechargeRequest},
    },
    services::{admin::AdminService, menu::MenuService, wallet::WalletService},
    AppState,
};

/// GET /admin/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Value>, ApiError> {
    let stats = AdminService::dashboard_stats(&state.db).await?;
    Ok(Json(serde_json::to_value(stats).map_err(|e| ApiError::Internal(e.into()))?))
}

/// PUT /admin/weekly-menu — replace a week's menu (super-admin only).
pub async fn set_weekly_menu(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(body): Json<SetWeeklyMenuRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    admin.require_role(UserRole::SuperAdmin)?;
    let count = MenuService::set_week(&state.db, &body).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!(
                "Menu for the week of {} has been set ({count} entries).",
                body.week_start_date
            ),
        })),
    ))
}

/// GET /admin/menu-items
pub async fn list_menu_items(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Value>, ApiError> {
    let items = MenuService::list_items(&state.db).await?;
    Ok(Json(serde_json::to_value(items).map_err(|e| ApiError::Internal(e.into()))?))
}

/// POST /admin/menu-items
pub async fn create_menu_item(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(body): Json<CreateMenuItemRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let item = MenuService::create_item(&state.db, &body).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Thali added successfully!", "item": item })),
    ))
}

/// PUT /admin/menu-items/{id}
pub async fn update_menu_item(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateMenuItemRequest>,
) -> Result<Json<Value>, ApiError> {
    let item = MenuService::update_item(&state.db, id, &body).await?;
    Ok(Json(json!({ "message": "Thali updated.", "item": item })))
}

/// DELETE /admin/menu-items/{id}
pub async fn delete_menu_item(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    MenuService::delete_item(&state.db, id).await?;
    Ok(Json(json!({ "message": "Thali deleted." })))
}

/// POST /admin/wallet/recharge — direct credit to a student or guest wallet.
pub async fn recharge_wallet(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(body): Json<AdminRechargeRequest>,
) -> Result<Json<Value>, ApiError> {
    let account = body.account().map_err(ApiError::Validation)?;
    let amount_paise = parse_amount(&body.amount).map_err(ApiError::Validation)?;
    if amount_paise == 0 {
        return Err(ApiError::Validation("Amount must be positive.".into()));
    }

    let mut conn = state.db.acquire().await?;
    let new_balance = WalletService::credit(
        &mut conn,
        account,
        amount_paise,
        &format!("Wallet recharge by {}", admin.0.name),
        None,
    )
    .await?;
    Ok(Json(json!({
        "message": "Wallet recharged successfully!",
        "new_balance": format_paise(new_balance),
    })))
}

/// GET /admin/users
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Value>, ApiError> {
    let directory = AdminService::list_users(&state.db).await?;
    Ok(Json(serde_json::to_value(directory).map_err(|e| ApiError::Internal(e.into()))?))
}

/// GET /admin/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let user = AdminService::get_user(&state.db, id).await?;
    Ok(Json(serde_json::to_value(user).map_err(|e| ApiError::Internal(e.into()))?))
}

/// DELETE /admin/users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    admin.require_role(UserRole::SuperAdmin)?;
    AdminService::delete_user(&state.db, id).await?;
    Ok(Json(json!({ "message": "User deleted successfully." })))
}
