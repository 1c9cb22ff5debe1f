use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    error::ApiError,
    models::{
        auth::{AuthenticatedGuest, AuthenticatedUser},
        menu::{MenuWeekQuery, WeeklyMenuEntry},
    },
    services::menu::MenuService,
    AppState,
};

const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Group week entries into { day name -> { meal type -> [items] } } for the
/// student-facing menu view.
fn group_by_day(entries: Vec<WeeklyMenuEntry>) -> Value {
    let mut days: Map<String, Value> = Map::new();
    for entry in entries {
        let day = DAY_NAMES
            .get(entry.day_of_week as usize)
            .copied()
            .unwrap_or("Unknown");
        let meal = entry.meal_type.to_string();
        let item = json!({
            "id": entry.menu_item_id,
            "name": entry.item_name,
            "description": entry.description,
            "image_url": entry.image_url,
            "extra_price_paise": entry.extra_price_paise,
        });
        days.entry(day.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .expect("day entry is an object")
            .entry(meal)
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .expect("meal entry is an array")
            .push(item);
    }
    Value::Object(days)
}

/// GET /menus?week_start=YYYY-MM-DD — authenticated students and staff.
pub async fn get_week(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(params): Query<MenuWeekQuery>,
) -> Result<Json<Value>, ApiError> {
    let entries = MenuService::list_week(&state.db, params.week_start).await?;
    if entries.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No menu found for the week starting {}.",
            params.week_start
        )));
    }
    Ok(Json(group_by_day(entries)))
}

/// GET /guest/menu?week_start=YYYY-MM-DD — the distinct thalis offered that
/// week; guests order items, not slots.
pub async fn guest_week(
    State(state): State<AppState>,
    _guest: AuthenticatedGuest,
    Query(params): Query<MenuWeekQuery>,
) -> Result<Json<Value>, ApiError> {
    let items = MenuService::list_week_items(&state.db, params.week_start).await?;
    if items.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No menu found for the week starting {}.",
            params.week_start
        )));
    }
    Ok(Json(serde_json::to_value(items).map_err(|e| ApiError::Internal(e.into()))?))
}
