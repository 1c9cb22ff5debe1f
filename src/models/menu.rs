use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "meal_type", rename_all = "snake_case")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
}

impl std::fmt::Display for MealType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MealType::Breakfast => write!(f, "breakfast"),
            MealType::Lunch => write!(f, "lunch"),
            MealType::Dinner => write!(f, "dinner"),
        }
    }
}

/// A complete thali offering. Caps and price are admin-editable; the row
/// identity is immutable and FK-protected while history references it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MenuItem {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub estimated_prep_minutes: i32,
    pub weekly_limit: i32,
    pub monthly_limit: i32,
    pub extra_price_paise: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One orderable (week, day, meal, item) association, joined with the item
/// columns the clients render.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WeeklyMenuEntry {
    pub id: Uuid,
    pub week_start_date: NaiveDate,
    pub day_of_week: i16,
    pub meal_type: MealType,
    pub menu_item_id: Uuid,
    pub item_name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub extra_price_paise: i64,
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct CreateMenuItemRequest {
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub estimated_prep_minutes: Option<i32>,
    pub weekly_limit: i32,
    pub monthly_limit: i32,
    /// Decimal string, e.g. "45.00".
    pub extra_price: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMenuItemRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub estimated_prep_minutes: Option<i32>,
    pub weekly_limit: Option<i32>,
    pub monthly_limit: Option<i32>,
    pub extra_price: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WeeklyMenuSlot {
    /// 0 = Monday .. 6 = Sunday.
    pub day_of_week: i16,
    pub meal_type: MealType,
    pub menu_item_id: Uuid,
}

/// Body for PUT /admin/weekly-menu — replaces the whole week atomically.
#[derive(Debug, Deserialize)]
pub struct SetWeeklyMenuRequest {
    pub week_start_date: NaiveDate,
    pub menu: Vec<WeeklyMenuSlot>,
}

/// Query params for GET /menus.
#[derive(Debug, Deserialize)]
pub struct MenuWeekQuery {
    /// Monday of the desired week (ISO 8601 date, e.g. "2026-08-03").
    pub week_start: NaiveDate,
}
