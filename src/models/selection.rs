use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::menu::MealType;

/// A (meal_date, meal_type) pair — the unit of "one selection per slot".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    pub meal_date: NaiveDate,
    pub meal_type: MealType,
}

/// One requested pick within a weekly submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionInput {
    pub meal_date: NaiveDate,
    pub meal_type: MealType,
    pub menu_item_id: Uuid,
}

impl SelectionInput {
    pub fn slot(&self) -> Slot {
        Slot {
            meal_date: self.meal_date,
            meal_type: self.meal_type,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitSelectionsRequest {
    pub week_start_date: NaiveDate,
    pub selections: Vec<SelectionInput>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewSelectionsRequest {
    pub selections: Vec<SelectionInput>,
}

/// A selection joined with the item columns students render in their cart.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SelectionWithItem {
    pub id: Uuid,
    pub meal_date: NaiveDate,
    pub meal_type: MealType,
    pub is_default: bool,
    pub menu_item_id: Uuid,
    pub item_name: String,
    pub image_url: Option<String>,
    pub extra_price_paise: i64,
}

/// Outcome of a weekly submission.
#[derive(Debug, Serialize)]
pub struct SubmitOutcome {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub total_extra_charge: String,
    pub charged_items: Vec<ChargedItem>,
}

/// One pick that exceeded its free limit and was charged.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChargedItem {
    pub menu_item_id: Uuid,
    pub name: String,
    pub meal_date: NaiveDate,
    pub meal_type: MealType,
    pub price: String,
}

/// Query params for GET /selections/qr.
#[derive(Debug, Deserialize)]
pub struct MealQrQuery {
    pub meal_date: NaiveDate,
    pub meal_type: MealType,
}
