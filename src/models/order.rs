use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::menu::MealType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
pub enum OrderStatus {
    Confirmed,
    Preparing,
    Served,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GuestOrder {
    pub id: Uuid,
    pub guest_id: Uuid,
    pub meal_date: NaiveDate,
    pub meal_type: MealType,
    pub status: OrderStatus,
    pub estimated_prep_text: Option<String>,
    pub amount_paise: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLineInput {
    pub menu_item_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    /// Defaults to today when omitted.
    pub meal_date: Option<NaiveDate>,
    pub meal_type: MealType,
    pub items: Vec<OrderLineInput>,
}

/// One order line joined with the item columns guests render.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderItemWithDetails {
    pub order_id: Uuid,
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub item_name: String,
    pub description: Option<String>,
    pub estimated_prep_minutes: i32,
    pub extra_price_paise: i64,
}

#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: GuestOrder,
    pub items: Vec<OrderItemWithDetails>,
}

#[derive(Debug, Serialize)]
pub struct PlaceOrderResponse {
    pub order: OrderWithItems,
    pub amount: String,
    pub new_balance: String,
    /// Scannable proof for the ordered meal.
    pub qr_data: String,
}
