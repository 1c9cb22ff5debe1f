use std::collections::HashMap;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    menu::MenuItem,
    order::{
        GuestOrder, OrderItemWithDetails, OrderWithItems, PlaceOrderRequest, PlaceOrderResponse,
    },
    token::{ClaimItem, RedemptionClaim, CLAIM_VERSION},
    user::OwnerKind,
    wallet::{format_paise, AccountRef},
};
use crate::services::{metrics, tokens::TokenService, wallet::WalletService};

pub struct OrderService;

impl OrderService {
    /// Place a guest order. Guests carry no free entitlements — every line
    /// is charged at the item price. The wallet debit, the order rows and
    /// the redemption token are one transaction: a failure anywhere (most
    /// notably an underfunded wallet or an already-booked slot) leaves no
    /// trace of the order.
    pub async fn place_order(
        pool: &PgPool,
        guest_id: Uuid,
        req: &PlaceOrderRequest,
    ) -> ApiResult<PlaceOrderResponse> {
        if req.items.is_empty() {
            return Err(ApiError::Validation(
                "At least one menu item is required.".into(),
            ));
        }
        for line in &req.items {
            if line.quantity <= 0 {
                return Err(ApiError::Validation(
                    "Item quantities must be positive.".into(),
                ));
            }
        }

        let guest: Option<(String,)> = sqlx::query_as("SELECT name FROM guests WHERE id = $1")
            .bind(guest_id)
            .fetch_optional(pool)
            .await?;
        let guest_name = guest
            .map(|(n,)| n)
            .ok_or_else(|| ApiError::NotFound("Guest profile not found.".into()))?;

        let items = Self::load_items(pool, req).await?;

        let mut total_paise = 0i64;
        for line in &req.items {
            let item = &items[&line.menu_item_id];
            total_paise += item.extra_price_paise * i64::from(line.quantity);
        }

        let mut prep_minutes: Vec<i32> = items
            .values()
            .map(|item| item.estimated_prep_minutes)
            .collect();
        prep_minutes.sort_unstable();
        prep_minutes.dedup();
        let prep_text = prep_minutes
            .iter()
            .map(|m| format!("{m} min"))
            .collect::<Vec<_>>()
            .join(", ");

        let meal_date = req.meal_date.unwrap_or_else(|| Utc::now().date_naive());

        let mut tx = pool.begin().await?;

        let new_balance = WalletService::debit(
            &mut tx,
            AccountRef::Guest(guest_id),
            total_paise,
            "Guest meal order",
            None,
        )
        .await?;

        let order = sqlx::query_as::<_, GuestOrder>(
            r#"INSERT INTO guest_orders (guest_id, meal_date, meal_type, estimated_prep_text, amount_paise)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, guest_id, meal_date, meal_type, status, estimated_prep_text,
                         amount_paise, created_at"#,
        )
        .bind(guest_id)
        .bind(meal_date)
        .bind(req.meal_type)
        .bind(&prep_text)
        .bind(total_paise)
        .fetch_one(&mut *tx)
        .await?;

        for line in &req.items {
            sqlx::query(
                "INSERT INTO guest_order_items (order_id, menu_item_id, quantity) VALUES ($1, $2, $3)",
            )
            .bind(order.id)
            .bind(line.menu_item_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        }

        // Guests get their QR with the order confirmation, so the token is
        // minted synchronously inside the same transaction. A token already
        // covering this slot means the guest has a meal booked: reject.
        let claim = RedemptionClaim {
            v: CLAIM_VERSION,
            owner_kind: OwnerKind::Guest,
            owner_id: guest_id,
            owner_name: guest_name,
            meal_date,
            meal_type: req.meal_type,
            items: req
                .items
                .iter()
                .map(|line| {
                    let item = &items[&line.menu_item_id];
                    ClaimItem {
                        id: item.id,
                        name: item.name.clone(),
                        description: item.description.clone(),
                        image_url: item.image_url.clone(),
                    }
                })
                .collect(),
        };
        TokenService::issue_strict(&mut tx, &claim, total_paise).await?;

        tx.commit().await?;
        metrics::ORDERS_COUNTER.with_label_values(&["ok"]).inc();

        let order_items = Self::load_order_items(pool, &[order.id]).await?;
        Ok(PlaceOrderResponse {
            order: OrderWithItems {
                order,
                items: order_items,
            },
            amount: format_paise(total_paise),
            new_balance: format_paise(new_balance),
            qr_data: claim.to_qr_data(),
        })
    }

    /// All orders for a guest, latest first, with item details.
    pub async fn list_orders(pool: &PgPool, guest_id: Uuid) -> ApiResult<Vec<OrderWithItems>> {
        let orders = sqlx::query_as::<_, GuestOrder>(
            r#"SELECT id, guest_id, meal_date, meal_type, status, estimated_prep_text,
                      amount_paise, created_at
               FROM guest_orders
               WHERE guest_id = $1
               ORDER BY created_at DESC"#,
        )
        .bind(guest_id)
        .fetch_all(pool)
        .await?;

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut items_by_order: HashMap<Uuid, Vec<OrderItemWithDetails>> = HashMap::new();
        for item in Self::load_order_items(pool, &order_ids).await? {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = items_by_order.remove(&order.id).unwrap_or_default();
                OrderWithItems { order, items }
            })
            .collect())
    }

    async fn load_items(
        pool: &PgPool,
        req: &PlaceOrderRequest,
    ) -> ApiResult<HashMap<Uuid, MenuItem>> {
        let mut ids: Vec<Uuid> = Vec::new();
        for line in &req.items {
            if !ids.contains(&line.menu_item_id) {
                ids.push(line.menu_item_id);
            }
        }
        let rows = sqlx::query_as::<_, MenuItem>(
            r#"SELECT id, name, description, image_url, estimated_prep_minutes,
                      weekly_limit, monthly_limit, extra_price_paise, created_at, updated_at
               FROM menu_items
               WHERE id = ANY($1)"#,
        )
        .bind(&ids)
        .fetch_all(pool)
        .await?;
        if rows.len() != ids.len() {
            return Err(ApiError::Validation(
                "One or more selected menu items are invalid.".into(),
            ));
        }
        Ok(rows.into_iter().map(|item| (item.id, item)).collect())
    }

    async fn load_order_items(
        pool: &PgPool,
        order_ids: &[Uuid],
    ) -> ApiResult<Vec<OrderItemWithDetails>> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }
        let items = sqlx::query_as::<_, OrderItemWithDetails>(
            r#"SELECT oi.order_id, oi.menu_item_id, oi.quantity,
                      mi.name AS item_name, mi.description, mi.estimated_prep_minutes,
                      mi.extra_price_paise
               FROM guest_order_items oi
               JOIN menu_items mi ON mi.id = oi.menu_item_id
               WHERE oi.order_id = ANY($1)
               ORDER BY mi.name"#,
        )
        .bind(order_ids)
        .fetch_all(pool)
        .await?;
        Ok(items)
    }
}
