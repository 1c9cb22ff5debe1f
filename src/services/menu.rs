use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::menu::{
    CreateMenuItemRequest, MenuItem, SetWeeklyMenuRequest, UpdateMenuItemRequest, WeeklyMenuEntry,
};
use crate::models::wallet::parse_amount;

const ITEM_COLUMNS: &str = "id, name, description, image_url, estimated_prep_minutes, \
                            weekly_limit, monthly_limit, extra_price_paise, created_at, updated_at";

pub struct MenuService;

impl MenuService {
    /// All menu entries for the week, joined with their items, ordered for
    /// day/meal grouping.
    pub async fn list_week(pool: &PgPool, week_start: NaiveDate) -> ApiResult<Vec<WeeklyMenuEntry>> {
        let entries = sqlx::query_as::<_, WeeklyMenuEntry>(
            r#"SELECT wm.id, wm.week_start_date, wm.day_of_week, wm.meal_type,
                      mi.id AS menu_item_id, mi.name AS item_name, mi.description,
                      mi.image_url, mi.extra_price_paise
               FROM weekly_menus wm
               JOIN menu_items mi ON mi.id = wm.menu_item_id
               WHERE wm.week_start_date = $1
               ORDER BY wm.day_of_week, wm.meal_type, mi.name"#,
        )
        .bind(week_start)
        .fetch_all(pool)
        .await?;
        Ok(entries)
    }

    /// The distinct thalis offered at any point during the week — the
    /// guest-facing menu view.
    pub async fn list_week_items(pool: &PgPool, week_start: NaiveDate) -> ApiResult<Vec<MenuItem>> {
        let items = sqlx::query_as::<_, MenuItem>(
            r#"SELECT DISTINCT ON (mi.id)
                      mi.id, mi.name, mi.description, mi.image_url, mi.estimated_prep_minutes,
                      mi.weekly_limit, mi.monthly_limit, mi.extra_price_paise,
                      mi.created_at, mi.updated_at
               FROM weekly_menus wm
               JOIN menu_items mi ON mi.id = wm.menu_item_id
               WHERE wm.week_start_date = $1
               ORDER BY mi.id"#,
        )
        .bind(week_start)
        .fetch_all(pool)
        .await?;
        Ok(items)
    }

    /// Replace the whole week's menu atomically.
    pub async fn set_week(pool: &PgPool, req: &SetWeeklyMenuRequest) -> ApiResult<usize> {
        if req.menu.is_empty() {
            return Err(ApiError::Validation(
                "Week start date and menu are required.".into(),
            ));
        }
        for slot in &req.menu {
            if !(0..=6).contains(&slot.day_of_week) {
                return Err(ApiError::Validation(format!(
                    "day_of_week must be 0 (Monday) through 6 (Sunday), got {}.",
                    slot.day_of_week
                )));
            }
        }

        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM weekly_menus WHERE week_start_date = $1")
            .bind(req.week_start_date)
            .execute(&mut *tx)
            .await?;
        for slot in &req.menu {
            sqlx::query(
                r#"INSERT INTO weekly_menus (week_start_date, day_of_week, meal_type, menu_item_id)
                   VALUES ($1, $2, $3, $4)
                   ON CONFLICT (week_start_date, day_of_week, meal_type, menu_item_id) DO NOTHING"#,
            )
            .bind(req.week_start_date)
            .bind(slot.day_of_week)
            .bind(slot.meal_type)
            .bind(slot.menu_item_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(req.menu.len())
    }

    pub async fn list_items(pool: &PgPool) -> ApiResult<Vec<MenuItem>> {
        let items = sqlx::query_as::<_, MenuItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM menu_items ORDER BY name"
        ))
        .fetch_all(pool)
        .await?;
        Ok(items)
    }

    pub async fn create_item(pool: &PgPool, req: &CreateMenuItemRequest) -> ApiResult<MenuItem> {
        let price_paise = parse_amount(&req.extra_price).map_err(ApiError::Validation)?;
        if req.weekly_limit < 0 || req.monthly_limit < 0 {
            return Err(ApiError::Validation("Limits must be non-negative.".into()));
        }
        let item = sqlx::query_as::<_, MenuItem>(&format!(
            r#"INSERT INTO menu_items
                   (name, description, image_url, estimated_prep_minutes,
                    weekly_limit, monthly_limit, extra_price_paise)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING {ITEM_COLUMNS}"#
        ))
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.image_url)
        .bind(req.estimated_prep_minutes.unwrap_or(15))
        .bind(req.weekly_limit)
        .bind(req.monthly_limit)
        .bind(price_paise)
        .fetch_one(pool)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => {
                ApiError::Conflict(format!("A thali named '{}' already exists.", req.name))
            }
            other => other,
        })?;
        Ok(item)
    }

    /// Partial update — only price and caps change meaning; identity stays.
    pub async fn update_item(
        pool: &PgPool,
        id: Uuid,
        req: &UpdateMenuItemRequest,
    ) -> ApiResult<MenuItem> {
        let price_paise = req
            .extra_price
            .as_deref()
            .map(parse_amount)
            .transpose()
            .map_err(ApiError::Validation)?;

        let item = sqlx::query_as::<_, MenuItem>(&format!(
            r#"UPDATE menu_items SET
                   name = COALESCE($2, name),
                   description = COALESCE($3, description),
                   image_url = COALESCE($4, image_url),
                   estimated_prep_minutes = COALESCE($5, estimated_prep_minutes),
                   weekly_limit = COALESCE($6, weekly_limit),
                   monthly_limit = COALESCE($7, monthly_limit),
                   extra_price_paise = COALESCE($8, extra_price_paise),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING {ITEM_COLUMNS}"#
        ))
        .bind(id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.image_url)
        .bind(req.estimated_prep_minutes)
        .bind(req.weekly_limit)
        .bind(req.monthly_limit)
        .bind(price_paise)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Menu item not found.".into()))?;
        Ok(item)
    }

    /// Delete an item. References from menus, selections or history surface
    /// as an integrity error rather than cascading data away.
    pub async fn delete_item(pool: &PgPool, id: Uuid) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM menu_items WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| match ApiError::from(e) {
                ApiError::Integrity(_) => ApiError::Integrity(
                    "Cannot delete this thali: it is referenced by menus, selections or history."
                        .into(),
                ),
                other => other,
            })?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("Menu item not found.".into()));
        }
        Ok(())
    }
}
