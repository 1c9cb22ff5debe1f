use std::collections::HashMap;

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::Serialize;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::menu::MealType;
use crate::services::pricing::Usage;

/// Monday–Sunday week containing `today`.
pub fn week_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    (start, start + Duration::days(6))
}

/// Calendar month containing `today`.
pub fn month_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = today.with_day(1).expect("day 1 always valid");
    let last = first + Months::new(1) - Duration::days(1);
    (first, last)
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UsageStat {
    pub menu_item_id: Uuid,
    pub name: String,
    pub count: i64,
}

/// Structured consumption ledger. One row per finalized student selection;
/// entitlement counts are indexed aggregates over it, never reconstructed
/// from stored QR payloads.
pub struct EntitlementStore;

impl EntitlementStore {
    /// Per-item consumption counts for the weekly and monthly windows
    /// containing `today`. Both windows are relative to submission time,
    /// not to the meal date being priced.
    pub async fn usage_counts<'e, E: PgExecutor<'e>>(
        exec: E,
        user_id: Uuid,
        item_ids: &[Uuid],
        today: NaiveDate,
    ) -> ApiResult<HashMap<Uuid, Usage>> {
        if item_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let (week_start, week_end) = week_window(today);
        let (month_start, month_end) = month_window(today);

        let rows: Vec<(Uuid, i64, i64)> = sqlx::query_as(
            r#"SELECT menu_item_id,
                      COUNT(*) FILTER (WHERE consumption_date BETWEEN $3 AND $4) AS weekly,
                      COUNT(*) FILTER (WHERE consumption_date BETWEEN $5 AND $6) AS monthly
               FROM meal_consumptions
               WHERE user_id = $1
                 AND menu_item_id = ANY($2)
                 AND (consumption_date BETWEEN $3 AND $4
                      OR consumption_date BETWEEN $5 AND $6)
               GROUP BY menu_item_id"#,
        )
        .bind(user_id)
        .bind(item_ids)
        .bind(week_start)
        .bind(week_end)
        .bind(month_start)
        .bind(month_end)
        .fetch_all(exec)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, weekly, monthly)| (id, Usage { weekly, monthly }))
            .collect())
    }

    /// Record one finalized selection in the ledger.
    pub async fn record(
        conn: &mut PgConnection,
        user_id: Uuid,
        menu_item_id: Uuid,
        consumption_date: NaiveDate,
        meal_type: MealType,
        selection_id: Uuid,
        charged_paise: i64,
    ) -> ApiResult<()> {
        sqlx::query(
            r#"INSERT INTO meal_consumptions
                   (user_id, menu_item_id, consumption_date, meal_type, selection_id, charged_paise)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(user_id)
        .bind(menu_item_id)
        .bind(consumption_date)
        .bind(meal_type)
        .bind(selection_id)
        .bind(charged_paise)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Drop the ledger rows behind the given selections (used when a slot is
    /// re-picked: the replacement is re-recorded after pricing).
    pub async fn forget_selections(
        conn: &mut PgConnection,
        selection_ids: &[Uuid],
    ) -> ApiResult<()> {
        if selection_ids.is_empty() {
            return Ok(());
        }
        sqlx::query("DELETE FROM meal_consumptions WHERE selection_id = ANY($1)")
            .bind(selection_ids)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Per-item counts for the calendar month containing `today` — the
    /// student dashboard's usage view.
    pub async fn monthly_stats<'e, E: PgExecutor<'e>>(
        exec: E,
        user_id: Uuid,
        today: NaiveDate,
    ) -> ApiResult<Vec<UsageStat>> {
        let (month_start, month_end) = month_window(today);
        let stats = sqlx::query_as::<_, UsageStat>(
            r#"SELECT mc.menu_item_id, mi.name, COUNT(*) AS count
               FROM meal_consumptions mc
               JOIN menu_items mi ON mi.id = mc.menu_item_id
               WHERE mc.user_id = $1 AND mc.consumption_date BETWEEN $2 AND $3
               GROUP BY mc.menu_item_id, mi.name
               ORDER BY count DESC, mi.name"#,
        )
        .bind(user_id)
        .bind(month_start)
        .bind(month_end)
        .fetch_all(exec)
        .await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_window_is_monday_to_sunday() {
        // 2026-08-06 is a Thursday.
        let (start, end) = week_window(NaiveDate::from_ymd_opt(2026, 8, 6).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 8, 3).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 8, 9).unwrap());

        // A Monday is its own week start.
        let (start, _) = week_window(NaiveDate::from_ymd_opt(2026, 8, 3).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 8, 3).unwrap());

        // A Sunday belongs to the week that started six days earlier.
        let (start, end) = week_window(NaiveDate::from_ymd_opt(2026, 8, 9).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 8, 3).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 8, 9).unwrap());
    }

    #[test]
    fn month_window_covers_the_calendar_month() {
        let (start, end) = month_window(NaiveDate::from_ymd_opt(2026, 8, 15).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 8, 31).unwrap());

        // February in a leap year.
        let (start, end) = month_window(NaiveDate::from_ymd_opt(2028, 2, 10).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2028, 2, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2028, 2, 29).unwrap());

        // Week spanning a month boundary stays intact.
        let (wstart, wend) = week_window(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap());
        assert_eq!(wstart, NaiveDate::from_ymd_opt(2026, 8, 31).unwrap());
        assert_eq!(wend, NaiveDate::from_ymd_opt(2026, 9, 6).unwrap());
    }
}
