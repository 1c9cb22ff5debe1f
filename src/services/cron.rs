//! Background jobs: the Saturday-night default-menu sweep and the periodic
//! token backfill that repairs missed best-effort issuance.

use std::sync::Arc;

use chrono::{Datelike, Duration, Local, NaiveDate, Timelike, Utc, Weekday};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::services::tokens::TokenService;

pub struct CronService;

impl CronService {
    /// Assign the default thali (lunch + dinner, all seven days) to every
    /// active student without a selection in the week starting `week_start`.
    /// Returns the number of students covered.
    pub async fn assign_default_selections(
        pool: &PgPool,
        default_thali_id: Uuid,
        week_start: NaiveDate,
    ) -> anyhow::Result<usize> {
        let week_end = week_start + Duration::days(6);

        let students: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM users WHERE role = 'student' AND is_active = TRUE",
        )
        .fetch_all(pool)
        .await?;

        let with_selection: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT user_id FROM weekly_selections WHERE meal_date BETWEEN $1 AND $2",
        )
        .bind(week_start)
        .bind(week_end)
        .fetch_all(pool)
        .await?;

        let without: Vec<Uuid> = students
            .into_iter()
            .filter(|id| !with_selection.contains(id))
            .collect();
        if without.is_empty() {
            info!("All students have made their selections for the week of {week_start}.");
            return Ok(0);
        }

        info!(
            "Assigning the default thali to {} students for the week of {week_start}.",
            without.len()
        );

        for user_id in &without {
            for day in 0..7 {
                let meal_date = week_start + Duration::days(day);
                for meal_type in ["lunch", "dinner"] {
                    let inserted: Option<(Uuid,)> = sqlx::query_as(
                        r#"INSERT INTO weekly_selections
                               (user_id, meal_date, meal_type, menu_item_id, is_default)
                           VALUES ($1, $2, $3::meal_type, $4, TRUE)
                           ON CONFLICT (user_id, meal_date, meal_type) DO NOTHING
                           RETURNING id"#,
                    )
                    .bind(user_id)
                    .bind(meal_date)
                    .bind(meal_type)
                    .bind(default_thali_id)
                    .fetch_optional(pool)
                    .await?;

                    // Default meals consume entitlement like any other
                    // selection; they are never charged.
                    if let Some((selection_id,)) = inserted {
                        sqlx::query(
                            r#"INSERT INTO meal_consumptions
                                   (user_id, menu_item_id, consumption_date, meal_type, selection_id)
                               VALUES ($1, $2, $3, $4::meal_type, $5)"#,
                        )
                        .bind(user_id)
                        .bind(default_thali_id)
                        .bind(meal_date)
                        .bind(meal_type)
                        .bind(selection_id)
                        .execute(pool)
                        .await?;
                    }
                }
            }
        }
        Ok(without.len())
    }
}

/// Spawn the scheduler loop: wakes every minute; runs the token backfill
/// sweep every 15 minutes and the default-menu assignment on Saturday at
/// 23:59 local time (for the week starting the following Monday).
pub fn start(pool: PgPool, config: Arc<Config>) {
    tokio::spawn(async move {
        loop {
            // Sleep until the next minute boundary
            let secs_past = Local::now().second() as u64;
            let sleep_secs = if secs_past == 0 { 60 } else { 60 - secs_past };
            tokio::time::sleep(tokio::time::Duration::from_secs(sleep_secs)).await;

            let now = Local::now();

            if now.minute() % 15 == 0 {
                let today = Utc::now().date_naive();
                match TokenService::backfill_for_date(&pool, today).await {
                    Ok(0) => {}
                    Ok(n) => info!("Token backfill: issued {n} missing token(s) for {today}"),
                    Err(e) => warn!("Token backfill failed: {e}"),
                }
            }

            if now.weekday() == Weekday::Sat && now.hour() == 23 && now.minute() == 59 {
                let Some(default_thali_id) = config.default_thali_id else {
                    warn!("DEFAULT_THALI_ID not configured — skipping default menu assignment");
                    continue;
                };
                let today = now.date_naive();
                let days_until_monday =
                    (7 - today.weekday().num_days_from_monday() as i64) % 7;
                let next_monday = today + Duration::days(days_until_monday.max(1));
                match CronService::assign_default_selections(&pool, default_thali_id, next_monday)
                    .await
                {
                    Ok(n) => info!("Default menu assignment covered {n} student(s)"),
                    Err(e) => warn!("Default menu assignment failed: {e}"),
                }
            }
        }
    });
}
