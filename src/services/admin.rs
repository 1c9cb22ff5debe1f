use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    menu::MealType,
    user::{Guest, User},
    wallet::format_paise,
};

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub breakfast_count: i64,
    pub lunch_count: i64,
    pub dinner_count: i64,
    pub total_guest_revenue: String,
}

#[derive(Debug, Serialize)]
pub struct UserDirectory {
    pub students: Vec<User>,
    pub guests: Vec<Guest>,
    pub admins: Vec<User>,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, room_no, role, wallet_balance_paise, \
                            is_active, created_at, updated_at";
const GUEST_COLUMNS: &str =
    "id, name, email, wallet_balance_paise, otp_hash, otp_expires_at, created_at, updated_at";

pub struct AdminService;

impl AdminService {
    /// Today's redemption counts per meal type plus guest revenue from
    /// scanned guest tokens.
    pub async fn dashboard_stats(pool: &PgPool) -> ApiResult<DashboardStats> {
        let today_start = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight valid")
            .and_utc();
        let tomorrow_start = today_start + Duration::days(1);

        let meal_counts: Vec<(MealType, i64)> = sqlx::query_as(
            r#"SELECT meal_type, COUNT(*)
               FROM redemption_tokens
               WHERE scanned_at >= $1 AND scanned_at < $2
               GROUP BY meal_type"#,
        )
        .bind(today_start)
        .bind(tomorrow_start)
        .fetch_all(pool)
        .await?;

        let guest_revenue: Option<i64> = sqlx::query_scalar(
            r#"SELECT SUM(total_cost_paise)
               FROM redemption_tokens
               WHERE owner_kind = 'guest' AND scanned_at >= $1 AND scanned_at < $2"#,
        )
        .bind(today_start)
        .bind(tomorrow_start)
        .fetch_one(pool)
        .await?;

        let mut stats = DashboardStats {
            breakfast_count: 0,
            lunch_count: 0,
            dinner_count: 0,
            total_guest_revenue: format_paise(guest_revenue.unwrap_or(0)),
        };
        for (meal_type, count) in meal_counts {
            match meal_type {
                MealType::Breakfast => stats.breakfast_count = count,
                MealType::Lunch => stats.lunch_count = count,
                MealType::Dinner => stats.dinner_count = count,
            }
        }
        Ok(stats)
    }

    pub async fn list_users(pool: &PgPool) -> ApiResult<UserDirectory> {
        let students = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = 'student' ORDER BY name"
        ))
        .fetch_all(pool)
        .await?;

        let admins = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role IN ('admin', 'super_admin') ORDER BY name"
        ))
        .fetch_all(pool)
        .await?;

        let guests = sqlx::query_as::<_, Guest>(&format!(
            "SELECT {GUEST_COLUMNS} FROM guests ORDER BY name"
        ))
        .fetch_all(pool)
        .await?;

        Ok(UserDirectory {
            students,
            guests,
            admins,
        })
    }

    pub async fn get_user(pool: &PgPool, user_id: Uuid) -> ApiResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found.".into()))
    }

    /// Hard-delete a user. Selection or redemption history blocks the delete
    /// through FK constraints; deactivation is the supported alternative.
    pub async fn delete_user(pool: &PgPool, user_id: Uuid) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(|e| match ApiError::from(e) {
                ApiError::Integrity(_) => ApiError::Integrity(
                    "Cannot delete user: they have associated meal history. Deactivate instead."
                        .into(),
                ),
                other => other,
            })?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("User not found.".into()));
        }
        Ok(())
    }
}
