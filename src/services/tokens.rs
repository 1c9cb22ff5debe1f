use chrono::{NaiveDate, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    menu::MealType,
    token::{ClaimItem, RedemptionClaim, RedemptionResult, RedemptionToken, CLAIM_VERSION},
    user::OwnerKind,
};
use crate::services::metrics;

const TOKEN_COLUMNS: &str = "id, owner_kind, owner_id, meal_date, meal_type, payload, \
                             total_cost_paise, is_valid, issued_at, scanned_at";

pub struct TokenService;

impl TokenService {
    /// Issue a redemption token for a claim. Idempotent: the unique
    /// constraint on (owner_kind, owner_id, meal_date, meal_type) turns a
    /// repeated or concurrent issuance into a fetch of the existing row,
    /// whatever its validity state — a redeemed slot is never re-issued.
    pub async fn issue(
        conn: &mut PgConnection,
        claim: &RedemptionClaim,
        total_cost_paise: i64,
    ) -> ApiResult<RedemptionToken> {
        let payload = serde_json::to_value(claim)
            .map_err(|e| ApiError::Internal(e.into()))?;

        let inserted = sqlx::query_as::<_, RedemptionToken>(&format!(
            r#"INSERT INTO redemption_tokens
                   (owner_kind, owner_id, meal_date, meal_type, payload, total_cost_paise)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (owner_kind, owner_id, meal_date, meal_type) DO NOTHING
               RETURNING {TOKEN_COLUMNS}"#
        ))
        .bind(claim.owner_kind)
        .bind(claim.owner_id)
        .bind(claim.meal_date)
        .bind(claim.meal_type)
        .bind(&payload)
        .bind(total_cost_paise)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(token) = inserted {
            metrics::TOKENS_ISSUED_COUNTER
                .with_label_values(&[&claim.owner_kind.to_string()])
                .inc();
            return Ok(token);
        }

        Self::find(
            &mut *conn,
            claim.owner_kind,
            claim.owner_id,
            claim.meal_date,
            claim.meal_type,
        )
        .await?
        .ok_or_else(|| {
            ApiError::Internal(anyhow::anyhow!(
                "token insert conflicted but no existing row was found"
            ))
        })
    }

    /// Like `issue`, but a pre-existing token for the slot is an error
    /// instead of a fetch — used where a second booking must be rejected
    /// (guest orders). The unique constraint maps the race to `Conflict`.
    pub async fn issue_strict(
        conn: &mut PgConnection,
        claim: &RedemptionClaim,
        total_cost_paise: i64,
    ) -> ApiResult<RedemptionToken> {
        let payload = serde_json::to_value(claim)
            .map_err(|e| ApiError::Internal(e.into()))?;

        let token = sqlx::query_as::<_, RedemptionToken>(&format!(
            r#"INSERT INTO redemption_tokens
                   (owner_kind, owner_id, meal_date, meal_type, payload, total_cost_paise)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {TOKEN_COLUMNS}"#
        ))
        .bind(claim.owner_kind)
        .bind(claim.owner_id)
        .bind(claim.meal_date)
        .bind(claim.meal_type)
        .bind(&payload)
        .bind(total_cost_paise)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::Conflict(format!(
                "A meal is already booked for {} on {}.",
                claim.meal_type, claim.meal_date
            )),
            other => other,
        })?;

        metrics::TOKENS_ISSUED_COUNTER
            .with_label_values(&[&claim.owner_kind.to_string()])
            .inc();
        Ok(token)
    }

    pub async fn find<'e, E: PgExecutor<'e>>(
        exec: E,
        owner_kind: OwnerKind,
        owner_id: Uuid,
        meal_date: NaiveDate,
        meal_type: MealType,
    ) -> ApiResult<Option<RedemptionToken>> {
        let token = sqlx::query_as::<_, RedemptionToken>(&format!(
            r#"SELECT {TOKEN_COLUMNS}
               FROM redemption_tokens
               WHERE owner_kind = $1 AND owner_id = $2 AND meal_date = $3 AND meal_type = $4"#
        ))
        .bind(owner_kind)
        .bind(owner_id)
        .bind(meal_date)
        .bind(meal_type)
        .fetch_optional(exec)
        .await?;
        Ok(token)
    }

    /// Consume a token: VALID -(scan)-> REDEEMED, terminal. The flip is one
    /// conditional UPDATE filtered on `is_valid`, so of two concurrent scans
    /// exactly one wins; the loser sees an already-redeemed token.
    pub async fn redeem(pool: &PgPool, claim: &RedemptionClaim) -> ApiResult<RedemptionResult> {
        let redeemed = sqlx::query_as::<_, RedemptionToken>(&format!(
            r#"UPDATE redemption_tokens
               SET is_valid = FALSE, scanned_at = NOW()
               WHERE owner_kind = $1 AND owner_id = $2
                 AND meal_date = $3 AND meal_type = $4
                 AND is_valid = TRUE
               RETURNING {TOKEN_COLUMNS}"#
        ))
        .bind(claim.owner_kind)
        .bind(claim.owner_id)
        .bind(claim.meal_date)
        .bind(claim.meal_type)
        .fetch_optional(pool)
        .await?;

        let meal_label = claim.meal_type.to_string();
        match redeemed {
            Some(token) => {
                metrics::REDEMPTIONS_COUNTER
                    .with_label_values(&[&meal_label, "ok"])
                    .inc();
                Ok(RedemptionResult {
                    token_id: token.id,
                    scanned_at: token.scanned_at.unwrap_or_else(Utc::now),
                    claim: token.payload,
                })
            }
            None => {
                metrics::REDEMPTIONS_COUNTER
                    .with_label_values(&[&meal_label, "rejected"])
                    .inc();
                let existing = Self::find(
                    pool,
                    claim.owner_kind,
                    claim.owner_id,
                    claim.meal_date,
                    claim.meal_type,
                )
                .await?;
                match existing {
                    Some(_) => Err(ApiError::Conflict(
                        "This meal has already been redeemed.".into(),
                    )),
                    None => Err(ApiError::NotFound(
                        "No valid meal token found for this claim.".into(),
                    )),
                }
            }
        }
    }

    /// Issue the token backing a student's selection for one slot. Used by
    /// the on-demand QR endpoint, the post-submit spawn and the daily
    /// backfill sweep — all three are safe to race thanks to `issue`.
    pub async fn issue_for_selection(
        pool: &PgPool,
        user_id: Uuid,
        meal_date: NaiveDate,
        meal_type: MealType,
    ) -> ApiResult<RedemptionToken> {
        let row: Option<(String, Uuid, String, Option<String>, Option<String>)> = sqlx::query_as(
            r#"SELECT u.name, mi.id, mi.name, mi.description, mi.image_url
               FROM weekly_selections s
               JOIN users u ON u.id = s.user_id
               JOIN menu_items mi ON mi.id = s.menu_item_id
               WHERE s.user_id = $1 AND s.meal_date = $2 AND s.meal_type = $3"#,
        )
        .bind(user_id)
        .bind(meal_date)
        .bind(meal_type)
        .fetch_optional(pool)
        .await?;

        let (user_name, item_id, item_name, description, image_url) = row.ok_or_else(|| {
            ApiError::NotFound(format!(
                "You have not made a selection for {meal_type} on {meal_date}."
            ))
        })?;

        let claim = RedemptionClaim {
            v: CLAIM_VERSION,
            owner_kind: OwnerKind::Student,
            owner_id: user_id,
            owner_name: user_name,
            meal_date,
            meal_type,
            items: vec![ClaimItem {
                id: item_id,
                name: item_name,
                description,
                image_url,
            }],
        };

        let mut conn = pool.acquire().await?;
        Self::issue(&mut conn, &claim, 0).await
    }

    /// Backfill sweep: issue tokens for every selection on `date` that does
    /// not have one yet. Per-row failures are logged and skipped so a bad
    /// row cannot starve the rest.
    pub async fn backfill_for_date(pool: &PgPool, date: NaiveDate) -> ApiResult<usize> {
        let missing: Vec<(Uuid, MealType)> = sqlx::query_as(
            r#"SELECT s.user_id, s.meal_type
               FROM weekly_selections s
               LEFT JOIN redemption_tokens t
                 ON t.owner_kind = 'student' AND t.owner_id = s.user_id
                AND t.meal_date = s.meal_date AND t.meal_type = s.meal_type
               WHERE s.meal_date = $1 AND t.id IS NULL"#,
        )
        .bind(date)
        .fetch_all(pool)
        .await?;

        let mut issued = 0usize;
        for (user_id, meal_type) in missing {
            match Self::issue_for_selection(pool, user_id, date, meal_type).await {
                Ok(_) => issued += 1,
                Err(e) => {
                    tracing::warn!(
                        "token backfill failed for user {user_id} {meal_type} on {date}: {e}"
                    );
                }
            }
        }
        Ok(issued)
    }
}
