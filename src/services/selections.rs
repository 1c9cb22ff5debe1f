use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    menu::{MealType, MenuItem},
    selection::{
        ChargedItem, SelectionInput, SelectionWithItem, Slot, SubmitOutcome,
        SubmitSelectionsRequest,
    },
    wallet::{format_paise, AccountRef},
};
use crate::services::{
    entitlement::{week_window, EntitlementStore},
    metrics,
    pricing::{LimitPolicy, PricingService},
    tokens::TokenService,
    wallet::WalletService,
};

/// An already-persisted selection, keyed by its slot during planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistingSelection {
    pub id: Uuid,
    pub menu_item_id: Uuid,
}

/// What a submission will do to the stored week, computed before any write.
#[derive(Debug, Default)]
pub struct ReconciliationPlan {
    pub added: Vec<SelectionInput>,
    pub changed: Vec<(Uuid, SelectionInput)>,
    pub removed: Vec<(Uuid, Slot)>,
    pub unchanged: usize,
    /// Added + changed picks in the order they appeared in the request —
    /// pricing consumes them in exactly this order.
    pub to_price: Vec<SelectionInput>,
}

/// Diff-based upsert: unchanged slots are left alone (and never re-charged),
/// re-picked slots are updated, slots missing from the request are removed,
/// new slots are inserted.
pub fn plan_reconciliation(
    existing: &HashMap<Slot, ExistingSelection>,
    incoming: &[SelectionInput],
) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();
    let mut seen: HashSet<Slot> = HashSet::new();

    for pick in incoming {
        let slot = pick.slot();
        seen.insert(slot);
        match existing.get(&slot) {
            None => {
                plan.added.push(pick.clone());
                plan.to_price.push(pick.clone());
            }
            Some(current) if current.menu_item_id != pick.menu_item_id => {
                plan.changed.push((current.id, pick.clone()));
                plan.to_price.push(pick.clone());
            }
            Some(_) => plan.unchanged += 1,
        }
    }

    for (slot, current) in existing {
        if !seen.contains(slot) {
            plan.removed.push((current.id, *slot));
        }
    }

    plan
}

#[derive(Debug, Serialize)]
pub struct WeekSelections {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub selections: Vec<SelectionWithItem>,
}

#[derive(Debug, Serialize)]
pub struct PreviewOutcome {
    pub total_extra_cost: String,
    pub charged_items: Vec<ChargedItem>,
}

pub struct SelectionService;

impl SelectionService {
    /// Submit (or edit) a week of selections. Validation, reconciliation,
    /// pricing, the wallet debit and the ledger writes all run in one
    /// transaction; token issuance for same-day slots is spawned afterwards.
    pub async fn submit(
        pool: &PgPool,
        policy: LimitPolicy,
        user_id: Uuid,
        req: &SubmitSelectionsRequest,
    ) -> ApiResult<SubmitOutcome> {
        let week_start = req.week_start_date;
        let week_end = week_start + Duration::days(6);
        Self::validate_picks(&req.selections, week_start, week_end)?;

        let items = Self::load_items(pool, &req.selections).await?;

        let mut tx = pool.begin().await?;

        // Lock the user's week so concurrent submissions serialize; the
        // unique constraint on (user_id, meal_date, meal_type) backstops
        // anything that slips past the lock.
        let existing_rows: Vec<(Uuid, NaiveDate, MealType, Uuid)> =
            sqlx::query_as(
                r#"SELECT id, meal_date, meal_type, menu_item_id
                   FROM weekly_selections
                   WHERE user_id = $1 AND meal_date BETWEEN $2 AND $3
                   FOR UPDATE"#,
            )
            .bind(user_id)
            .bind(week_start)
            .bind(week_end)
            .fetch_all(&mut *tx)
            .await?;

        let existing: HashMap<Slot, ExistingSelection> = existing_rows
            .into_iter()
            .map(|(id, meal_date, meal_type, menu_item_id)| {
                (
                    Slot { meal_date, meal_type },
                    ExistingSelection { id, menu_item_id },
                )
            })
            .collect();

        let plan = plan_reconciliation(&existing, &req.selections);

        // Slots that already have a redemption token are immutable.
        let token_slots = Self::token_slots(&mut *tx, user_id, week_start, week_end).await?;
        for slot in plan
            .changed
            .iter()
            .map(|(_, p)| p.slot())
            .chain(plan.removed.iter().map(|(_, s)| *s))
        {
            if token_slots.contains(&slot) {
                return Err(ApiError::Conflict(format!(
                    "The selection for {} on {} already has a meal QR and can no longer be changed.",
                    slot.meal_type, slot.meal_date
                )));
            }
        }

        // Clear ledger rows behind removed and re-picked slots before
        // counting usage, so the replacement picks are priced against a
        // clean window. Removed selections cascade their ledger rows.
        for (id, _) in &plan.removed {
            sqlx::query("DELETE FROM weekly_selections WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        let changed_ids: Vec<Uuid> = plan.changed.iter().map(|(id, _)| *id).collect();
        EntitlementStore::forget_selections(&mut tx, &changed_ids).await?;

        let today = Utc::now().date_naive();
        let distinct_items: Vec<Uuid> = Self::distinct_item_ids(&plan.to_price);
        let prior = EntitlementStore::usage_counts(&mut *tx, user_id, &distinct_items, today)
            .await?;
        let quote = PricingService::price_selections(&items, &prior, &plan.to_price, policy)?;

        if quote.total_extra_paise > 0 {
            WalletService::debit(
                &mut tx,
                AccountRef::Student(user_id),
                quote.total_extra_paise,
                "Extra thali charges for weekly selection",
                None,
            )
            .await?;
        }

        // Apply the plan. Charges computed above are parallel to to_price.
        let mut charge_iter = quote.per_pick_paise.iter().copied();
        for pick in &plan.to_price {
            let charged = charge_iter.next().unwrap_or(0);
            let is_change = plan
                .changed
                .iter()
                .find(|(_, p)| p.slot() == pick.slot())
                .map(|(id, _)| *id);

            let selection_id = match is_change {
                Some(id) => {
                    sqlx::query(
                        "UPDATE weekly_selections
                         SET menu_item_id = $1, is_default = FALSE, updated_at = NOW()
                         WHERE id = $2",
                    )
                    .bind(pick.menu_item_id)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                    id
                }
                None => {
                    let inserted: Option<(Uuid,)> = sqlx::query_as(
                        r#"INSERT INTO weekly_selections (user_id, meal_date, meal_type, menu_item_id)
                           VALUES ($1, $2, $3, $4)
                           ON CONFLICT (user_id, meal_date, meal_type) DO NOTHING
                           RETURNING id"#,
                    )
                    .bind(user_id)
                    .bind(pick.meal_date)
                    .bind(pick.meal_type)
                    .bind(pick.menu_item_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                    inserted
                        .map(|(id,)| id)
                        .ok_or_else(|| {
                            ApiError::Conflict(format!(
                                "A selection for {} on {} was just made elsewhere.",
                                pick.meal_type, pick.meal_date
                            ))
                        })?
                }
            };

            EntitlementStore::record(
                &mut tx,
                user_id,
                pick.menu_item_id,
                pick.meal_date,
                pick.meal_type,
                selection_id,
                charged,
            )
            .await?;
        }

        tx.commit().await?;
        metrics::SELECTIONS_COUNTER.with_label_values(&["ok"]).inc();

        // Same-day slots are final — mint their tokens in the background.
        // Failures are logged only; the daily sweep re-issues anything missed.
        let finalized: Vec<SelectionInput> = plan
            .to_price
            .iter()
            .filter(|p| p.meal_date <= today)
            .cloned()
            .collect();
        if !finalized.is_empty() {
            let pool = pool.clone();
            tokio::spawn(async move {
                for pick in finalized {
                    if let Err(e) = TokenService::issue_for_selection(
                        &pool,
                        user_id,
                        pick.meal_date,
                        pick.meal_type,
                    )
                    .await
                    {
                        tracing::warn!(
                            "background token issuance failed for user {user_id} \
                             {} on {}: {e}",
                            pick.meal_type,
                            pick.meal_date
                        );
                    }
                }
            });
        }

        Ok(SubmitOutcome {
            added: plan.added.len(),
            updated: plan.changed.len(),
            removed: plan.removed.len(),
            total_extra_charge: format_paise(quote.total_extra_paise),
            charged_items: quote.charged_items,
        })
    }

    /// Dry-run pricing for a batch of picks against current usage. Does not
    /// reconcile against stored slots and writes nothing.
    pub async fn preview(
        pool: &PgPool,
        policy: LimitPolicy,
        user_id: Uuid,
        picks: &[SelectionInput],
    ) -> ApiResult<PreviewOutcome> {
        if picks.is_empty() {
            return Err(ApiError::Validation(
                "Please provide selections to preview.".into(),
            ));
        }
        let items = Self::load_items(pool, picks).await?;
        let today = Utc::now().date_naive();
        let distinct_items = Self::distinct_item_ids(picks);
        let prior = EntitlementStore::usage_counts(pool, user_id, &distinct_items, today).await?;
        let quote = PricingService::price_selections(&items, &prior, picks, policy)?;
        Ok(PreviewOutcome {
            total_extra_cost: format_paise(quote.total_extra_paise),
            charged_items: quote.charged_items,
        })
    }

    /// The student's selections for the week containing today.
    pub async fn list_current_week(pool: &PgPool, user_id: Uuid) -> ApiResult<WeekSelections> {
        let (week_start, week_end) = week_window(Utc::now().date_naive());
        let selections = sqlx::query_as::<_, SelectionWithItem>(
            r#"SELECT s.id, s.meal_date, s.meal_type, s.is_default,
                      mi.id AS menu_item_id, mi.name AS item_name, mi.image_url,
                      mi.extra_price_paise
               FROM weekly_selections s
               JOIN menu_items mi ON mi.id = s.menu_item_id
               WHERE s.user_id = $1 AND s.meal_date BETWEEN $2 AND $3
               ORDER BY s.meal_date, s.meal_type"#,
        )
        .bind(user_id)
        .bind(week_start)
        .bind(week_end)
        .fetch_all(pool)
        .await?;
        Ok(WeekSelections {
            week_start,
            week_end,
            selections,
        })
    }

    fn validate_picks(
        picks: &[SelectionInput],
        week_start: NaiveDate,
        week_end: NaiveDate,
    ) -> ApiResult<()> {
        if picks.is_empty() {
            return Err(ApiError::Validation(
                "Please provide selections and the week start date.".into(),
            ));
        }
        let mut seen: HashSet<Slot> = HashSet::new();
        for pick in picks {
            if pick.meal_date < week_start || pick.meal_date > week_end {
                return Err(ApiError::Validation(format!(
                    "Selection date {} is outside the submitted week.",
                    pick.meal_date
                )));
            }
            if !seen.insert(pick.slot()) {
                return Err(ApiError::Validation(format!(
                    "You can only select one thali per meal. Error on {}-{}.",
                    pick.meal_date, pick.meal_type
                )));
            }
        }
        Ok(())
    }

    async fn load_items(
        pool: &PgPool,
        picks: &[SelectionInput],
    ) -> ApiResult<HashMap<Uuid, MenuItem>> {
        let ids = Self::distinct_item_ids(picks);
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
            return Err(ApiError::NotFound(
                "One or more selected menu items are invalid.".into(),
            ));
        }
        Ok(rows.into_iter().map(|item| (item.id, item)).collect())
    }

    fn distinct_item_ids(picks: &[SelectionInput]) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = Vec::new();
        for pick in picks {
            if !ids.contains(&pick.menu_item_id) {
                ids.push(pick.menu_item_id);
            }
        }
        ids
    }

    async fn token_slots<'e, E: PgExecutor<'e>>(
        exec: E,
        user_id: Uuid,
        week_start: NaiveDate,
        week_end: NaiveDate,
    ) -> ApiResult<HashSet<Slot>> {
        let rows: Vec<(NaiveDate, MealType)> = sqlx::query_as(
            r#"SELECT meal_date, meal_type
               FROM redemption_tokens
               WHERE owner_kind = 'student' AND owner_id = $1
                 AND meal_date BETWEEN $2 AND $3"#,
        )
        .bind(user_id)
        .bind(week_start)
        .bind(week_end)
        .fetch_all(exec)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(meal_date, meal_type)| Slot { meal_date, meal_type })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::menu::MealType;

    fn slot(day: u32, meal: MealType) -> Slot {
        Slot {
            meal_date: NaiveDate::from_ymd_opt(2026, 8, day).unwrap(),
            meal_type: meal,
        }
    }

    fn input(day: u32, meal: MealType, item: Uuid) -> SelectionInput {
        SelectionInput {
            meal_date: NaiveDate::from_ymd_opt(2026, 8, day).unwrap(),
            meal_type: meal,
            menu_item_id: item,
        }
    }

    #[test]
    fn plans_adds_changes_and_removals() {
        let kept_item = Uuid::new_v4();
        let old_item = Uuid::new_v4();
        let new_item = Uuid::new_v4();

        let existing = HashMap::from([
            (
                slot(3, MealType::Lunch),
                ExistingSelection { id: Uuid::new_v4(), menu_item_id: kept_item },
            ),
            (
                slot(3, MealType::Dinner),
                ExistingSelection { id: Uuid::new_v4(), menu_item_id: old_item },
            ),
            (
                slot(4, MealType::Lunch),
                ExistingSelection { id: Uuid::new_v4(), menu_item_id: old_item },
            ),
        ]);

        let incoming = vec![
            input(3, MealType::Lunch, kept_item),  // unchanged
            input(3, MealType::Dinner, new_item),  // changed
            input(5, MealType::Lunch, new_item),   // added
        ];
        // 4 Aug lunch missing from the request -> removed

        let plan = plan_reconciliation(&existing, &incoming);
        assert_eq!(plan.unchanged, 1);
        assert_eq!(plan.changed.len(), 1);
        assert_eq!(plan.added.len(), 1);
        assert_eq!(plan.removed.len(), 1);
        assert_eq!(plan.removed[0].1, slot(4, MealType::Lunch));

        // to_price preserves request order: the change first, then the add.
        assert_eq!(plan.to_price.len(), 2);
        assert_eq!(plan.to_price[0].slot(), slot(3, MealType::Dinner));
        assert_eq!(plan.to_price[1].slot(), slot(5, MealType::Lunch));
    }

    #[test]
    fn resubmitting_the_same_week_is_a_no_op_plan() {
        let item = Uuid::new_v4();
        let existing = HashMap::from([(
            slot(3, MealType::Lunch),
            ExistingSelection { id: Uuid::new_v4(), menu_item_id: item },
        )]);
        let incoming = vec![input(3, MealType::Lunch, item)];

        let plan = plan_reconciliation(&existing, &incoming);
        assert_eq!(plan.unchanged, 1);
        assert!(plan.added.is_empty());
        assert!(plan.changed.is_empty());
        assert!(plan.removed.is_empty());
        assert!(plan.to_price.is_empty());
    }

    #[test]
    fn duplicate_slots_in_one_request_are_rejected() {
        let item = Uuid::new_v4();
        let picks = vec![
            input(3, MealType::Lunch, item),
            input(3, MealType::Lunch, Uuid::new_v4()),
        ];
        let week_start = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        let err =
            SelectionService::validate_picks(&picks, week_start, week_start + Duration::days(6))
                .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn out_of_week_dates_are_rejected() {
        let picks = vec![input(11, MealType::Lunch, Uuid::new_v4())];
        let week_start = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        let err =
            SelectionService::validate_picks(&picks, week_start, week_start + Duration::days(6))
                .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
