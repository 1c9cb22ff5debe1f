use std::collections::HashMap;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    menu::MenuItem,
    selection::{ChargedItem, SelectionInput},
    wallet::format_paise,
};

/// Which free-usage caps are enforced. `Both` is the strictest: exceeding
/// either cap makes a pick chargeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitPolicy {
    Monthly,
    Weekly,
    Both,
}

impl LimitPolicy {
    pub fn enforces_monthly(self) -> bool {
        matches!(self, LimitPolicy::Monthly | LimitPolicy::Both)
    }

    pub fn enforces_weekly(self) -> bool {
        matches!(self, LimitPolicy::Weekly | LimitPolicy::Both)
    }
}

impl FromStr for LimitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(LimitPolicy::Monthly),
            "weekly" => Ok(LimitPolicy::Weekly),
            "both" => Ok(LimitPolicy::Both),
            other => Err(format!(
                "Unknown LIMIT_POLICY '{other}' (expected monthly, weekly or both)"
            )),
        }
    }
}

/// Prior consumption counts for one item, per enforcement window.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub weekly: i64,
    pub monthly: i64,
}

/// Result of pricing a batch of picks. `per_pick_paise` is parallel to the
/// input slice: 0 means the pick was within its free allowance.
#[derive(Debug)]
pub struct Quote {
    pub total_extra_paise: i64,
    pub per_pick_paise: Vec<i64>,
    pub charged_items: Vec<ChargedItem>,
}

pub struct PricingService;

impl PricingService {
    /// Price a batch of picks against prior usage. Pure: no persistence, so
    /// the same computation backs both the preview and the commit path.
    ///
    /// Picks are processed in input order and each pick bumps the simulated
    /// counters whether or not it was charged — when a user is near a limit,
    /// the first picks of an item in the batch take the remaining free slots
    /// and later ones pay.
    pub fn price_selections(
        items: &HashMap<Uuid, MenuItem>,
        prior: &HashMap<Uuid, Usage>,
        picks: &[SelectionInput],
        policy: LimitPolicy,
    ) -> ApiResult<Quote> {
        let mut simulated: HashMap<Uuid, Usage> = prior.clone();
        let mut total = 0i64;
        let mut per_pick = Vec::with_capacity(picks.len());
        let mut charged_items = Vec::new();

        for pick in picks {
            let item = items.get(&pick.menu_item_id).ok_or_else(|| {
                ApiError::NotFound(format!("Menu item {} not found.", pick.menu_item_id))
            })?;
            let usage = simulated.entry(item.id).or_default();

            let within_monthly =
                !policy.enforces_monthly() || usage.monthly < i64::from(item.monthly_limit);
            let within_weekly =
                !policy.enforces_weekly() || usage.weekly < i64::from(item.weekly_limit);

            let charge = if within_monthly && within_weekly {
                0
            } else {
                item.extra_price_paise
            };

            if charge > 0 {
                total += charge;
                charged_items.push(ChargedItem {
                    menu_item_id: item.id,
                    name: item.name.clone(),
                    meal_date: pick.meal_date,
                    meal_type: pick.meal_type,
                    price: format_paise(charge),
                });
            }
            per_pick.push(charge);

            usage.weekly += 1;
            usage.monthly += 1;
        }

        Ok(Quote {
            total_extra_paise: total,
            per_pick_paise: per_pick,
            charged_items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    use crate::models::menu::MealType;

    fn item(monthly_limit: i32, weekly_limit: i32, price_paise: i64) -> MenuItem {
        MenuItem {
            id: Uuid::new_v4(),
            name: "Rice-Chicken Thali".into(),
            description: None,
            image_url: None,
            estimated_prep_minutes: 15,
            weekly_limit,
            monthly_limit,
            extra_price_paise: price_paise,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn pick(item_id: Uuid, day: u32) -> SelectionInput {
        SelectionInput {
            meal_date: NaiveDate::from_ymd_opt(2026, 8, day).unwrap(),
            meal_type: MealType::Lunch,
            menu_item_id: item_id,
        }
    }

    #[test]
    fn charges_only_past_the_monthly_limit_in_input_order() {
        // monthly_limit = 2, three picks in one batch: only the third pays.
        let it = item(2, 100, 4500);
        let items = HashMap::from([(it.id, it.clone())]);
        let picks = vec![pick(it.id, 3), pick(it.id, 4), pick(it.id, 5)];

        let quote = PricingService::price_selections(
            &items,
            &HashMap::new(),
            &picks,
            LimitPolicy::Monthly,
        )
        .unwrap();

        assert_eq!(quote.per_pick_paise, vec![0, 0, 4500]);
        assert_eq!(quote.total_extra_paise, 4500);
        assert_eq!(quote.charged_items.len(), 1);
        assert_eq!(
            quote.charged_items[0].meal_date,
            NaiveDate::from_ymd_opt(2026, 8, 5).unwrap()
        );
    }

    #[test]
    fn prior_usage_reduces_the_free_allowance() {
        let it = item(3, 100, 2000);
        let items = HashMap::from([(it.id, it.clone())]);
        let prior = HashMap::from([(it.id, Usage { weekly: 0, monthly: 2 })]);
        let picks = vec![pick(it.id, 3), pick(it.id, 4)];

        let quote =
            PricingService::price_selections(&items, &prior, &picks, LimitPolicy::Monthly)
                .unwrap();

        // One free slot left this month: first pick free, second charged.
        assert_eq!(quote.per_pick_paise, vec![0, 2000]);
    }

    #[test]
    fn both_policy_charges_when_either_cap_is_hit() {
        let it = item(10, 1, 3000);
        let items = HashMap::from([(it.id, it.clone())]);
        let picks = vec![pick(it.id, 3), pick(it.id, 4)];

        let quote =
            PricingService::price_selections(&items, &HashMap::new(), &picks, LimitPolicy::Both)
                .unwrap();
        assert_eq!(quote.per_pick_paise, vec![0, 3000]);

        // Monthly-only policy ignores the weekly cap.
        let quote = PricingService::price_selections(
            &items,
            &HashMap::new(),
            &picks,
            LimitPolicy::Monthly,
        )
        .unwrap();
        assert_eq!(quote.per_pick_paise, vec![0, 0]);
    }

    #[test]
    fn items_are_tracked_independently() {
        let a = item(1, 100, 1000);
        let b = item(1, 100, 2000);
        let items = HashMap::from([(a.id, a.clone()), (b.id, b.clone())]);
        let picks = vec![pick(a.id, 3), pick(b.id, 3), pick(a.id, 4), pick(b.id, 4)];

        let quote =
            PricingService::price_selections(&items, &HashMap::new(), &picks, LimitPolicy::Both)
                .unwrap();

        assert_eq!(quote.per_pick_paise, vec![0, 0, 1000, 2000]);
        assert_eq!(quote.total_extra_paise, 3000);
    }

    #[test]
    fn unknown_items_are_rejected() {
        let it = item(2, 2, 1000);
        let items = HashMap::from([(it.id, it.clone())]);
        let picks = vec![pick(Uuid::new_v4(), 3)];

        let err = PricingService::price_selections(
            &items,
            &HashMap::new(),
            &picks,
            LimitPolicy::Both,
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn zero_limit_items_always_pay() {
        let it = item(0, 0, 1500);
        let items = HashMap::from([(it.id, it.clone())]);
        let picks = vec![pick(it.id, 3)];

        let quote =
            PricingService::price_selections(&items, &HashMap::new(), &picks, LimitPolicy::Both)
                .unwrap();
        assert_eq!(quote.per_pick_paise, vec![1500]);
    }
}
