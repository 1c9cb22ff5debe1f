use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::user::OwnerKind;

/// Canonical reference to a wallet-holding account. Request bodies that
/// identify an account by `user_id` or `guest_id` are normalized into this
/// before reaching any service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRef {
    Student(Uuid),
    Guest(Uuid),
}

impl AccountRef {
    pub fn kind(&self) -> OwnerKind {
        match self {
            AccountRef::Student(_) => OwnerKind::Student,
            AccountRef::Guest(_) => OwnerKind::Guest,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            AccountRef::Student(id) | AccountRef::Guest(id) => *id,
        }
    }

    /// Table holding the referenced wallet balance.
    pub fn table(&self) -> &'static str {
        match self {
            AccountRef::Student(_) => "users",
            AccountRef::Guest(_) => "guests",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "txn_kind", rename_all = "snake_case")]
pub enum TxnKind {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub owner_kind: OwnerKind,
    pub owner_id: Uuid,
    pub kind: TxnKind,
    pub amount_paise: i64,
    pub balance_after_paise: i64,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Body for POST /admin/wallet/recharge — exactly one of `user_id` /
/// `guest_id` must be present.
#[derive(Debug, Deserialize)]
pub struct AdminRechargeRequest {
    pub user_id: Option<Uuid>,
    pub guest_id: Option<Uuid>,
    /// Decimal string, e.g. "500.00".
    pub amount: String,
}

impl AdminRechargeRequest {
    pub fn account(&self) -> Result<AccountRef, String> {
        match (self.user_id, self.guest_id) {
            (Some(id), None) => Ok(AccountRef::Student(id)),
            (None, Some(id)) => Ok(AccountRef::Guest(id)),
            _ => Err("Provide exactly one of user_id or guest_id.".into()),
        }
    }
}

/// Body for POST /wallet/recharge/order (gateway-backed recharge).
#[derive(Debug, Deserialize)]
pub struct CreateRechargeOrderRequest {
    pub amount: String,
}

// ── Money helpers ───────────────────────────────────────────────────────────
//
// Amounts cross the API boundary as two-fraction-digit decimal strings and
// are held internally as integer paise. Binary floating point never touches
// a balance.

/// Parse a `"123.45"`-style amount into paise. Accepts at most two fraction
/// digits and rejects negative or empty input.
pub fn parse_amount(s: &str) -> Result<i64, String> {
    let s = s.trim();
    if s.is_empty() || s.starts_with('-') || s.starts_with('+') {
        return Err(format!("Invalid amount: '{s}'"));
    }
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() || frac.len() > 2 {
        return Err(format!("Invalid amount: '{s}'"));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("Invalid amount: '{s}'"));
    }
    let rupees: i64 = whole
        .parse()
        .map_err(|_| format!("Amount out of range: '{s}'"))?;
    let paise: i64 = if frac.is_empty() {
        0
    } else if frac.len() == 1 {
        frac.parse::<i64>().unwrap_or(0) * 10
    } else {
        frac.parse().unwrap_or(0)
    };
    rupees
        .checked_mul(100)
        .and_then(|r| r.checked_add(paise))
        .ok_or_else(|| format!("Amount out of range: '{s}'"))
}

/// Format paise back into a `"123.45"` display string.
pub fn format_paise(paise: i64) -> String {
    let sign = if paise < 0 { "-" } else { "" };
    let abs = paise.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(parse_amount("50"), Ok(5000));
        assert_eq!(parse_amount("50.0"), Ok(5000));
        assert_eq!(parse_amount("50.25"), Ok(5025));
        assert_eq!(parse_amount("0.05"), Ok(5));
    }

    #[test]
    fn rejects_malformed_amounts() {
        assert!(parse_amount("").is_err());
        assert!(parse_amount("-1").is_err());
        assert!(parse_amount("1.234").is_err());
        assert!(parse_amount("12a").is_err());
        assert!(parse_amount(".50").is_err());
    }

    #[test]
    fn round_trips_display() {
        assert_eq!(format_paise(5025), "50.25");
        assert_eq!(format_paise(5), "0.05");
        assert_eq!(format_paise(0), "0.00");
    }

    #[test]
    fn recharge_body_requires_exactly_one_account() {
        let both = AdminRechargeRequest {
            user_id: Some(Uuid::new_v4()),
            guest_id: Some(Uuid::new_v4()),
            amount: "10.00".into(),
        };
        assert!(both.account().is_err());

        let neither = AdminRechargeRequest {
            user_id: None,
            guest_id: None,
            amount: "10.00".into(),
        };
        assert!(neither.account().is_err());

        let student = AdminRechargeRequest {
            user_id: Some(Uuid::new_v4()),
            guest_id: None,
            amount: "10.00".into(),
        };
        assert!(matches!(student.account(), Ok(AccountRef::Student(_))));
    }
}
