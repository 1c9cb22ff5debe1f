use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use super::menu::MealType;
use super::user::OwnerKind;

pub const CLAIM_VERSION: u32 = 1;

/// One line item inside a claim. Guest orders carry several; student
/// selections carry exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimItem {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// The structured data encoded into a redemption QR: who may redeem what,
/// when. This is the versioned wire shape — already-issued codes outlive
/// format changes, so additions must stay backward-compatible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionClaim {
    #[serde(default = "default_version")]
    pub v: u32,
    pub owner_kind: OwnerKind,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub meal_date: NaiveDate,
    pub meal_type: MealType,
    pub items: Vec<ClaimItem>,
}

fn default_version() -> u32 {
    CLAIM_VERSION
}

impl RedemptionClaim {
    /// The scannable string: base64 over the canonical claim JSON. Rendering
    /// it into a QR image is the client's concern.
    pub fn to_qr_data(&self) -> String {
        STANDARD.encode(serde_json::to_vec(self).expect("claim serializes"))
    }

    /// Normalize the shapes a scanner may post into one canonical claim:
    /// `{"qr_data": "<base64 or JSON string>"}`, `{"claim": {...}}`, a flat
    /// claim object, or the legacy flat shape keyed by `userId`/`guestId`.
    pub fn from_request(body: &Value) -> Result<Self, String> {
        if let Some(qr) = body.get("qr_data") {
            let s = qr
                .as_str()
                .ok_or_else(|| "qr_data must be a string".to_string())?;
            return Self::from_qr_data(s);
        }
        if let Some(claim) = body.get("claim") {
            return Self::from_value(claim);
        }
        Self::from_value(body)
    }

    fn from_qr_data(s: &str) -> Result<Self, String> {
        let json: Value = match STANDARD.decode(s.trim()) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|_| "Invalid QR code format.".to_string())?,
            // Not base64 — some scanners hand over the decoded JSON directly.
            Err(_) => serde_json::from_str(s).map_err(|_| "Invalid QR code format.".to_string())?,
        };
        Self::from_value(&json)
    }

    fn from_value(v: &Value) -> Result<Self, String> {
        if let Ok(claim) = serde_json::from_value::<RedemptionClaim>(v.clone()) {
            if claim.v != CLAIM_VERSION {
                return Err(format!("Unsupported claim version {}", claim.v));
            }
            return Ok(claim);
        }
        Self::from_legacy(v).ok_or_else(|| "Invalid QR code: no user or guest ID found.".into())
    }

    /// Legacy payloads identify the owner as `userId` or `guestId` and may
    /// omit the items array.
    fn from_legacy(v: &Value) -> Option<Self> {
        let (owner_kind, owner_id) = if let Some(id) = v.get("userId").and_then(Value::as_str) {
            (OwnerKind::Student, id.parse().ok()?)
        } else if let Some(id) = v.get("guestId").and_then(Value::as_str) {
            (OwnerKind::Guest, id.parse().ok()?)
        } else {
            return None;
        };
        let meal_date: NaiveDate = v.get("meal_date")?.as_str()?.parse().ok()?;
        let meal_type: MealType =
            serde_json::from_value(v.get("meal_type")?.clone()).ok()?;
        let owner_name = v
            .get("userName")
            .or_else(|| v.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let items = v
            .get("items")
            .and_then(|i| serde_json::from_value(i.clone()).ok())
            .unwrap_or_default();
        Some(Self {
            v: CLAIM_VERSION,
            owner_kind,
            owner_id,
            owner_name,
            meal_date,
            meal_type,
            items,
        })
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RedemptionToken {
    pub id: Uuid,
    pub owner_kind: OwnerKind,
    pub owner_id: Uuid,
    pub meal_date: NaiveDate,
    pub meal_type: MealType,
    pub payload: Value,
    pub total_cost_paise: i64,
    pub is_valid: bool,
    pub issued_at: DateTime<Utc>,
    pub scanned_at: Option<DateTime<Utc>>,
}

/// Confirmation returned to the scanning staff member.
#[derive(Debug, Serialize)]
pub struct RedemptionResult {
    pub token_id: Uuid,
    pub scanned_at: DateTime<Utc>,
    pub claim: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_claim() -> RedemptionClaim {
        RedemptionClaim {
            v: CLAIM_VERSION,
            owner_kind: OwnerKind::Student,
            owner_id: Uuid::new_v4(),
            owner_name: "Asha Rao".into(),
            meal_date: "2026-08-06".parse().unwrap(),
            meal_type: MealType::Lunch,
            items: vec![ClaimItem {
                id: Uuid::new_v4(),
                name: "Rice-Chicken Thali".into(),
                description: None,
                image_url: None,
            }],
        }
    }

    #[test]
    fn qr_data_round_trips() {
        let claim = sample_claim();
        let body = json!({ "qr_data": claim.to_qr_data() });
        let parsed = RedemptionClaim::from_request(&body).unwrap();
        assert_eq!(parsed, claim);
    }

    #[test]
    fn accepts_nested_and_flat_shapes() {
        let claim = sample_claim();
        let as_value = serde_json::to_value(&claim).unwrap();

        let nested = json!({ "claim": as_value });
        assert_eq!(RedemptionClaim::from_request(&nested).unwrap(), claim);

        assert_eq!(RedemptionClaim::from_request(&as_value).unwrap(), claim);
    }

    #[test]
    fn accepts_legacy_user_keyed_payload() {
        let id = Uuid::new_v4();
        let body = json!({
            "userId": id.to_string(),
            "userName": "Asha Rao",
            "meal_date": "2026-08-06",
            "meal_type": "dinner",
        });
        let claim = RedemptionClaim::from_request(&body).unwrap();
        assert_eq!(claim.owner_kind, OwnerKind::Student);
        assert_eq!(claim.owner_id, id);
        assert_eq!(claim.meal_type, MealType::Dinner);
        assert!(claim.items.is_empty());
    }

    #[test]
    fn rejects_unknown_version_and_ownerless_payloads() {
        let mut v = serde_json::to_value(sample_claim()).unwrap();
        v["v"] = json!(2);
        assert!(RedemptionClaim::from_request(&v).is_err());

        let no_owner = json!({ "meal_date": "2026-08-06", "meal_type": "lunch" });
        assert!(RedemptionClaim::from_request(&no_owner).is_err());
    }
}
