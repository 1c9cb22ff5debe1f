use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    user::OwnerKind,
    wallet::AccountRef,
};
use crate::services::wallet::WalletService;

type HmacSha256 = Hmac<Sha256>;

/// Thin client for the payment gateway used for wallet recharges: order
/// creation over HTTPS, plus HMAC-SHA256 signature checks for the checkout
/// callback and the webhook. Comparison happens inside `Mac::verify_slice`,
/// which is constant-time.
pub struct PaymentService {
    client: Client,
    key_id: String,
    key_secret: String,
    webhook_secret: Option<String>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

impl PaymentService {
    /// Returns None if the gateway keys are not configured.
    pub fn new(config: &Config) -> Option<Self> {
        let key_id = config.payment_key_id.clone()?;
        let key_secret = config.payment_key_secret.clone()?;
        Some(Self {
            client: Client::new(),
            key_id,
            key_secret,
            webhook_secret: config.payment_webhook_secret.clone(),
            base_url: config.payment_base_url.clone(),
        })
    }

    /// Create a gateway order for `amount_paise`. The gateway expects the
    /// amount in the smallest currency unit, which is what we store anyway.
    pub async fn create_gateway_order(
        &self,
        amount_paise: i64,
        receipt: &str,
        notes: Value,
    ) -> ApiResult<GatewayOrder> {
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": amount_paise,
                "currency": "INR",
                "receipt": receipt,
                "payment_capture": 1,
                "notes": notes,
            }))
            .send()
            .await
            .map_err(|e| ApiError::ExternalService(format!("Payment gateway unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::ExternalService(format!(
                "Payment gateway rejected order creation ({status}): {body}"
            )));
        }

        response
            .json::<GatewayOrder>()
            .await
            .map_err(|e| ApiError::ExternalService(format!("Malformed gateway response: {e}")))
    }

    /// Create a gateway recharge order for an account and record it. The
    /// wallet is only credited later, by a verified capture.
    pub async fn create_recharge(
        &self,
        pool: &PgPool,
        account: AccountRef,
        amount_paise: i64,
    ) -> ApiResult<Value> {
        let receipt = format!("rcpt_{}", Uuid::new_v4().simple());
        let gateway_order = self
            .create_gateway_order(
                amount_paise,
                &receipt,
                json!({
                    "owner_kind": account.kind(),
                    "owner_id": account.id(),
                }),
            )
            .await?;

        sqlx::query(
            r#"INSERT INTO payment_orders (owner_kind, owner_id, gateway_order_id, amount_paise)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(account.kind())
        .bind(account.id())
        .bind(&gateway_order.id)
        .bind(amount_paise)
        .execute(pool)
        .await?;

        Ok(json!({
            "gateway_order_id": gateway_order.id,
            "amount": gateway_order.amount,
            "currency": gateway_order.currency,
            "key": self.key_id.clone(),
            "name": "MessMate",
            "description": "Wallet recharge",
        }))
    }

    /// Process a webhook delivery: verify the signature over the raw body,
    /// then apply the event. Unverifiable deliveries are rejected before
    /// any parsing.
    pub async fn handle_webhook(
        &self,
        pool: &PgPool,
        body: &[u8],
        signature_hex: &str,
    ) -> ApiResult<()> {
        if !self.verify_webhook_signature(body, signature_hex) {
            return Err(ApiError::Unauthorized("Invalid webhook signature.".into()));
        }

        let event: Value = serde_json::from_slice(body)
            .map_err(|_| ApiError::Validation("Malformed webhook body.".into()))?;
        let kind = event.get("event").and_then(Value::as_str).unwrap_or("");
        let payment = event
            .pointer("/payload/payment/entity")
            .cloned()
            .unwrap_or(Value::Null);
        let payment_id = payment.get("id").and_then(Value::as_str).unwrap_or("");
        let order_id = payment.get("order_id").and_then(Value::as_str).unwrap_or("");
        if order_id.is_empty() {
            return Err(ApiError::Validation("Webhook carries no order id.".into()));
        }

        match kind {
            "payment.captured" => {
                if let Some(balance) = Self::apply_capture(pool, order_id, payment_id).await? {
                    tracing::info!(
                        "Recharge captured for gateway order {order_id}; new balance {balance}"
                    );
                }
            }
            "payment.failed" => Self::apply_failure(pool, order_id).await?,
            other => {
                tracing::debug!("Ignoring webhook event '{other}'");
            }
        }
        Ok(())
    }

    /// Verify the `order_id|payment_id` signature the client posts back
    /// after checkout.
    pub fn verify_checkout_signature(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature_hex: &str,
    ) -> bool {
        let message = format!("{gateway_order_id}|{payment_id}");
        hmac_valid(&self.key_secret, message.as_bytes(), signature_hex)
    }

    /// Verify a webhook delivery against the raw request body. Returns false
    /// when no webhook secret is configured — unverifiable deliveries are
    /// never trusted.
    pub fn verify_webhook_signature(&self, body: &[u8], signature_hex: &str) -> bool {
        match self.webhook_secret.as_deref() {
            Some(secret) => hmac_valid(secret, body, signature_hex),
            None => false,
        }
    }

    /// Apply a verified capture: flip the recharge order to captured exactly
    /// once and credit the wallet. Re-deliveries of the same event find the
    /// order already captured and do nothing.
    pub async fn apply_capture(
        pool: &PgPool,
        gateway_order_id: &str,
        payment_id: &str,
    ) -> ApiResult<Option<i64>> {
        let mut tx = pool.begin().await?;

        let captured: Option<(OwnerKind, Uuid, i64)> = sqlx::query_as(
            r#"UPDATE payment_orders
               SET status = 'captured', updated_at = NOW()
               WHERE gateway_order_id = $1 AND status = 'created'
               RETURNING owner_kind, owner_id, amount_paise"#,
        )
        .bind(gateway_order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((owner_kind, owner_id, amount_paise)) = captured else {
            // Unknown order id or already processed — nothing to apply.
            tx.commit().await?;
            return Ok(None);
        };

        let account = match owner_kind {
            OwnerKind::Student => AccountRef::Student(owner_id),
            OwnerKind::Guest => AccountRef::Guest(owner_id),
        };
        let new_balance = WalletService::credit(
            &mut tx,
            account,
            amount_paise,
            "Wallet recharge via payment gateway",
            Some(payment_id),
        )
        .await?;

        tx.commit().await?;
        Ok(Some(new_balance))
    }

    /// Mark a recharge order failed (webhook `payment.failed`).
    pub async fn apply_failure(pool: &PgPool, gateway_order_id: &str) -> ApiResult<()> {
        sqlx::query(
            r#"UPDATE payment_orders
               SET status = 'failed', updated_at = NOW()
               WHERE gateway_order_id = $1 AND status = 'created'"#,
        )
        .bind(gateway_order_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

fn hmac_valid(secret: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, message: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_correctly_signed_message() {
        let secret = "whsec_test";
        let body = br#"{"event":"payment.captured"}"#;
        let signature = sign(secret, body);
        assert!(hmac_valid(secret, body, &signature));
    }

    #[test]
    fn rejects_tampered_bodies_and_wrong_secrets() {
        let secret = "whsec_test";
        let body = br#"{"event":"payment.captured"}"#;
        let signature = sign(secret, body);

        assert!(!hmac_valid(secret, br#"{"event":"payment.failed"}"#, &signature));
        assert!(!hmac_valid("another_secret", body, &signature));
        assert!(!hmac_valid(secret, body, "not-hex"));
        assert!(!hmac_valid(secret, body, ""));
    }
}
