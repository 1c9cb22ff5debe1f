use std::env;

use uuid::Uuid;

use crate::services::pricing::LimitPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub host: String,
    pub port: u16,
    pub app_base_url: String,
    /// Which free-usage caps are enforced when pricing selections.
    pub limit_policy: LimitPolicy,
    /// Thali assigned by the weekend cron to students without a selection.
    pub default_thali_id: Option<Uuid>,
    // SMTP (optional — guest OTP delivery is disabled without it)
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    // Payment gateway (optional — wallet recharge via gateway disabled without it)
    pub payment_key_id: Option<String>,
    pub payment_key_secret: Option<String>,
    pub payment_webhook_secret: Option<String>,
    pub payment_base_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiry_seconds: env::var("JWT_EXPIRY_SECONDS")
                .unwrap_or_else(|_| "86400".into())
                .parse()?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost".into()),
            limit_policy: env::var("LIMIT_POLICY")
                .unwrap_or_else(|_| "both".into())
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?,
            default_thali_id: env::var("DEFAULT_THALI_ID")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.parse())
                .transpose()?,
            smtp_host: env::var("SMTP_HOST").ok().filter(|s| !s.is_empty()),
            smtp_port: env::var("SMTP_PORT").ok().and_then(|v| v.parse().ok()),
            smtp_username: env::var("SMTP_USERNAME").ok().filter(|s| !s.is_empty()),
            smtp_password: env::var("SMTP_PASSWORD").ok().filter(|s| !s.is_empty()),
            smtp_from: env::var("SMTP_FROM").ok().filter(|s| !s.is_empty()),
            payment_key_id: env::var("PAYMENT_KEY_ID").ok().filter(|s| !s.is_empty()),
            payment_key_secret: env::var("PAYMENT_KEY_SECRET").ok().filter(|s| !s.is_empty()),
            payment_webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            payment_base_url: env::var("PAYMENT_BASE_URL")
                .unwrap_or_else(|_| "https://api.razorpay.com/v1".into()),
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
