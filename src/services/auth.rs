use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    auth::Claims,
    user::{
        Guest, GuestLoginResponse, LoginRequest, LoginResponse, OwnerKind, RegisterRequest, User,
        UserRole,
    },
};
use crate::services::{email::EmailService, metrics};

const USER_COLUMNS: &str = "id, name, email, password_hash, room_no, role, wallet_balance_paise, \
                            is_active, created_at, updated_at";
const GUEST_COLUMNS: &str =
    "id, name, email, wallet_balance_paise, otp_hash, otp_expires_at, created_at, updated_at";

const OTP_TTL_MINUTES: i64 = 5;

pub struct AuthService;

impl AuthService {
    /// Student self-registration. Admin accounts are provisioned by the
    /// seeding tool, never through this endpoint.
    pub async fn register(pool: &PgPool, req: &RegisterRequest) -> ApiResult<User> {
        if req.name.trim().is_empty() || req.email.trim().is_empty() {
            return Err(ApiError::Validation("Name and email are required.".into()));
        }
        if req.password.len() < 8 {
            return Err(ApiError::Validation(
                "Password must be at least 8 characters.".into(),
            ));
        }
        let hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)
            .map_err(|e| ApiError::Internal(e.into()))?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"INSERT INTO users (name, email, password_hash, room_no)
               VALUES ($1, $2, $3, $4)
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(req.name.trim())
        .bind(req.email.trim().to_lowercase())
        .bind(hash)
        .bind(&req.room_no)
        .fetch_one(pool)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => {
                ApiError::Conflict("An account with this email already exists.".into())
            }
            other => other,
        })?;
        Ok(user)
    }

    pub async fn login(
        pool: &PgPool,
        req: &LoginRequest,
        jwt_secret: &str,
        expiry_seconds: u64,
    ) -> ApiResult<LoginResponse> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND is_active = TRUE"
        ))
        .bind(req.email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials.".into()))?;

        let valid = bcrypt::verify(&req.password, &user.password_hash)
            .map_err(|_| ApiError::Unauthorized("Invalid credentials.".into()))?;
        if !valid {
            return Err(ApiError::Unauthorized("Invalid credentials.".into()));
        }

        let access_token = Self::sign_token(
            user.id,
            &user.name,
            OwnerKind::Student,
            Some(user.role),
            jwt_secret,
            expiry_seconds,
        )?;
        Ok(LoginResponse {
            access_token,
            user: user.into(),
        })
    }

    pub async fn get_user(pool: &PgPool, user_id: Uuid) -> ApiResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found.".into()))
    }

    /// Step 1 of guest sign-in: create-or-fetch the guest and email a
    /// 6-digit OTP. The code is bcrypt-hashed at rest and expires after
    /// five minutes. Without SMTP configured the code is returned in the
    /// response for development use.
    pub async fn guest_request_otp(
        pool: &PgPool,
        email_svc: Option<&EmailService>,
        name: Option<&str>,
        email: &str,
    ) -> ApiResult<Option<String>> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(ApiError::Validation("Email is required.".into()));
        }

        let otp: String = {
            let mut rng = rand::thread_rng();
            format!("{:06}", rng.gen_range(0..1_000_000u32))
        };
        let otp_hash =
            bcrypt::hash(&otp, bcrypt::DEFAULT_COST).map_err(|e| ApiError::Internal(e.into()))?;
        let expires_at = Utc::now() + chrono::Duration::minutes(OTP_TTL_MINUTES);

        sqlx::query(
            r#"INSERT INTO guests (name, email, otp_hash, otp_expires_at)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (email) DO UPDATE SET
                   otp_hash = EXCLUDED.otp_hash,
                   otp_expires_at = EXCLUDED.otp_expires_at,
                   updated_at = NOW()"#,
        )
        .bind(name.unwrap_or("Guest"))
        .bind(&email)
        .bind(&otp_hash)
        .bind(expires_at)
        .execute(pool)
        .await?;

        match email_svc {
            Some(svc) => {
                svc.send_otp_code(&email, &otp).await.map_err(|e| {
                    metrics::OTP_EMAILS_COUNTER.with_label_values(&["error"]).inc();
                    ApiError::ExternalService(format!("Failed to send OTP email: {e}"))
                })?;
                metrics::OTP_EMAILS_COUNTER.with_label_values(&["sent"]).inc();
                Ok(None)
            }
            None => {
                tracing::warn!("SMTP not configured — returning OTP in response for {email}");
                Ok(Some(otp))
            }
        }
    }

    /// Step 2: verify the OTP, clear it and hand out a guest JWT.
    pub async fn guest_verify_otp(
        pool: &PgPool,
        email: &str,
        otp: &str,
        jwt_secret: &str,
        expiry_seconds: u64,
    ) -> ApiResult<GuestLoginResponse> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || otp.is_empty() {
            return Err(ApiError::Validation("Email and OTP are required.".into()));
        }

        let guest = sqlx::query_as::<_, Guest>(&format!(
            "SELECT {GUEST_COLUMNS} FROM guests WHERE email = $1"
        ))
        .bind(&email)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired OTP.".into()))?;

        let hash = guest
            .otp_hash
            .as_deref()
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired OTP.".into()))?;
        let expired = guest
            .otp_expires_at
            .map(|t| t < Utc::now())
            .unwrap_or(true);
        let valid = bcrypt::verify(otp, hash).unwrap_or(false);
        if expired || !valid {
            return Err(ApiError::Unauthorized("Invalid or expired OTP.".into()));
        }

        // One-shot: a verified code is cleared before the token goes out.
        sqlx::query(
            "UPDATE guests SET otp_hash = NULL, otp_expires_at = NULL, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(guest.id)
        .execute(pool)
        .await?;

        let access_token = Self::sign_token(
            guest.id,
            &guest.name,
            OwnerKind::Guest,
            None,
            jwt_secret,
            expiry_seconds,
        )?;
        Ok(GuestLoginResponse {
            access_token,
            guest: guest.into(),
        })
    }

    pub async fn get_guest(pool: &PgPool, guest_id: Uuid) -> ApiResult<Guest> {
        sqlx::query_as::<_, Guest>(&format!("SELECT {GUEST_COLUMNS} FROM guests WHERE id = $1"))
            .bind(guest_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Guest not found.".into()))
    }

    pub fn sign_token(
        subject: Uuid,
        name: &str,
        kind: OwnerKind,
        role: Option<UserRole>,
        jwt_secret: &str,
        expiry_seconds: u64,
    ) -> ApiResult<String> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: subject.to_string(),
            name: name.to_string(),
            kind,
            role,
            iat: now,
            exp: now + expiry_seconds as usize,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(jwt_secret.as_bytes()),
        )
        .map_err(|e| ApiError::Internal(e.into()))
    }
}
