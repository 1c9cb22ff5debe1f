use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
pub enum UserRole {
    Student,
    Admin,
    SuperAdmin,
}

impl UserRole {
    pub fn is_admin(self) -> bool {
        matches!(self, UserRole::Admin | UserRole::SuperAdmin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserRole::Student => "student",
            UserRole::Admin => "admin",
            UserRole::SuperAdmin => "super_admin",
        };
        write!(f, "{s}")
    }
}

/// Which wallet/token table an identity lives in. Students and admins are
/// `users` rows; guests are OTP-verified `guests` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "owner_kind", rename_all = "snake_case")]
pub enum OwnerKind {
    Student,
    Guest,
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnerKind::Student => write!(f, "student"),
            OwnerKind::Guest => write!(f, "guest"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub room_no: Option<String>,
    pub role: UserRole,
    pub wallet_balance_paise: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Guest {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub wallet_balance_paise: i64,
    #[serde(skip_serializing)]
    pub otp_hash: Option<String>,
    #[serde(skip_serializing)]
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Request/Response DTOs

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub room_no: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub room_no: Option<String>,
    pub role: UserRole,
    pub wallet_balance: String,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            room_no: u.room_no,
            role: u.role,
            wallet_balance: super::wallet::format_paise(u.wallet_balance_paise),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RequestOtpRequest {
    pub name: Option<String>,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Serialize)]
pub struct GuestLoginResponse {
    pub access_token: String,
    pub guest: GuestProfile,
}

#[derive(Debug, Serialize)]
pub struct GuestProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub wallet_balance: String,
}

impl From<Guest> for GuestProfile {
    fn from(g: Guest) -> Self {
        Self {
            id: g.id,
            name: g.name,
            email: g.email,
            wallet_balance: super::wallet::format_paise(g.wallet_balance_paise),
        }
    }
}
