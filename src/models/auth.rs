use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::{OwnerKind, UserRole};

/// Claims embedded in the JWT access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user or guest UUID
    pub name: String,
    pub kind: OwnerKind,
    /// Only present for `users` rows; guests carry no role.
    pub role: Option<UserRole>,
    pub exp: usize,
    pub iat: usize,
}

/// Extracted from a validated student/admin JWT — available via Axum extractors.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub name: String,
    pub role: UserRole,
}

/// Extracted from a validated guest JWT.
#[derive(Debug, Clone)]
pub struct AuthenticatedGuest {
    pub guest_id: Uuid,
    pub name: String,
}

/// Extractor wrapper that additionally requires an admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

/// Any wallet-holding identity — student/admin or guest. Used by endpoints
/// that serve both kinds (e.g. gateway recharge).
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount {
    pub owner_kind: OwnerKind,
    pub owner_id: Uuid,
    pub name: String,
}

impl AuthenticatedAccount {
    pub fn account_ref(&self) -> crate::models::wallet::AccountRef {
        match self.owner_kind {
            OwnerKind::Student => crate::models::wallet::AccountRef::Student(self.owner_id),
            OwnerKind::Guest => crate::models::wallet::AccountRef::Guest(self.owner_id),
        }
    }
}
