use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::models::auth::{
    AdminUser, AuthenticatedAccount, AuthenticatedGuest, AuthenticatedUser, Claims,
};
use crate::models::user::{OwnerKind, UserRole};

/// Extension type to carry the JWT secret through request extensions.
#[derive(Clone)]
pub struct JwtSecret(pub String);

fn bearer_token<'a>(parts: &'a Parts) -> Result<&'a str, (StatusCode, &'static str)> {
    let auth_header = parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "Missing Authorization header"))?;
    auth_header
        .strip_prefix("Bearer ")
        .ok_or((StatusCode::UNAUTHORIZED, "Invalid Authorization header format"))
}

fn decode_claims(parts: &Parts) -> Result<Claims, (StatusCode, &'static str)> {
    let token = bearer_token(parts)?;
    let secret = parts
        .extensions
        .get::<JwtSecret>()
        .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "JWT secret not configured"))?;
    decode_access_token(token, &secret.0)
        .map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid or expired token"))
}

pub fn decode_access_token(token: &str, secret: &str) -> Result<Claims, anyhow::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let data = decode::<Claims>(token, &key, &validation)?;
    Ok(data.claims)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = decode_claims(parts)?;
        if claims.kind != OwnerKind::Student {
            return Err((StatusCode::FORBIDDEN, "Student or staff account required"));
        }
        let role = claims
            .role
            .ok_or((StatusCode::UNAUTHORIZED, "Token carries no role"))?;
        Ok(AuthenticatedUser {
            user_id: claims
                .sub
                .parse()
                .map_err(|_| (StatusCode::UNAUTHORIZED, "Malformed token subject"))?,
            name: claims.name,
            role,
        })
    }
}

impl<S> FromRequestParts<S> for AuthenticatedGuest
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = decode_claims(parts)?;
        if claims.kind != OwnerKind::Guest {
            return Err((StatusCode::FORBIDDEN, "Guest account required"));
        }
        Ok(AuthenticatedGuest {
            guest_id: claims
                .sub
                .parse()
                .map_err(|_| (StatusCode::UNAUTHORIZED, "Malformed token subject"))?,
            name: claims.name,
        })
    }
}

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.role.is_admin() {
            return Err((StatusCode::FORBIDDEN, "Admin access required"));
        }
        Ok(AdminUser(user))
    }
}

impl<S> FromRequestParts<S> for AuthenticatedAccount
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = decode_claims(parts)?;
        Ok(AuthenticatedAccount {
            owner_kind: claims.kind,
            owner_id: claims
                .sub
                .parse()
                .map_err(|_| (StatusCode::UNAUTHORIZED, "Malformed token subject"))?,
            name: claims.name,
        })
    }
}

impl AdminUser {
    pub fn require_role(&self, role: UserRole) -> Result<(), crate::error::ApiError> {
        if self.0.role == role || self.0.role == UserRole::SuperAdmin {
            Ok(())
        } else {
            Err(crate::error::ApiError::Forbidden(
                "Insufficient privileges".into(),
            ))
        }
    }
}
