use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    error::ApiError,
    middleware::rate_limit::check_rate_limit,
    models::{
        auth::AuthenticatedUser,
        user::{LoginRequest, RegisterRequest, RequestOtpRequest, UserProfile, VerifyOtpRequest},
    },
    services::auth::AuthService,
    AppState,
};

/// POST /auth/register — student self-registration.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user = AuthService::register(&state.db, &body).await?;
    let profile: UserProfile = user.into();
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Account created. You can now log in.", "user": profile })),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    // Rate limit: 5 attempts per 15 min per email
    let rate_key = format!("rate:login:{}", body.email.to_lowercase());
    let mut redis = state.redis.clone();
    check_rate_limit(&mut redis, &rate_key, 5, 900).await?;

    let response = AuthService::login(
        &state.db,
        &body,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
    )
    .await?;
    Ok(Json(serde_json::to_value(response).map_err(|e| ApiError::Internal(e.into()))?))
}

/// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    let profile: UserProfile = AuthService::get_user(&state.db, user.user_id).await?.into();
    Ok(Json(serde_json::to_value(profile).map_err(|e| ApiError::Internal(e.into()))?))
}

/// POST /auth/guest/request-otp
pub async fn guest_request_otp(
    State(state): State<AppState>,
    Json(body): Json<RequestOtpRequest>,
) -> Result<Json<Value>, ApiError> {
    // Rate limit: 3 OTP requests per 15 min per email
    let rate_key = format!("rate:otp:{}", body.email.to_lowercase());
    let mut redis = state.redis.clone();
    check_rate_limit(&mut redis, &rate_key, 3, 900).await?;

    let dev_otp = AuthService::guest_request_otp(
        &state.db,
        state.email.as_deref(),
        body.name.as_deref(),
        &body.email,
    )
    .await?;

    let mut response = json!({ "message": format!("OTP sent to {}", body.email) });
    if let Some(otp) = dev_otp {
        // SMTP not configured — development convenience only.
        response["otp"] = json!(otp);
    }
    Ok(Json(response))
}

/// POST /auth/guest/verify-otp
pub async fn guest_verify_otp(
    State(state): State<AppState>,
    Json(body): Json<VerifyOtpRequest>,
) -> Result<Json<Value>, ApiError> {
    // Rate limit: 10 attempts per 15 min per email
    let rate_key = format!("rate:otp-verify:{}", body.email.to_lowercase());
    let mut redis = state.redis.clone();
    check_rate_limit(&mut redis, &rate_key, 10, 900).await?;

    let response = AuthService::guest_verify_otp(
        &state.db,
        &body.email,
        &body.otp,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
    )
    .await?;
    Ok(Json(serde_json::to_value(response).map_err(|e| ApiError::Internal(e.into()))?))
}
