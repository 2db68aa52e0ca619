use axum::{
    Extension,
    extract::{Json, State},
    http::StatusCode,
};

use crate::AppState;
use crate::error::ApiError;
use crate::utils::{Claims, generate_token, verify_password};

use super::model::{AuthResponse, LoginRequest, RegisterRequest, User};

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let input = req.validate()?;
    let user = User::create(&state.pool, input).await?;

    let token = generate_token(user.id, &state.config)
        .map_err(|e| ApiError::Internal(format!("token generation failed: {e}")))?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            username: user.username,
            token,
        }),
    ))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = User::find_by_credential(&state.pool, &req.credential)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !verify_password(&req.password, &user.hashed_password)? {
        return Err(ApiError::InvalidCredentials);
    }

    let token = generate_token(user.id, &state.config)
        .map_err(|e| ApiError::Internal(format!("token generation failed: {e}")))?;

    Ok(Json(AuthResponse {
        id: user.id,
        first_name: user.first_name,
        last_name: user.last_name,
        username: user.username,
        token,
    }))
}

/// 返回当前登录用户；token 已由认证中间件校验
#[axum::debug_handler]
pub async fn current_user(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> Result<Json<User>, ApiError> {
    let user = User::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or(ApiError::NotFound("User couldn't be found"))?;

    Ok(Json(user))
}
