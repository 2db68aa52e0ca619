use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{AppState, error::ApiError, utils::verify_token};

/// 校验 Bearer token，并把解析出的 Claims 挂到请求扩展上
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(ApiError::Unauthenticated)?;

    let claims =
        verify_token(bearer.token(), &state.config).map_err(|_| ApiError::Unauthenticated)?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
