use std::collections::BTreeMap;

use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// 统一错误类型，响应体为 {title, errors?, status}
#[derive(Debug)]
pub enum ApiError {
    Unauthenticated,
    InvalidCredentials,
    Forbidden(&'static str),
    NotFound(&'static str),
    Validation(BTreeMap<&'static str, String>),
    RateLimited(u64),
    Database(sqlx::Error),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<BTreeMap<&'static str, String>>,
    status: u16,
}

impl ApiError {
    /// 单字段校验错误的简写
    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field, message.into());
        ApiError::Validation(errors)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (title, errors) = match self {
            ApiError::Unauthenticated => ("Authentication required".to_string(), None),
            ApiError::InvalidCredentials => ("Invalid credentials".to_string(), None),
            ApiError::Forbidden(title) => (title.to_string(), None),
            ApiError::NotFound(title) => (title.to_string(), None),
            ApiError::Validation(errors) => ("Validation Error".to_string(), Some(errors)),
            ApiError::RateLimited(secs) => {
                (format!("Too many requests, retry in {secs} seconds"), None)
            }
            ApiError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                ("Internal Server Error".to_string(), None)
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal Server Error".to_string(), None)
            }
        };

        let body = Json(ErrorBody {
            title,
            errors,
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Database(e)
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(e: bcrypt::BcryptError) -> Self {
        ApiError::Internal(format!("bcrypt failure: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: ApiError) -> serde_json::Value {
        let response = err.into_response();
        let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unauthenticated_is_401() {
        let err = ApiError::Unauthenticated;
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        let json = body_json(err).await;
        assert_eq!(json["title"], "Authentication required");
        assert_eq!(json["status"], 401);
        assert!(json.get("errors").is_none());
    }

    #[tokio::test]
    async fn not_found_carries_resource_title() {
        let json = body_json(ApiError::NotFound("Group couldn't be found")).await;
        assert_eq!(json["title"], "Group couldn't be found");
        assert_eq!(json["status"], 404);
    }

    #[tokio::test]
    async fn validation_exposes_field_map() {
        let err = ApiError::field("about", "About must be 50 characters or more");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let json = body_json(err).await;
        assert_eq!(json["title"], "Validation Error");
        assert_eq!(json["errors"]["about"], "About must be 50 characters or more");
    }

    #[tokio::test]
    async fn database_errors_are_opaque_500() {
        let json = body_json(ApiError::Database(sqlx::Error::RowNotFound)).await;
        assert_eq!(json["title"], "Internal Server Error");
        assert_eq!(json["status"], 500);
    }
}
