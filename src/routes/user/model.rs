use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::ApiError;
use crate::utils::hash_password;

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug)]
pub struct ValidRegistration {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub credential: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub token: String,
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.contains(char::is_whitespace)
}

impl RegisterRequest {
    pub fn validate(self) -> Result<ValidRegistration, ApiError> {
        let mut errors: BTreeMap<&'static str, String> = BTreeMap::new();

        let first_name = self.first_name.unwrap_or_default();
        if first_name.trim().is_empty() {
            errors.insert("firstName", "First Name is required".into());
        }
        let last_name = self.last_name.unwrap_or_default();
        if last_name.trim().is_empty() {
            errors.insert("lastName", "Last Name is required".into());
        }

        let username = self.username.unwrap_or_default();
        let username_len = username.chars().count();
        if !(4..=30).contains(&username_len) {
            errors.insert("username", "Username must be between 4 and 30 characters".into());
        } else if looks_like_email(&username) {
            errors.insert("username", "Username cannot be an email".into());
        }

        let email = self.email.unwrap_or_default();
        if !looks_like_email(&email) {
            errors.insert("email", "Invalid email".into());
        }

        let password = self.password.unwrap_or_default();
        if password.chars().count() < 6 {
            errors.insert("password", "Password must be 6 characters or more".into());
        }

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }
        Ok(ValidRegistration {
            first_name,
            last_name,
            username,
            email,
            password,
        })
    }
}

impl User {
    pub async fn create(pool: &PgPool, input: ValidRegistration) -> Result<Self, ApiError> {
        let hashed_password = hash_password(&input.password)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (first_name, last_name, username, email, hashed_password)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, first_name, last_name, username, email, hashed_password
            "#,
        )
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.username)
        .bind(&input.email)
        .bind(&hashed_password)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            // 唯一约束冲突映射为字段级校验错误
            if let sqlx::Error::Database(db) = &e {
                if db.constraint() == Some("users_username_key") {
                    return ApiError::field("username", "User with that username already exists");
                }
                if db.constraint() == Some("users_email_key") {
                    return ApiError::field("email", "User with that email already exists");
                }
            }
            ApiError::Database(e)
        })?;

        Ok(user)
    }

    /// 支持用户名或邮箱登录
    pub async fn find_by_credential(
        pool: &PgPool,
        credential: &str,
    ) -> Result<Option<Self>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, username, email, hashed_password
            FROM users
            WHERE username = $1 OR email = $1
            "#,
        )
        .bind(credential)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, user_id: i64) -> Result<Option<Self>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, username, email, hashed_password
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_request() -> RegisterRequest {
        RegisterRequest {
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            username: Some("ada_lovelace".into()),
            email: Some("ada@example.com".into()),
            password: Some("engine123".into()),
        }
    }

    #[test]
    fn valid_registration_passes() {
        assert!(full_request().validate().is_ok());
    }

    #[test]
    fn username_length_bounds() {
        let mut req = full_request();
        req.username = Some("abc".into());
        assert!(req.validate().is_err());

        let mut req = full_request();
        req.username = Some("abcd".into());
        assert!(req.validate().is_ok());

        let mut req = full_request();
        req.username = Some("x".repeat(31));
        assert!(req.validate().is_err());
    }

    #[test]
    fn username_cannot_be_an_email() {
        let mut req = full_request();
        req.username = Some("ada@example.com".into());
        let err = req.validate().unwrap_err();
        match err {
            ApiError::Validation(errors) => assert!(errors.contains_key("username")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn missing_fields_are_reported_per_field() {
        let req = RegisterRequest {
            first_name: None,
            last_name: None,
            username: None,
            email: None,
            password: None,
        };
        match req.validate().unwrap_err() {
            ApiError::Validation(errors) => {
                assert!(errors.contains_key("firstName"));
                assert!(errors.contains_key("lastName"));
                assert!(errors.contains_key("username"));
                assert!(errors.contains_key("email"));
                assert!(errors.contains_key("password"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn email_shape_is_checked() {
        for bad in ["plain", "a@b", "a @b.com", "@b.com", "a@.com"] {
            let mut req = full_request();
            req.email = Some(bad.into());
            assert!(req.validate().is_err(), "{bad} should be rejected");
        }
        assert!(looks_like_email("person@mail.example.org"));
    }

    #[test]
    fn secrets_never_serialize_by_default() {
        let user = User {
            id: 1,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            username: "ada_lovelace".into(),
            email: "ada@example.com".into(),
            hashed_password: "$2b$12$abcdefghijklmnopqrstuv".into(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("email").is_none());
        assert!(json.get("hashedPassword").is_none());
        assert_eq!(json["firstName"], "Ada");
    }
}
