use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use railops_types::Department;

use crate::models::{Role, User};

/// JWT configuration shared through request extensions.
#[derive(Clone)]
pub struct JwtConfig {
    pub secret_key: String,
    pub access_minutes: i64,
    pub refresh_days: i64,
}

impl JwtConfig {
    pub fn new(secret_key: String, access_minutes: i64, refresh_days: i64) -> Self {
        JwtConfig {
            secret_key,
            access_minutes,
            refresh_days,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// The claims structure inside access and refresh tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user id).
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<Department>,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingAuthHeader,

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("token validation failed")]
    ValidationFailed,

    #[error("refresh token used where an access token is required")]
    WrongTokenKind,

    #[error("account is locked, try again later")]
    TooManyAttempts { retry_after_seconds: u64 },

    #[error("invalid username or password")]
    BadCredentials,

    #[error("insufficient role for this operation")]
    MissingRole,

    #[error("department access denied")]
    DepartmentMismatch,

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::MissingAuthHeader => {
                (StatusCode::UNAUTHORIZED, "Missing authorization header".to_string())
            }
            AuthError::InvalidTokenFormat => {
                (StatusCode::UNAUTHORIZED, "Invalid token format".to_string())
            }
            AuthError::ValidationFailed => {
                (StatusCode::UNAUTHORIZED, "Token is invalid or expired".to_string())
            }
            AuthError::WrongTokenKind => {
                (StatusCode::UNAUTHORIZED, "Access token required".to_string())
            }
            AuthError::TooManyAttempts {
                retry_after_seconds,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("Too many failed attempts, retry in {retry_after_seconds}s"),
            ),
            AuthError::BadCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid username or password".to_string())
            }
            AuthError::MissingRole => (
                StatusCode::FORBIDDEN,
                "Missing required role for this operation".to_string(),
            ),
            AuthError::DepartmentMismatch => (
                StatusCode::FORBIDDEN,
                "Department access denied".to_string(),
            ),
            AuthError::Internal(msg) => {
                tracing::error!("auth internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        let code = match status {
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::FORBIDDEN => "forbidden",
            StatusCode::TOO_MANY_REQUESTS => "rate_limited",
            _ => "internal_error",
        };
        let body = axum::Json(serde_json::json!({
            "error": { "code": code, "message": message }
        }));
        match status {
            StatusCode::UNAUTHORIZED => {
                (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

/// Issue a token of the given kind for `user`.
pub fn issue_token(user: &User, kind: TokenKind, config: &JwtConfig) -> Result<String, AuthError> {
    let now = Utc::now();
    let lifetime = match kind {
        TokenKind::Access => Duration::minutes(config.access_minutes),
        TokenKind::Refresh => Duration::days(config.refresh_days),
    };
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        role: user.role,
        department: user.department,
        kind,
        iat: now.timestamp(),
        exp: (now + lifetime).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret_key.as_bytes()),
    )
    .map_err(|e| AuthError::Internal(format!("failed to encode JWT: {e}")))
}

pub fn validate_token(token: &str, config: &JwtConfig) -> Result<Claims, AuthError> {
    let mut validation = Validation::default();
    validation.set_required_spec_claims(&["sub", "exp"]);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret_key.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|err| {
        tracing::debug!("JWT validation failed: {err}");
        AuthError::ValidationFailed
    })
}

/// Extractor for authenticated requests. Requires an access token; refresh
/// tokens are only accepted by the refresh endpoint, which validates them
/// explicitly.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub department: Option<Department>,
}

impl CurrentUser {
    /// Read access: Admin and Manager see every department, Staff only its
    /// own.
    pub fn can_read(&self, department: Department) -> bool {
        match self.role {
            Role::Admin | Role::Manager => true,
            Role::Staff => self.department == Some(department),
        }
    }

    /// Write access: Manager is read-only everywhere, Staff writes only its
    /// own department.
    pub fn can_write(&self, department: Department) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Manager => false,
            Role::Staff => self.department == Some(department),
        }
    }

    pub fn ensure_can_read(&self, department: Department) -> Result<(), AuthError> {
        if self.can_read(department) {
            Ok(())
        } else {
            Err(AuthError::DepartmentMismatch)
        }
    }

    pub fn ensure_can_write(&self, department: Department) -> Result<(), AuthError> {
        if self.can_write(department) {
            Ok(())
        } else if self.role == Role::Manager {
            Err(AuthError::MissingRole)
        } else {
            Err(AuthError::DepartmentMismatch)
        }
    }

    pub fn ensure_admin(&self) -> Result<(), AuthError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AuthError::MissingRole)
        }
    }

    /// Departments this user may read. `None` means all of them.
    pub fn readable_departments(&self) -> Option<Department> {
        match self.role {
            Role::Admin | Role::Manager => None,
            Role::Staff => self.department,
        }
    }
}

impl From<Claims> for CurrentUser {
    fn from(claims: Claims) -> Self {
        CurrentUser {
            id: claims.sub,
            username: claims.username,
            role: claims.role,
            department: claims.department,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let config = parts
            .extensions
            .get::<Arc<JwtConfig>>()
            .ok_or_else(|| AuthError::Internal("JWT config not found".to_string()))?
            .clone();

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?;
        let auth_header = auth_header
            .to_str()
            .map_err(|_| AuthError::InvalidTokenFormat)?;
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidTokenFormat)?;

        let claims = validate_token(token, &config)?;
        if claims.kind != TokenKind::Access {
            return Err(AuthError::WrongTokenKind);
        }
        Ok(claims.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, department: Option<Department>) -> User {
        User {
            id: Uuid::new_v4(),
            username: "driver-ops".to_string(),
            password_hash: String::new(),
            role,
            department,
            created_at: Utc::now(),
        }
    }

    fn config() -> JwtConfig {
        JwtConfig::new("test-secret".to_string(), 30, 7)
    }

    #[test]
    fn access_tokens_round_trip() {
        let user = user(Role::Staff, Some(Department::Tanhai));
        let token = issue_token(&user, TokenKind::Access, &config()).unwrap();
        let claims = validate_token(&token, &config()).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.department, Some(Department::Tanhai));
    }

    #[test]
    fn tokens_from_other_secret_fail() {
        let user = user(Role::Admin, None);
        let token = issue_token(&user, TokenKind::Access, &config()).unwrap();
        let other = JwtConfig::new("different".to_string(), 30, 7);
        assert!(validate_token(&token, &other).is_err());
    }

    #[test]
    fn role_matrix() {
        let admin = CurrentUser {
            id: Uuid::new_v4(),
            username: "a".into(),
            role: Role::Admin,
            department: None,
        };
        let manager = CurrentUser {
            id: Uuid::new_v4(),
            username: "m".into(),
            role: Role::Manager,
            department: None,
        };
        let staff = CurrentUser {
            id: Uuid::new_v4(),
            username: "s".into(),
            role: Role::Staff,
            department: Some(Department::Tanhai),
        };

        assert!(admin.can_write(Department::Ankeng));
        assert!(manager.can_read(Department::Ankeng));
        assert!(!manager.can_write(Department::Ankeng));
        assert!(staff.can_read(Department::Tanhai));
        assert!(staff.can_write(Department::Tanhai));
        assert!(!staff.can_read(Department::Ankeng));
        assert!(!staff.can_write(Department::Ankeng));
    }
}
