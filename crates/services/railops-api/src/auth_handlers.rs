use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Duration, Utc};

use crate::auth::{issue_token, validate_token, AuthError, CurrentUser, TokenKind};
use crate::error::ApiError;
use crate::models::{
    ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest, RefreshResponse,
    UserSummary,
};
use crate::state::AppState;
use crate::store::UserStore;

const MAX_FAILURES: usize = 10;
const FAILURE_WINDOW_MINUTES: i64 = 10;
const LOCK_MINUTES: i64 = 15;

/// Failed-login tracking per username: ten failures inside ten minutes lock
/// the account for fifteen.
#[derive(Default)]
pub struct LoginThrottle {
    inner: Mutex<HashMap<String, ThrottleEntry>>,
}

#[derive(Default, Clone)]
struct ThrottleEntry {
    failures: Vec<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
}

impl LoginThrottle {
    pub fn check(&self, username: &str) -> Result<(), AuthError> {
        let now = Utc::now();
        let map = self.inner.lock().expect("throttle lock poisoned");
        if let Some(entry) = map.get(username) {
            if let Some(until) = entry.locked_until {
                if until > now {
                    return Err(AuthError::TooManyAttempts {
                        retry_after_seconds: (until - now).num_seconds().max(0) as u64,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn record_failure(&self, username: &str) {
        let now = Utc::now();
        let window_start = now - Duration::minutes(FAILURE_WINDOW_MINUTES);
        let mut map = self.inner.lock().expect("throttle lock poisoned");
        let entry = map.entry(username.to_string()).or_default();
        entry.failures.retain(|t| *t > window_start);
        entry.failures.push(now);
        if entry.failures.len() >= MAX_FAILURES {
            entry.locked_until = Some(now + Duration::minutes(LOCK_MINUTES));
            entry.failures.clear();
            tracing::warn!(username, "login locked after repeated failures");
        }
    }

    pub fn record_success(&self, username: &str) {
        let mut map = self.inner.lock().expect("throttle lock poisoned");
        map.remove(username);
    }
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn client_ip(headers: &HeaderMap, addr: Option<&SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| addr.map(|a| a.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// POST /api/auth/login
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let ip = client_ip(&headers, connect_info.as_ref().map(|c| &c.0));
    if state.limits.login.check_key(&ip).is_err() {
        return Err(ApiError::RateLimited {
            retry_after_seconds: 60,
        });
    }

    state.throttle.check(&request.username).map_err(auth_to_api)?;

    let user = state.store.find_user(&request.username).await?;
    let Some(user) = user.filter(|u| verify_password(&request.password, &u.password_hash)) else {
        state.throttle.record_failure(&request.username);
        return Err(auth_to_api(AuthError::BadCredentials));
    };
    state.throttle.record_success(&request.username);

    let access_token = issue_token(&user, TokenKind::Access, &state.jwt).map_err(auth_to_api)?;
    let refresh_token = issue_token(&user, TokenKind::Refresh, &state.jwt).map_err(auth_to_api)?;
    tracing::info!(username = %user.username, "login succeeded");
    Ok(Json(LoginResponse {
        access_token,
        refresh_token,
        user: UserSummary::from(&user),
    }))
}

/// POST /api/auth/refresh
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let claims = validate_token(&request.refresh_token, &state.jwt).map_err(auth_to_api)?;
    if claims.kind != TokenKind::Refresh {
        return Err(ApiError::Unauthorized("refresh token required".to_string()));
    }
    let user = state
        .store
        .find_user_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("user no longer exists".to_string()))?;
    let access_token = issue_token(&user, TokenKind::Access, &state.jwt).map_err(auth_to_api)?;
    Ok(Json(RefreshResponse { access_token }))
}

/// GET /api/auth/me
pub async fn me_handler(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<UserSummary>, ApiError> {
    let user = state
        .store
        .find_user_by_id(user.id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("user no longer exists".to_string()))?;
    Ok(Json(UserSummary::from(&user)))
}

/// POST /api/auth/logout — bearer tokens are stateless; logout is a client
/// side operation and the endpoint just acknowledges.
pub async fn logout_handler(_user: CurrentUser) -> axum::http::StatusCode {
    axum::http::StatusCode::NO_CONTENT
}

/// POST /api/auth/change-password — requires the old password again.
pub async fn change_password_handler(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<axum::http::StatusCode, ApiError> {
    if request.new_password.len() < 8 {
        return Err(ApiError::validation(
            "new password must be at least 8 characters",
        ));
    }
    let stored = state
        .store
        .find_user_by_id(user.id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("user no longer exists".to_string()))?;
    if !verify_password(&request.old_password, &stored.password_hash) {
        return Err(auth_to_api(AuthError::BadCredentials));
    }
    let hash = hash_password(&request.new_password)?;
    state.store.set_password_hash(stored.id, hash).await?;
    tracing::info!(username = %stored.username, "password changed");
    Ok(axum::http::StatusCode::NO_CONTENT)
}

fn auth_to_api(err: AuthError) -> ApiError {
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn throttle_locks_after_ten_failures() {
        let throttle = LoginThrottle::default();
        for _ in 0..9 {
            throttle.record_failure("driver");
        }
        assert!(throttle.check("driver").is_ok());
        throttle.record_failure("driver");
        let err = throttle.check("driver").unwrap_err();
        assert!(matches!(err, AuthError::TooManyAttempts { .. }));
        // Other usernames stay unaffected.
        assert!(throttle.check("someone-else").is_ok());
    }

    #[test]
    fn success_clears_failure_history() {
        let throttle = LoginThrottle::default();
        for _ in 0..5 {
            throttle.record_failure("driver");
        }
        throttle.record_success("driver");
        for _ in 0..9 {
            throttle.record_failure("driver");
        }
        assert!(throttle.check("driver").is_ok());
    }
}
