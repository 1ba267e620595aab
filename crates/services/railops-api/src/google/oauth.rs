use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use thiserror::Error;

use railops_types::Department;
use railops_vault::Vault;

use crate::config::GoogleConfig;
use crate::models::OAuthTokenRecord;
use crate::singleflight::Singleflight;
use crate::store::TokenStore;

const STATE_TTL_MINUTES: i64 = 10;
/// Access tokens within this window of expiry are refreshed eagerly.
const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Error, Clone)]
pub enum OAuthError {
    #[error("department has no authorized grant")]
    NotAuthorized,

    #[error("authorization state is unknown, expired, or already used")]
    BadState,

    #[error("identity provider rejected the request: {0}")]
    UpstreamAuthFailure(String),

    #[error("identity provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("stored token failed to decrypt")]
    VaultInconsistency,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<OAuthError> for crate::error::ApiError {
    fn from(err: OAuthError) -> Self {
        use crate::error::ApiError;
        match err {
            OAuthError::NotAuthorized => {
                ApiError::NotFound("department has no authorized grant".to_string())
            }
            OAuthError::BadState => ApiError::validation(err.to_string()),
            OAuthError::UpstreamAuthFailure(msg) => ApiError::UpstreamAuthFailure(msg),
            OAuthError::UpstreamUnavailable(msg) => ApiError::UpstreamUnavailable(msg),
            OAuthError::VaultInconsistency => ApiError::VaultInconsistency,
            OAuthError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingAuth {
    department: Department,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

/// Per-department OAuth grant lifecycle. Refresh-token material only ever
/// leaves this service sealed by the vault; access-token refresh is
/// coalesced so at most one exchange per department is in flight.
pub struct OAuthService {
    http: reqwest::Client,
    config: GoogleConfig,
    vault: Arc<Vault>,
    store: Arc<dyn TokenStore>,
    states: Mutex<HashMap<String, PendingAuth>>,
    refresh_flights: Singleflight<Department, Result<String, OAuthError>>,
}

impl OAuthService {
    pub fn new(config: GoogleConfig, vault: Arc<Vault>, store: Arc<dyn TokenStore>) -> Self {
        OAuthService {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            config,
            vault,
            store,
            states: Mutex::new(HashMap::new()),
            refresh_flights: Singleflight::new(),
        }
    }

    /// Start the authorization-code flow. The returned state token binds the
    /// eventual callback to `department` and expires after ten minutes.
    pub fn begin_authorization(&self, department: Department) -> (String, String) {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        {
            let mut states = self.states.lock().expect("state map lock poisoned");
            states.retain(|_, pending| pending.expires_at > Utc::now());
            states.insert(
                state.clone(),
                PendingAuth {
                    department,
                    expires_at: Utc::now() + Duration::minutes(STATE_TTL_MINUTES),
                },
            );
        }
        let auth_url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&access_type=offline&prompt=consent&scope=https://www.googleapis.com/auth/drive%20email&state={}",
            self.config.oauth_auth_base, self.config.oauth_client_id, self.config.oauth_redirect_uri, state
        );
        (auth_url, state)
    }

    /// Complete the flow: exchange the code, seal the refresh token, upsert
    /// the department row. The state token is single-use.
    pub async fn finalize_authorization(
        &self,
        state: &str,
        code: &str,
    ) -> Result<Department, OAuthError> {
        let pending = {
            let mut states = self.states.lock().expect("state map lock poisoned");
            states.remove(state)
        }
        .filter(|p| p.expires_at > Utc::now())
        .ok_or(OAuthError::BadState)?;

        let response = self
            .http
            .post(&self.config.oauth_token_base)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.config.oauth_client_id),
                ("client_secret", &self.config.oauth_client_secret),
                ("redirect_uri", &self.config.oauth_redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::UpstreamUnavailable(e.to_string()))?;

        let token = parse_token_response(response).await?;
        let refresh_token = token
            .refresh_token
            .ok_or_else(|| OAuthError::UpstreamAuthFailure("no refresh token granted".into()))?;

        let record = OAuthTokenRecord {
            department: pending.department,
            refresh_token_sealed: self.vault.encrypt(refresh_token.as_bytes()),
            access_token_sealed: Some(self.vault.encrypt(token.access_token.as_bytes())),
            access_expires_at: Some(Utc::now() + Duration::seconds(token.expires_in)),
            authorized_email: token
                .id_token
                .as_deref()
                .and_then(email_from_id_token)
                .unwrap_or_else(|| "unknown".to_string()),
            updated_at: Utc::now(),
        };
        self.store
            .upsert_token(record)
            .await
            .map_err(|e| OAuthError::Internal(e.to_string()))?;
        tracing::info!(department = %pending.department, "oauth grant stored");
        Ok(pending.department)
    }

    /// Return a live access token for the department, refreshing through the
    /// singleflight group when the cached one is missing or stale.
    pub async fn acquire_access_token(&self, department: Department) -> Result<String, OAuthError> {
        let record = self
            .store
            .get_token(department)
            .await
            .map_err(|e| OAuthError::Internal(e.to_string()))?
            .ok_or(OAuthError::NotAuthorized)?;

        if let (Some(sealed), Some(expires_at)) =
            (&record.access_token_sealed, record.access_expires_at)
        {
            if expires_at > Utc::now() + Duration::seconds(EXPIRY_SKEW_SECONDS) {
                return self
                    .vault
                    .decrypt_string(sealed)
                    .map_err(|_| OAuthError::VaultInconsistency);
            }
        }

        self.refresh_flights
            .run(department, || self.refresh_access_token(department, record))
            .await
    }

    async fn refresh_access_token(
        &self,
        department: Department,
        record: OAuthTokenRecord,
    ) -> Result<String, OAuthError> {
        let refresh_token = self
            .vault
            .decrypt_string(&record.refresh_token_sealed)
            .map_err(|_| OAuthError::VaultInconsistency)?;

        let response = self
            .http
            .post(&self.config.oauth_token_base)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", &self.config.oauth_client_id),
                ("client_secret", &self.config.oauth_client_secret),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::UpstreamUnavailable(e.to_string()))?;

        let token = parse_token_response(response).await?;

        let mut updated = record;
        updated.access_token_sealed = Some(self.vault.encrypt(token.access_token.as_bytes()));
        updated.access_expires_at = Some(Utc::now() + Duration::seconds(token.expires_in));
        // Google may rotate the refresh token on use.
        if let Some(new_refresh) = &token.refresh_token {
            updated.refresh_token_sealed = self.vault.encrypt(new_refresh.as_bytes());
        }
        updated.updated_at = Utc::now();
        self.store
            .upsert_token(updated)
            .await
            .map_err(|e| OAuthError::Internal(e.to_string()))?;

        tracing::debug!(%department, "access token refreshed");
        Ok(token.access_token)
    }

    pub async fn revoke(&self, department: Department) -> Result<(), OAuthError> {
        self.store
            .delete_token(department)
            .await
            .map_err(|e| OAuthError::Internal(e.to_string()))
    }
}

async fn parse_token_response(
    response: reqwest::Response,
) -> Result<TokenEndpointResponse, OAuthError> {
    let status = response.status();
    if status.is_success() {
        response
            .json::<TokenEndpointResponse>()
            .await
            .map_err(|e| OAuthError::UpstreamAuthFailure(format!("malformed token response: {e}")))
    } else if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        Err(OAuthError::UpstreamAuthFailure(format!("{status}: {body}")))
    } else {
        Err(OAuthError::UpstreamUnavailable(status.to_string()))
    }
}

/// Best-effort email extraction from an id_token payload. The token was just
/// received over TLS from the provider, so its signature is not re-checked.
fn email_from_id_token(id_token: &str) -> Option<String> {
    let payload = id_token.split('.').nth(1)?;
    let raw = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&raw).ok()?;
    value.get("email")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_email_from_id_token() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"email":"ops@railops.example"}"#);
        let token = format!("header.{payload}.sig");
        assert_eq!(
            email_from_id_token(&token).as_deref(),
            Some("ops@railops.example")
        );
        assert_eq!(email_from_id_token("garbage"), None);
    }
}
