use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use railops_types::Department;

use crate::google::credentials::ServiceAccounts;
use crate::singleflight::Singleflight;

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
const OUTBOUND_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Error, Clone)]
pub enum SheetsError {
    #[error("no service account configured for {0}")]
    NotConfigured(Department),

    #[error("spreadsheet or sheet tab not found")]
    NotFound,

    #[error("service account lacks access to the spreadsheet")]
    PermissionDenied,

    #[error("spreadsheet service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SheetsError> for crate::error::ApiError {
    fn from(err: SheetsError) -> Self {
        use crate::error::ApiError;
        match err {
            SheetsError::NotFound => ApiError::NotFound("sheet tab".to_string()),
            SheetsError::NotConfigured(d) => {
                ApiError::validation(format!("no service account for {d}"))
            }
            SheetsError::PermissionDenied => {
                ApiError::UpstreamAuthFailure("sheets permission denied".to_string())
            }
            SheetsError::Unavailable(msg) => ApiError::UpstreamUnavailable(msg),
            SheetsError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct AssertionTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Read-only Google Sheets client authenticated per department with its
/// service account. Bearer tokens are cached and refreshed through a
/// singleflight group, one flight per department.
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: String,
    accounts: Arc<ServiceAccounts>,
    token_cache: Mutex<HashMap<Department, (String, DateTime<Utc>)>>,
    token_flights: Singleflight<Department, Result<String, SheetsError>>,
    /// Test hook: a fixed bearer token that bypasses the assertion flow.
    static_token: Option<String>,
}

impl SheetsClient {
    pub fn new(base_url: String, accounts: Arc<ServiceAccounts>) -> Self {
        SheetsClient {
            http: reqwest::Client::builder()
                .timeout(StdDuration::from_secs(OUTBOUND_TIMEOUT_SECONDS))
                .build()
                .unwrap_or_default(),
            base_url,
            accounts,
            token_cache: Mutex::new(HashMap::new()),
            token_flights: Singleflight::new(),
            static_token: None,
        }
    }

    pub fn with_static_token(mut self, token: impl Into<String>) -> Self {
        self.static_token = Some(token.into());
        self
    }

    /// Fetch a whole sheet tab as rows of strings.
    pub async fn read_tab(
        &self,
        department: Department,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> Result<Vec<Vec<String>>, SheetsError> {
        let token = self.bearer_token(department).await?;

        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| SheetsError::Internal(format!("bad sheets base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::Internal("sheets base url cannot be a base".into()))?
            .extend(["v4", "spreadsheets", spreadsheet_id, "values", sheet_name]);
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");

        let response = self
            .http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| SheetsError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let body: ValuesResponse = response
                    .json()
                    .await
                    .map_err(|e| SheetsError::Internal(format!("malformed values body: {e}")))?;
                Ok(body.values)
            }
            reqwest::StatusCode::NOT_FOUND => Err(SheetsError::NotFound),
            reqwest::StatusCode::BAD_REQUEST => Err(SheetsError::NotFound),
            reqwest::StatusCode::FORBIDDEN | reqwest::StatusCode::UNAUTHORIZED => {
                Err(SheetsError::PermissionDenied)
            }
            status => Err(SheetsError::Unavailable(status.to_string())),
        }
    }

    async fn bearer_token(&self, department: Department) -> Result<String, SheetsError> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }
        {
            let cache = self.token_cache.lock().expect("token cache lock poisoned");
            if let Some((token, expires_at)) = cache.get(&department) {
                if *expires_at > Utc::now() + Duration::seconds(60) {
                    return Ok(token.clone());
                }
            }
        }
        self.token_flights
            .run(department, || self.exchange_assertion(department))
            .await
    }

    async fn exchange_assertion(&self, department: Department) -> Result<String, SheetsError> {
        let key = self
            .accounts
            .get(department)
            .ok_or(SheetsError::NotConfigured(department))?;

        let now = Utc::now();
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: SHEETS_SCOPE,
            aud: &key.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(10)).timestamp(),
        };
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| SheetsError::Internal(format!("service-account key invalid: {e}")))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| SheetsError::Internal(format!("assertion signing failed: {e}")))?;

        let response = self
            .http
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SheetsError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return if status.is_client_error() {
                Err(SheetsError::PermissionDenied)
            } else {
                Err(SheetsError::Unavailable(status.to_string()))
            };
        }

        let token: AssertionTokenResponse = response
            .json()
            .await
            .map_err(|e| SheetsError::Internal(format!("malformed token body: {e}")))?;

        let mut cache = self.token_cache.lock().expect("token cache lock poisoned");
        cache.insert(
            department,
            (
                token.access_token.clone(),
                now + Duration::seconds(token.expires_in),
            ),
        );
        Ok(token.access_token)
    }
}
