use std::collections::HashMap;
use std::net::SocketAddr;

use thiserror::Error;

use railops_types::Department;

/// Signing key bundled with development builds; production refuses it.
pub const DEV_DEFAULT_SECRET: &str = "railops-dev-secret-do-not-deploy";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    MissingVar(&'static str),

    #[error("refusing to start with the bundled default {0}")]
    DefaultSecret(&'static str),

    #[error("{var} is not valid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Google-facing settings. Base URLs are overridable so tests can point the
/// clients at a local mock server.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub oauth_client_id: String,
    pub oauth_client_secret: String,
    pub oauth_redirect_uri: String,
    /// `https://accounts.google.com/o/oauth2/v2/auth` unless overridden.
    pub oauth_auth_base: String,
    /// `https://oauth2.googleapis.com/token` unless overridden.
    pub oauth_token_base: String,
    /// `https://sheets.googleapis.com` unless overridden.
    pub sheets_base: String,
    pub sheet_ids: HashMap<Department, String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub bind_addr: SocketAddr,
    pub api_base_url: String,
    pub api_secret_key: String,
    pub database_url: Option<String>,
    pub cors_allowed_origins: Vec<String>,
    pub google: GoogleConfig,
    /// Background sync worker count.
    pub sync_workers: usize,
    /// Local wall-clock hour/minute for the daily schedule sync.
    pub daily_sync_at: (u32, u32),
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_opt(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Load from the process environment. In production posture the signing
    /// key must be present and must not be the bundled default; the vault
    /// key gets the same treatment in `main`.
    pub fn from_env() -> Result<AppConfig, ConfigError> {
        let environment = match env_or("API_ENVIRONMENT", "development").as_str() {
            "production" => Environment::Production,
            _ => Environment::Development,
        };

        let api_secret_key = match env_opt("API_SECRET_KEY") {
            Some(key) => {
                if environment.is_production() && key == DEV_DEFAULT_SECRET {
                    return Err(ConfigError::DefaultSecret("API_SECRET_KEY"));
                }
                key
            }
            None if environment.is_production() => {
                return Err(ConfigError::MissingVar("API_SECRET_KEY"))
            }
            None => DEV_DEFAULT_SECRET.to_string(),
        };

        let bind_addr: SocketAddr = env_or("API_BIND_ADDR", "0.0.0.0:8080")
            .parse()
            .map_err(|e| ConfigError::Invalid {
                var: "API_BIND_ADDR",
                reason: format!("{e}"),
            })?;

        let cors_allowed_origins = env_or("CORS_ALLOWED_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let mut sheet_ids = HashMap::new();
        for department in Department::ALL {
            let var = format!("GOOGLE_SHEETS_ID_{}", department.env_suffix());
            if let Some(id) = env_opt(&var) {
                sheet_ids.insert(department, id);
            }
        }

        let google = GoogleConfig {
            oauth_client_id: env_or("GOOGLE_OAUTH_CLIENT_ID", ""),
            oauth_client_secret: env_or("GOOGLE_OAUTH_CLIENT_SECRET", ""),
            oauth_redirect_uri: env_or(
                "GOOGLE_OAUTH_REDIRECT_URI",
                "http://localhost:8080/api/auth/google/callback",
            ),
            oauth_auth_base: env_or(
                "GOOGLE_OAUTH_AUTH_BASE",
                "https://accounts.google.com/o/oauth2/v2/auth",
            ),
            oauth_token_base: env_or(
                "GOOGLE_OAUTH_TOKEN_BASE",
                "https://oauth2.googleapis.com/token",
            ),
            sheets_base: env_or("GOOGLE_SHEETS_BASE", "https://sheets.googleapis.com"),
            sheet_ids,
        };

        let daily_sync_at = parse_daily_sync(&env_or("DAILY_SYNC_AT", "06:00"))?;

        // Managed-database deployments hand out credential pieces instead of
        // one URL; assemble them when DATABASE_URL itself is absent.
        let database_url = env_opt("DATABASE_URL").or_else(|| {
            let user = env_opt("TIDB_USER")?;
            let password = env_opt("TIDB_PASSWORD")?;
            let host = env_opt("TIDB_HOST")?;
            let port = env_or("TIDB_PORT", "4000");
            let database = env_or("TIDB_DATABASE", "railops");
            Some(format!("postgres://{user}:{password}@{host}:{port}/{database}"))
        });

        Ok(AppConfig {
            environment,
            bind_addr,
            api_base_url: env_or("API_BASE_URL", "http://localhost:8080"),
            api_secret_key,
            database_url,
            cors_allowed_origins,
            google,
            sync_workers: env_or("SYNC_WORKERS", "4").parse().unwrap_or(4),
            daily_sync_at,
            access_token_minutes: 30,
            refresh_token_days: 7,
        })
    }
}

fn parse_daily_sync(raw: &str) -> Result<(u32, u32), ConfigError> {
    let invalid = || ConfigError::Invalid {
        var: "DAILY_SYNC_AT",
        reason: format!("expected HH:MM, got {raw:?}"),
    };
    let (h, m) = raw.split_once(':').ok_or_else(invalid)?;
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_daily_sync_times() {
        assert_eq!(parse_daily_sync("06:00").unwrap(), (6, 0));
        assert_eq!(parse_daily_sync("23:59").unwrap(), (23, 59));
        assert!(parse_daily_sync("24:00").is_err());
        assert!(parse_daily_sync("six").is_err());
    }
}
