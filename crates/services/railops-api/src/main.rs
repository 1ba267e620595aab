use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use railops_api::app::create_app;
use railops_api::auth_handlers::hash_password;
use railops_api::config::AppConfig;
use railops_api::google::ServiceAccounts;
use railops_api::jobs::spawn_background_jobs;
use railops_api::models::{Role, User};
use railops_api::state::AppState;
use railops_api::store::memory::MemoryStore;
use railops_api::store::postgres::PgStore;
use railops_api::store::{AssessmentStore, Store, StoreError, UserStore};
use railops_vault::Vault;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "railops_api=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Strict start-up checks: a production process never serves traffic
    // with default secrets or without its vault key.
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    let vault = match Vault::from_env("ENCRYPTION_KEY", config.environment.is_production()) {
        Ok(vault) => vault,
        Err(e) => {
            eprintln!("vault error: {e}");
            std::process::exit(1);
        }
    };
    let accounts = ServiceAccounts::from_env();
    let production = config.environment.is_production();

    let state = match config.database_url.clone() {
        Some(url) => {
            let store = match PgStore::connect(&url).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    eprintln!("database error: {e}");
                    std::process::exit(1);
                }
            };
            if let Err(e) = bootstrap(store.as_ref()).await {
                eprintln!("bootstrap error: {e}");
                std::process::exit(1);
            }
            AppState::build(config, store, vault, accounts)
        }
        None => {
            if production {
                eprintln!("DATABASE_URL must be set in production");
                std::process::exit(1);
            }
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            let store = Arc::new(MemoryStore::with_builtin_standards());
            if let Err(e) = bootstrap(store.as_ref()).await {
                eprintln!("bootstrap error: {e}");
                std::process::exit(1);
            }
            AppState::build(config, store, vault, accounts)
        }
    };

    state
        .store
        .seed_standards(railops_types::builtin_standards())
        .await
        .expect("standard catalog seeding cannot fail at start-up");

    spawn_background_jobs(state.clone());

    let addr = state.config.bind_addr;
    let app = create_app(state);
    tracing::info!("listening on {addr}");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("bind error on {addr}: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}

/// Ensure an administrator account exists. `ADMIN_USERNAME`/`ADMIN_PASSWORD`
/// drive it; without them a development instance gets a well-known local
/// account.
async fn bootstrap<S: Store + ?Sized>(store: &S) -> Result<(), StoreError> {
    let username = std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
    if store.find_user(&username).await?.is_some() {
        return Ok(());
    }
    let password = match std::env::var("ADMIN_PASSWORD") {
        Ok(password) if !password.trim().is_empty() => password,
        _ => {
            tracing::warn!("ADMIN_PASSWORD not set, bootstrapping {username} with a default password");
            "railops-admin".to_string()
        }
    };
    let hash = hash_password(&password)
        .map_err(|e| StoreError::internal(format!("password hashing failed: {e}")))?;
    store
        .insert_user(User {
            id: Uuid::new_v4(),
            username: username.clone(),
            password_hash: hash,
            role: Role::Admin,
            department: None,
            created_at: Utc::now(),
        })
        .await?;
    tracing::info!(%username, "administrator account created");
    Ok(())
}
