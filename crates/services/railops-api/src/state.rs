use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use uuid::Uuid;

use railops_vault::Vault;

use crate::auth::JwtConfig;
use crate::auth_handlers::LoginThrottle;
use crate::bonus::BonusEngine;
use crate::config::AppConfig;
use crate::google::{DriveDispatcher, OAuthService, ServiceAccounts, SheetsClient};
use crate::pending::PendingLedger;
use crate::profiles::ProfileService;
use crate::rewards::RewardEngine;
use crate::scoring::ScoringEngine;
use crate::store::Store;
use crate::sync::SyncService;

type KeyedLimiter<K> = RateLimiter<K, DefaultKeyedStateStore<K>, DefaultClock>;

/// Keyed rate limiters for the two routes that need them.
pub struct RateLimits {
    /// Login attempts per client IP.
    pub login: KeyedLimiter<String>,
    /// Document generation per actor.
    pub document_generation: KeyedLimiter<Uuid>,
}

impl Default for RateLimits {
    fn default() -> Self {
        let ten = NonZeroU32::new(10).expect("nonzero");
        let five = NonZeroU32::new(5).expect("nonzero");
        RateLimits {
            login: RateLimiter::keyed(Quota::per_minute(ten)),
            document_generation: RateLimiter::keyed(Quota::per_minute(five)),
        }
    }
}

/// Everything a request handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub vault: Arc<Vault>,
    pub jwt: Arc<JwtConfig>,
    pub scoring: Arc<ScoringEngine>,
    pub bonus: Arc<BonusEngine>,
    pub rewards: Arc<RewardEngine>,
    pub profiles: Arc<ProfileService>,
    pub pending: Arc<PendingLedger>,
    pub drive: Arc<DriveDispatcher>,
    pub oauth: Arc<OAuthService>,
    pub sheets: Arc<SheetsClient>,
    pub sync: Arc<SyncService>,
    pub limits: Arc<RateLimits>,
    pub throttle: Arc<LoginThrottle>,
}

impl AppState {
    /// Wire the service graph over a concrete store implementation.
    pub fn build<S>(
        config: AppConfig,
        store: Arc<S>,
        vault: Vault,
        accounts: ServiceAccounts,
    ) -> AppState
    where
        S: Store + Send + Sync + 'static,
    {
        let config = Arc::new(config);
        let vault = Arc::new(vault);
        let store_dyn: Arc<dyn Store> = store.clone();

        let jwt = Arc::new(JwtConfig::new(
            config.api_secret_key.clone(),
            config.access_token_minutes,
            config.refresh_token_days,
        ));

        let scoring = Arc::new(ScoringEngine::new(store_dyn.clone()));
        let bonus = Arc::new(BonusEngine::new(store_dyn.clone(), scoring.clone()));
        let rewards = Arc::new(RewardEngine::new(store_dyn.clone(), scoring.clone()));
        let profiles = Arc::new(ProfileService::new(store_dyn.clone(), scoring.clone()));
        let pending = Arc::new(PendingLedger::new(store.clone()));
        let drive = Arc::new(DriveDispatcher::new(store.clone()));
        let oauth = Arc::new(OAuthService::new(
            config.google.clone(),
            vault.clone(),
            store.clone(),
        ));
        let sheets = Arc::new(SheetsClient::new(
            config.google.sheets_base.clone(),
            Arc::new(accounts),
        ));
        let sync = SyncService::start(
            config.sync_workers,
            store.clone(),
            sheets.clone(),
            config.google.sheet_ids.clone(),
        );

        AppState {
            config,
            store: store_dyn,
            vault,
            jwt,
            scoring,
            bonus,
            rewards,
            profiles,
            pending,
            drive,
            oauth,
            sheets,
            sync,
            limits: Arc::new(RateLimits::default()),
            throttle: Arc::new(LoginThrottle::default()),
        }
    }

    /// Same graph with a test-provided sheets client (pointing at a mock
    /// server or carrying a static token).
    pub fn build_with_sheets<S>(
        config: AppConfig,
        store: Arc<S>,
        vault: Vault,
        sheets: SheetsClient,
    ) -> AppState
    where
        S: Store + Send + Sync + 'static,
    {
        let mut state = Self::build(config, store.clone(), vault, ServiceAccounts::default());
        let sheets = Arc::new(sheets);
        state.sheets = sheets.clone();
        state.sync = SyncService::start(
            state.config.sync_workers,
            store,
            sheets,
            state.config.google.sheet_ids.clone(),
        );
        state
    }
}
