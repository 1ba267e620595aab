//! OAuth token lifecycle against a mocked identity provider.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use railops_api::config::GoogleConfig;
use railops_api::google::OAuthService;
use railops_api::models::OAuthTokenRecord;
use railops_api::store::memory::MemoryStore;
use railops_api::store::TokenStore;
use railops_types::Department;
use railops_vault::Vault;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn google_config(server: &MockServer) -> GoogleConfig {
    GoogleConfig {
        oauth_client_id: "client-id".to_string(),
        oauth_client_secret: "client-secret".to_string(),
        oauth_redirect_uri: "http://localhost:8080/api/auth/google/callback".to_string(),
        oauth_auth_base: format!("{}/auth", server.uri()),
        oauth_token_base: format!("{}/token", server.uri()),
        sheets_base: server.uri(),
        sheet_ids: HashMap::new(),
    }
}

fn vault() -> Vault {
    Vault::new(&[9u8; 32])
}

async fn seed_grant(store: &MemoryStore, vault: &Vault, expired: bool) {
    store
        .upsert_token(OAuthTokenRecord {
            department: Department::Tanhai,
            refresh_token_sealed: vault.encrypt(b"refresh-token-material"),
            access_token_sealed: Some(vault.encrypt(b"stale-access-token")),
            access_expires_at: Some(if expired {
                Utc::now() - Duration::minutes(5)
            } else {
                Utc::now() + Duration::minutes(20)
            }),
            authorized_email: "ops@railops.example".to_string(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn fifty_concurrent_acquires_coalesce_into_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "fresh-access-token",
                    "expires_in": 3600,
                    "token_type": "Bearer"
                }))
                .set_delay(std::time::Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let vault = vault();
    seed_grant(&store, &vault, true).await;
    let service = Arc::new(OAuthService::new(
        google_config(&server),
        Arc::new(vault),
        store.clone(),
    ));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.acquire_access_token(Department::Tanhai).await
        }));
    }
    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert_eq!(token, "fresh-access-token");
    }

    // The stored row now carries the new sealed access token.
    let record = store.get_token(Department::Tanhai).await.unwrap().unwrap();
    assert!(record.access_expires_at.unwrap() > Utc::now());
}

#[tokio::test]
async fn valid_cached_access_token_skips_the_provider() {
    let server = MockServer::start().await;
    // No mock mounted: any outbound call would 404 and fail the test.
    let store = Arc::new(MemoryStore::new());
    let vault = vault();
    seed_grant(&store, &vault, false).await;
    let service = OAuthService::new(google_config(&server), Arc::new(vault), store);

    let token = service.acquire_access_token(Department::Tanhai).await.unwrap();
    assert_eq!(token, "stale-access-token");
}

#[tokio::test]
async fn missing_grant_is_not_authorized() {
    let server = MockServer::start().await;
    let service = OAuthService::new(
        google_config(&server),
        Arc::new(vault()),
        Arc::new(MemoryStore::new()),
    );
    let err = service
        .acquire_access_token(Department::Ankeng)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no authorized grant"));
}

#[tokio::test]
async fn wrong_vault_key_surfaces_as_vault_inconsistency() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let other_vault = Vault::new(&[1u8; 32]);
    seed_grant(&store, &other_vault, true).await;
    let service = OAuthService::new(google_config(&server), Arc::new(vault()), store);

    let err = service
        .acquire_access_token(Department::Tanhai)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("decrypt"));
}

#[tokio::test]
async fn authorization_flow_stores_sealed_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "first-access-token",
            "expires_in": 3600,
            "refresh_token": "granted-refresh-token",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let vault = Arc::new(vault());
    let service = OAuthService::new(google_config(&server), vault.clone(), store.clone());

    let (auth_url, state) = service.begin_authorization(Department::Tanhai);
    assert!(auth_url.contains("state="));
    assert!(auth_url.contains("client_id=client-id"));

    let department = service
        .finalize_authorization(&state, "auth-code")
        .await
        .unwrap();
    assert_eq!(department, Department::Tanhai);

    let record = store.get_token(Department::Tanhai).await.unwrap().unwrap();
    assert_eq!(
        vault.decrypt_string(&record.refresh_token_sealed).unwrap(),
        "granted-refresh-token"
    );
    // Ciphertext at rest, never the raw token.
    assert_ne!(record.refresh_token_sealed, "granted-refresh-token");

    // The state token is single-use.
    let err = service
        .finalize_authorization(&state, "auth-code")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("state"));
}

#[tokio::test]
async fn unknown_state_is_rejected() {
    let server = MockServer::start().await;
    let service = OAuthService::new(
        google_config(&server),
        Arc::new(vault()),
        Arc::new(MemoryStore::new()),
    );
    let err = service
        .finalize_authorization("never-issued", "code")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("state"));
}

#[tokio::test]
async fn provider_rejection_maps_to_upstream_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let vault = vault();
    seed_grant(&store, &vault, true).await;
    let service = OAuthService::new(google_config(&server), Arc::new(vault), store);

    let err = service
        .acquire_access_token(Department::Tanhai)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("rejected"));
}
