use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::{middleware as axum_middleware, Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    bonus, driving, employees, google, health, profiles, records, settings, sync,
};
use crate::middleware::{count_requests, deadline, request_id};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let api = Router::new()
        // Auth core
        .route("/auth/login", post(crate::auth_handlers::login_handler))
        .route("/auth/refresh", post(crate::auth_handlers::refresh_handler))
        .route("/auth/logout", post(crate::auth_handlers::logout_handler))
        .route("/auth/me", get(crate::auth_handlers::me_handler))
        .route(
            "/auth/change-password",
            post(crate::auth_handlers::change_password_handler),
        )
        // Employees
        .route(
            "/employees",
            get(employees::list_employees).post(employees::create_employee),
        )
        .route("/employees/import", post(employees::import_employees))
        .route(
            "/employees/:code",
            get(employees::get_employee).patch(employees::update_employee),
        )
        .route("/employees/:code/transfer", post(employees::transfer_employee))
        .route("/employees/:code/transfers", get(employees::list_transfers))
        // Profiles and pending cases
        .route(
            "/profiles",
            get(profiles::list_profiles).post(profiles::create_profile),
        )
        .route(
            "/profiles/:id",
            get(profiles::get_profile).patch(profiles::update_profile),
        )
        .route("/profiles/:id/convert", post(profiles::convert_profile))
        .route(
            "/profiles/:id/generate-document",
            post(profiles::generate_document),
        )
        .route("/profiles/:id/upload-plan", get(profiles::upload_plan))
        .route("/profiles/:id/complete", post(profiles::complete_profile))
        .route("/profiles/:id/reset", post(profiles::reset_profile))
        .route("/pending-cases", get(profiles::list_pending_cases))
        .route("/pending-cases/stats", get(profiles::pending_case_stats))
        // Assessment
        .route("/assessment-standards", get(records::list_standards))
        .route(
            "/assessment-records",
            get(records::list_records).post(records::create_record),
        )
        .route(
            "/assessment-records/:id",
            get(records::get_record).delete(records::delete_record),
        )
        .route(
            "/assessment-records/:id/fault-responsibility",
            put(records::set_fault_responsibility),
        )
        // Derivation engines
        .route(
            "/attendance-bonus/process",
            post(bonus::process_attendance_bonus),
        )
        .route(
            "/monthly-rewards/process",
            post(bonus::process_monthly_rewards),
        )
        // Driving dashboard
        .route("/driving/stats", get(driving::driving_stats))
        // Schedule sync
        .route("/sync/start", post(sync::start_sync))
        .route("/sync/status/:task_id", get(sync::sync_status))
        .route("/sync/cancel/:task_id", post(sync::cancel_sync))
        // Google credential lifecycle
        .route("/google/auth-url", get(google::auth_url))
        .route("/auth/google/callback", get(google::oauth_callback))
        .route("/google/get-access-token", post(google::get_access_token))
        .route("/google/revoke", post(google::revoke))
        // Settings (the value endpoint is contract-protected)
        .route("/settings", get(settings::list_settings).put(settings::upsert_setting))
        .route("/settings/value/:key", get(settings::get_setting_value));

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(health::metrics_handler))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(deadline))
        .layer(axum_middleware::from_fn(count_requests))
        .layer(axum_middleware::from_fn(request_id))
        .layer(Extension(state.jwt.clone()))
        .with_state(state)
}
