use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

use self::contract_headers::ContractHeaders;
use self::contract_subsets::ContractSubsets;

pub mod auth;
pub mod contract_headers;
pub mod contract_subsets;
pub mod health;
pub mod lifecycle;
pub mod notifications;

const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 256;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = build_cors(state.config.cors_allowed_origin.as_deref());

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let contract_header_routes = Router::new()
        .route(
            "/",
            get(contract_headers::list_contract_headers)
                .post(lifecycle::store::<ContractHeaders>),
        )
        .route(
            "/:id",
            get(contract_headers::edit_contract_header)
                .put(lifecycle::update::<ContractHeaders>)
                .delete(lifecycle::destroy::<ContractHeaders>),
        )
        .route("/:id/status", patch(lifecycle::toggle_status::<ContractHeaders>))
        .route("/:id/docs", get(lifecycle::download_docs::<ContractHeaders>));

    let contract_subset_routes = Router::new()
        .route(
            "/",
            get(contract_subsets::list_contract_subsets)
                .post(lifecycle::store::<ContractSubsets>),
        )
        .route(
            "/:id",
            get(contract_subsets::edit_contract_subset)
                .put(lifecycle::update::<ContractSubsets>)
                .delete(lifecycle::destroy::<ContractSubsets>),
        )
        .route("/:id/status", patch(lifecycle::toggle_status::<ContractSubsets>))
        .route("/:id/docs", get(lifecycle::download_docs::<ContractSubsets>));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/contract-headers", contract_header_routes)
        .nest("/api/contract-subsets", contract_subset_routes)
        .route("/api/notifications", get(notifications::list_notifications))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

fn build_cors(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(err) => {
                        warn!(origin = value, error = %err, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}
