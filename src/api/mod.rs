pub mod auth;
pub mod error;
pub mod metrics;
mod modelings;
mod requests;
pub mod validation;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::StorageBackend;
use crate::AppState;

/// Largest accepted image upload
const IMAGE_UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/sign-up", post(auth::sign_up))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    // Role checks happen in the extractors each handler takes
    let api_routes = Router::new()
        // Catalog
        .route(
            "/modelings",
            get(modelings::list_modelings).post(modelings::create_modeling),
        )
        .route(
            "/modelings/:id",
            get(modelings::get_modeling)
                .put(modelings::update_modeling)
                .delete(modelings::delete_modeling),
        )
        .route(
            "/modelings/:id/image",
            post(modelings::upload_image).layer(DefaultBodyLimit::max(IMAGE_UPLOAD_LIMIT)),
        )
        .route("/modelings/:id/draft", post(modelings::add_to_draft))
        // Analysis requests
        .route("/requests", get(requests::list_requests))
        .route(
            "/requests/draft",
            get(requests::get_draft).delete(requests::delete_draft),
        )
        .route("/requests/draft/submit", post(requests::submit_draft))
        .route(
            "/requests/draft/modelings/:modeling_id",
            put(requests::update_draft_modeling).delete(requests::remove_draft_modeling),
        )
        .route("/requests/:id", get(requests::get_request))
        .route("/requests/:id/resolve", put(requests::resolve_request));

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes);

    // Locally stored images are served by this process
    if state.config.storage.backend == StorageBackend::Local {
        router = router.nest_service(
            &state.config.storage.public_prefix,
            ServeDir::new(&state.config.storage.local_dir),
        );
    }

    router
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
