//! Router configuration.

use crate::api::{admin, public};
use crate::health::{health_check, readiness_check};
use crate::state::AppState;
use axum::routing::{get, post, put};
use axum::Router;

/// Builds the complete router.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/forms/:token", get(public::get_form))
        .route("/forms/:token/inventory", get(public::get_inventory))
        .route("/forms/:token/submissions", post(public::submit));

    let admin_routes = Router::new()
        .route("/templates", post(admin::create_template))
        .route("/templates/:id/share", post(admin::share_template))
        .route("/templates/:id/submissions", get(admin::list_submissions))
        .route("/submissions/:id/viewed", post(admin::mark_viewed))
        .route("/offerings", post(admin::create_offering))
        .route("/offerings/:id/inventory", get(admin::offering_inventory))
        .route("/bindings", post(admin::create_binding))
        .route("/inventory/limit", put(admin::set_limit));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api/public", public_routes)
        .nest("/api/admin", admin_routes)
        .with_state(state)
}
