//! Router assembly.

use axum::{Router, middleware, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::admin::storage_info;
use super::auth::{require_admin, require_auth};
use super::handlers::{
    AppState, create_task, delete_task, get_task, health_check, route_not_found, update_task,
};
use super::query::list_tasks;
use super::rate_limit::{HEALTH_PATH, RateLimitLayer};

/// Builds the application router.
///
/// `/health` is always public. `/tasks` and `/admin` routes pass through
/// [`require_auth`]; `/admin` routes additionally pass through
/// [`require_admin`]. Unknown routes answer with a JSON 404.
///
/// Every request except `/health` counts against the global limiter before
/// authentication runs; `/health` has a limiter of its own.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = Router::new()
        .route("/admin/storage", get(storage_info))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let protected = Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task)
                .put(update_task)
                .patch(update_task)
                .delete(delete_task),
        )
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let health = Router::new()
        .route(HEALTH_PATH, get(health_check))
        .route_layer(RateLimitLayer::new(state.rate_limits.health.clone()));

    let global_limit = RateLimitLayer::new(state.rate_limits.global.clone()).exempting(HEALTH_PATH);

    Router::new()
        .merge(health)
        .merge(protected)
        .fallback(route_not_found)
        .layer(global_limit)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
