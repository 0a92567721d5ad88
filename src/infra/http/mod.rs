mod handlers;
mod middleware;
mod state;

pub use state::HttpState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use self::middleware::{log_responses, set_request_context};

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/login", post(handlers::login))
        .route("/register", post(handlers::register))
        .route("/activate-account", get(handlers::activate_account))
        .route("/members/plans", get(handlers::list_plans))
        .route("/members/subscribe", post(handlers::subscribe))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
