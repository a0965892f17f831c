mod admin;
pub mod auth;
pub mod error;
mod sessions;
mod sports;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let public_auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/signin", post(auth::signin))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password));

    let account_routes = Router::new()
        .route("/profile", get(auth::get_profile).put(auth::update_profile))
        .route("/change-password", post(auth::change_password))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let session_routes = Router::new()
        .route("/", get(sessions::list_sessions).post(sessions::create_session))
        .route("/user/sessions", get(sessions::user_sessions))
        .route("/user/activity", get(sessions::user_activity))
        .route("/area/:location", get(sessions::sessions_by_area))
        .route("/sport/:sport_id", get(sessions::sessions_by_sport))
        .route("/:id", get(sessions::get_session))
        .route("/:id/join", post(sessions::join_session))
        .route("/:id/cancel", post(sessions::cancel_session))
        .route("/:id/invite", post(sessions::invite_players))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    // Sport management (admin); listing is open to any signed-in user
    let sport_admin_routes = Router::new()
        .route("/", post(sports::create_sport))
        .route("/:id", delete(sports::delete_sport))
        .route("/cleanup/duplicates", delete(sports::cleanup_duplicates))
        .layer(middleware::from_fn(auth::require_admin));

    let sport_routes = Router::new()
        .route("/", get(sports::list_sports))
        .merge(sport_admin_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/reports", get(admin::session_report))
        .layer(middleware::from_fn(auth::require_admin))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", public_auth_routes.merge(account_routes))
        .nest("/api/sessions", session_routes)
        .nest("/api/sports", sport_routes)
        .nest("/api/admin", admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
