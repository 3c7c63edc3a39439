pub mod accounts;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod state;
pub mod storage;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.body_limit();

    Router::new()
        .route("/", get(handlers::root))
        .route("/register", post(handlers::register_user))
        .route("/login", post(handlers::login_user))
        .route("/users", get(handlers::list_users))
        .route("/users/:id", get(handlers::get_user))
        .route(
            "/upload",
            post(handlers::upload_files).layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}
