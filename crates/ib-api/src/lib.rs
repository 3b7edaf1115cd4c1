//! # ib-api
//!
//! The HTTP layer for Interview-Board: routing, request extraction and the
//! response envelopes. All behavior lives in `ib-services`; handlers only
//! translate between HTTP and the service calls.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use ib_core::TokenVerifier;
use ib_services::PostService;

pub use error::{ApiError, Data};

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub posts: Arc<PostService>,
    pub tokens: Arc<dyn TokenVerifier>,
    /// Upper bound for request bodies, uploads included.
    pub max_upload_bytes: usize,
}

/// Builds the full route table.
///
/// The board's static segments (`/posts/all`, `/posts/company`, ...) sit next
/// to `/posts/{post_id}`; static segments win, so those names never reach the
/// id routes.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/posts", post(handlers::create_post).put(handlers::update_post))
        .route(
            "/posts/{post_id}",
            get(handlers::get_post).delete(handlers::delete_post),
        )
        .route("/posts/{post_id}/attachments", get(handlers::list_attachments))
        .route(
            "/posts/{post_id}/{post_pin}/attachments",
            put(handlers::replace_attachments),
        )
        .route("/posts/all", post(handlers::list_all))
        .route("/posts/company", post(handlers::list_by_company))
        .route("/posts/position", post(handlers::list_by_position))
        .route("/posts/position/company", post(handlers::list_by_position_and_company))
        .route("/companies", get(handlers::companies))
        .route("/positions", get(handlers::positions))
        .route("/stats/companies", get(handlers::company_stats))
        .route("/stats/positions", get(handlers::position_stats))
        .route("/system/ping", get(handlers::ping))
        .route("/system/version", get(handlers::version))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::trace_layer())
        .layer(middleware::cors_policy())
        .with_state(state)
}
