//! HTTP handlers and the router.

pub mod documents;
pub mod health;
pub mod search;

use axum::extract::{DefaultBodyLimit, FromRequestParts};
use axum::http::request::Parts;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the authenticated user, set by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Room for multipart boundaries and the text fields around the file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// The user a request acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester(pub Uuid);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Requester {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
        let id = value
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or_else(|| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER} header")))?;
        Ok(Requester(id))
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit =
        (state.orchestrator.max_upload_bytes() as usize).saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/v1/documents",
            post(documents::upload).get(documents::list),
        )
        .route("/api/v1/documents/:id", delete(documents::delete))
        .route("/api/v1/documents/:id/status", get(documents::status))
        .route("/api/v1/documents/:id/reprocess", post(documents::reprocess))
        .route("/api/v1/search", get(search::search))
        .route("/api/v1/subjects", get(search::list_subjects))
        .route("/api/v1/subjects/:name", put(search::rename_subject))
        .route("/api/v1/stats", get(search::stats))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
