use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::state::AppState;

/// Liveness plus the health of the index, blob store and extraction tools.
/// Always 200; `status` is `degraded` when the index or blob store is down.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let index = state.projector.health_check().await;
    let blobs = state.blobs.health_check().await.unwrap_or(false);
    let queue_pending = state.queue.pending_count().await.ok();
    let extractors = state.extractor.health_check_all().await;
    let status = if index && blobs { "healthy" } else { "degraded" };

    Json(serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "index": index,
        "blobs": blobs,
        "queue_pending": queue_pending,
        "cache": {
            "store": state.cache.store_name(),
            "stats": state.cache.stats(),
        },
        "extractors": extractors,
    }))
}
