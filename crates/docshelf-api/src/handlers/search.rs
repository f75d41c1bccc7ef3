//! Search, subject listing and rename, library statistics.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use docshelf_core::defaults::SEARCH_PAGE_LIMIT;
use docshelf_core::SearchQuery;

use super::documents::{parse_category, parse_format};
use super::Requester;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub subject: Option<String>,
    pub category: Option<String>,
    pub format: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn search(
    State(state): State<AppState>,
    Requester(requester): Requester,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let mut query = SearchQuery::new(params.q.unwrap_or_default()).with_page(
        params.limit.unwrap_or(SEARCH_PAGE_LIMIT),
        params.offset.unwrap_or(0),
    );
    query.subject = params.subject;
    query.category = parse_category(params.category.as_deref())?;
    query.format = parse_format(params.format.as_deref())?;

    let results = state.query.search(requester, query).await?;
    Ok(Json(results))
}

pub async fn list_subjects(
    State(state): State<AppState>,
    Requester(requester): Requester,
) -> Result<impl IntoResponse, ApiError> {
    let subjects = state.query.list_subjects(requester).await?;
    Ok(Json(subjects))
}

#[derive(Debug, Deserialize)]
pub struct RenameBody {
    pub new_name: String,
}

pub async fn rename_subject(
    State(state): State<AppState>,
    Requester(_): Requester,
    Path(name): Path<String>,
    Json(body): Json<RenameBody>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .orchestrator
        .rename_subject(&name, &body.new_name)
        .await?;
    Ok(Json(report))
}

pub async fn stats(
    State(state): State<AppState>,
    Requester(requester): Requester,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.query.stats(requester).await?;
    Ok(Json(stats))
}
