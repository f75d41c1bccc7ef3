//! Document upload, listing, status, deletion and reprocessing.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use docshelf_core::{Category, DocumentFilter, Error, FileFormat, Page};

use super::Requester;
use crate::error::ApiError;
use crate::services::UploadRequest;
use crate::state::AppState;

/// Parse an optional format filter. Unknown names are a bad request here,
/// not an unsupported upload.
pub(crate) fn parse_format(value: Option<&str>) -> Result<Option<FileFormat>, Error> {
    value
        .map(|f| {
            FileFormat::from_extension(f)
                .ok_or_else(|| Error::InvalidInput(format!("unknown format: {f}")))
        })
        .transpose()
}

pub(crate) fn parse_category(value: Option<&str>) -> Result<Option<Category>, Error> {
    value.map(str::parse::<Category>).transpose()
}

/// Multipart upload with `file`, `subject` and `category` fields.
pub async fn upload(
    State(state): State<AppState>,
    Requester(owner_id): Requester,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut subject: Option<String> = None;
    let mut category: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("file field has no filename".into()))?;
                let data = field.bytes().await?;
                file = Some((filename, data.to_vec()));
            }
            Some("subject") => subject = Some(field.text().await?),
            Some("category") => category = Some(field.text().await?),
            _ => {}
        }
    }

    let (filename, data) = file.ok_or_else(|| ApiError::BadRequest("missing file field".into()))?;
    let subject = subject.ok_or_else(|| ApiError::BadRequest("missing subject field".into()))?;
    let category = parse_category(category.as_deref())?
        .ok_or_else(|| ApiError::BadRequest("missing category field".into()))?;

    let receipt = state
        .orchestrator
        .upload(UploadRequest {
            owner_id,
            filename,
            subject,
            category,
            data,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub subject: Option<String>,
    pub category: Option<String>,
    pub format: Option<String>,
    pub owner: Option<Uuid>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    Requester(requester): Requester,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = DocumentFilter {
        subject: params
            .subject
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        category: parse_category(params.category.as_deref())?,
        format: parse_format(params.format.as_deref())?,
        owner_id: params.owner,
    };
    let page = Page::new(params.page, params.per_page);
    let documents = state.query.list_documents(requester, filter, page).await?;
    Ok(Json(documents))
}

pub async fn status(
    State(state): State<AppState>,
    Requester(requester): Requester,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.query.status(id, requester).await?;
    Ok(Json(view))
}

pub async fn delete(
    State(state): State<AppState>,
    Requester(requester): Requester,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.ensure_owner(id, requester).await?;
    let report = state.orchestrator.delete(id).await?;
    Ok(Json(report))
}

pub async fn reprocess(
    State(state): State<AppState>,
    Requester(requester): Requester,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.ensure_owner(id, requester).await?;
    let receipt = state.orchestrator.reprocess(id).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format(None).unwrap(), None);
        assert_eq!(parse_format(Some("PDF")).unwrap(), Some(FileFormat::Pdf));
        assert!(matches!(
            parse_format(Some("exe")),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(parse_category(Some("Notes")).unwrap(), Some(Category::Notes));
        assert!(parse_category(Some("poster")).is_err());
    }
}
