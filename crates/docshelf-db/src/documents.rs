//! Document record repository (system of record).

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use docshelf_core::{
    Category, ClaimOutcome, DocumentFilter, DocumentPage, DocumentRecord, DocumentRepository,
    Error, FileFormat, NewDocument, Page, ProcessingOutcome, ProcessingStatus, Result,
};

const DOCUMENT_COLUMNS: &str = "id, owner_id, filename, storage_path, subject, category, \
     size_bytes, format, content_hash, status, error_message, created_at, updated_at, processed_at";

/// Filter predicate shared by the listing and count queries.
/// Binds: $1 subject, $2 category, $3 format, $4 owner.
const FILTER_CLAUSE: &str = "($1::text IS NULL OR subject = $1)
       AND ($2::text IS NULL OR category = $2)
       AND ($3::text IS NULL OR format = $3)
       AND ($4::uuid IS NULL OR owner_id = $4)";

/// PostgreSQL implementation of DocumentRepository.
#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: Pool<Postgres>,
}

impl PgDocumentRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> Result<DocumentRecord> {
        Ok(DocumentRecord {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            filename: row.try_get("filename")?,
            storage_path: row.try_get("storage_path")?,
            subject: row.try_get("subject")?,
            category: parse_column::<Category>(row, "category")?,
            size_bytes: row.try_get("size_bytes")?,
            format: parse_column::<FileFormat>(row, "format")?,
            content_hash: row.try_get("content_hash")?,
            status: parse_column::<ProcessingStatus>(row, "status")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            processed_at: row.try_get("processed_at")?,
        })
    }
}

/// Decode a text column into one of the domain enums.
fn parse_column<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: FromStr<Err = Error>,
{
    let raw: String = row.try_get(column)?;
    parse_stored(column, &raw)
}

fn parse_stored<T>(column: &str, raw: &str) -> Result<T>
where
    T: FromStr<Err = Error>,
{
    raw.parse::<T>()
        .map_err(|e| Error::Internal(format!("corrupt {column} column '{raw}': {e}")))
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn insert(&self, doc: NewDocument) -> Result<DocumentRecord> {
        let sql = format!(
            "INSERT INTO document (id, owner_id, filename, storage_path, subject, category,
                                   size_bytes, format, content_hash, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', NOW(), NOW())
             RETURNING {DOCUMENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(doc.id)
            .bind(doc.owner_id)
            .bind(&doc.filename)
            .bind(&doc.storage_path)
            .bind(&doc.subject)
            .bind(doc.category.as_str())
            .bind(doc.size_bytes)
            .bind(doc.format.extension())
            .bind(&doc.content_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Self::parse_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<DocumentRecord>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM document WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM document WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(exists)
    }

    async fn list(&self, filter: &DocumentFilter, page: Page) -> Result<DocumentPage> {
        let category = filter.category.map(|c| c.as_str());
        let format = filter.format.map(|f| f.extension());

        let count_sql = format!("SELECT COUNT(*) FROM document WHERE {FILTER_CLAUSE}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(filter.subject.as_deref())
            .bind(category)
            .bind(format)
            .bind(filter.owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        let list_sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document
             WHERE {FILTER_CLAUSE}
             ORDER BY created_at DESC, id DESC
             LIMIT $5 OFFSET $6"
        );
        let rows = sqlx::query(&list_sql)
            .bind(filter.subject.as_deref())
            .bind(category)
            .bind(format)
            .bind(filter.owner_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let items = rows
            .iter()
            .map(|row| Self::parse_row(row).map(|r| r.summary()))
            .collect::<Result<Vec<_>>>()?;

        Ok(DocumentPage {
            items,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    async fn claim(&self, id: Uuid) -> Result<ClaimOutcome> {
        // The conditional update is the claim; exactly one concurrent caller
        // sees a returned row.
        let sql = format!(
            "UPDATE document
             SET status = 'processing', updated_at = NOW()
             WHERE id = $1 AND status = 'pending'
             RETURNING {DOCUMENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        if let Some(row) = row {
            return Ok(ClaimOutcome::Claimed(Self::parse_row(&row)?));
        }

        let status: Option<String> = sqlx::query_scalar("SELECT status FROM document WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        match status {
            None => Ok(ClaimOutcome::Missing),
            Some(raw) => Ok(ClaimOutcome::NotPending(parse_stored("status", &raw)?)),
        }
    }

    async fn finish(&self, id: Uuid, outcome: &ProcessingOutcome) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE document
             SET status = $2, error_message = $3, processed_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(outcome.status().as_str())
        .bind(outcome.error_message())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn reset_for_reprocess(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE document
             SET status = 'pending', error_message = NULL, processed_at = NULL, updated_at = NOW()
             WHERE id = $1 AND status IN ('completed', 'failed')",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<Option<DocumentRecord>> {
        let sql = format!("DELETE FROM document WHERE id = $1 RETURNING {DOCUMENT_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn rename_subject(&self, old: &str, new: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let result = sqlx::query(
            "UPDATE document SET subject = $2, updated_at = NOW() WHERE subject = $1",
        )
        .bind(old)
        .bind(new)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;
        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "documents",
            op = "rename_subject",
            renamed = result.rows_affected(),
            "Renamed subject in system of record"
        );
        Ok(result.rows_affected())
    }

    async fn ids_with_status(
        &self,
        status: ProcessingStatus,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM document
             WHERE status = $1 AND ($2::timestamptz IS NULL OR updated_at < $2)
             ORDER BY updated_at ASC
             LIMIT $3",
        )
        .bind(status.as_str())
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stored_enums() {
        let status: ProcessingStatus = parse_stored("status", "processing").unwrap();
        assert_eq!(status, ProcessingStatus::Processing);

        let format: FileFormat = parse_stored("format", "pptx").unwrap();
        assert_eq!(format, FileFormat::Pptx);
    }

    #[test]
    fn test_parse_stored_corrupt_value() {
        let err = parse_stored::<Category>("category", "lecture").unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(err.to_string().contains("corrupt category column"));
    }

    #[test]
    fn test_filter_clause_binds_in_order() {
        for n in 1..=4 {
            assert!(FILTER_CLAUSE.contains(&format!("${n}")));
        }
        assert!(!FILTER_CLAUSE.contains("$5"));
    }
}
