//! PostgreSQL search index over the `search_document` table.
//!
//! Field-weighted scoring: filename (A) > display name (B) > subject (C) >
//! content (D), via the table's generated `tsv` column. Typo tolerance on
//! metadata and body text comes from `pg_trgm` `word_similarity`; each search
//! runs in a transaction that sets `pg_trgm.word_similarity_threshold` so the
//! `<%` operator can use the trigram indexes.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use docshelf_core::{
    defaults, Category, Error, FacetCount, FileFormat, IndexDocument, IndexField, Result,
    SearchHit, SearchIndex, SearchQuery, SearchResults,
};

use crate::highlight::{HIGHLIGHT_CLOSE, HIGHLIGHT_OPEN};

/// Delimiter between `ts_headline` fragments.
const FRAGMENT_DELIMITER: &str = " ... ";

/// Concatenated metadata used for trigram similarity.
const METADATA_EXPR: &str = "(d.filename || ' ' || d.display_name || ' ' || d.subject)";

/// Share of a body-text trigram match added to the score, below metadata.
const CONTENT_SIMILARITY_WEIGHT: f32 = 0.25;

/// Binds: $1 query text, $2 similarity threshold, $3 subject, $4 category,
/// $5 format.
fn where_clause() -> String {
    format!(
        "($1 = ''
            OR d.tsv @@ websearch_to_tsquery('simple', $1)
            OR ($1 <% {METADATA_EXPR} AND word_similarity($1, {METADATA_EXPR}) >= $2)
            OR ($1 <% d.content AND word_similarity($1, d.content) >= $2))
          AND ($3::text IS NULL OR d.subject = $3)
          AND ($4::text IS NULL OR d.category = $4)
          AND ($5::text IS NULL OR d.format = $5)"
    )
}

fn headline_options() -> String {
    format!(
        "StartSel={HIGHLIGHT_OPEN}, StopSel={HIGHLIGHT_CLOSE}, MaxFragments={}, MaxWords=20, MinWords=5, FragmentDelimiter=\"{FRAGMENT_DELIMITER}\"",
        defaults::HIGHLIGHT_FRAGMENTS
    )
}

fn search_sql() -> String {
    format!(
        "SELECT d.id, d.filename, d.display_name, d.subject, d.category, d.format,
                d.size_bytes, d.updated_at,
                (ts_rank(d.tsv, websearch_to_tsquery('simple', $1), 32)
                  + GREATEST(word_similarity($1, {METADATA_EXPR}) - $2, 0)
                  + GREATEST(word_similarity($1, d.content) - $2, 0) * {CONTENT_SIMILARITY_WEIGHT})::real AS score,
                CASE WHEN $1 = '' THEN ''
                     ELSE ts_headline('simple', d.content, websearch_to_tsquery('simple', $1), $6)
                END AS headline,
                COUNT(*) OVER() AS total
         FROM search_document d
         WHERE {}
         ORDER BY score DESC, d.updated_at DESC, d.id ASC
         LIMIT $7 OFFSET $8",
        where_clause()
    )
}

/// Split a `ts_headline` result into fragments, keeping only those that
/// contain a highlighted match.
pub fn split_headline(headline: &str) -> Vec<String> {
    headline
        .split(FRAGMENT_DELIMITER)
        .map(str::trim)
        .filter(|f| f.contains(HIGHLIGHT_OPEN))
        .map(str::to_string)
        .collect()
}

fn parse_enum<T: FromStr<Err = Error>>(row: &PgRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .map_err(|e| Error::Index(format!("corrupt {column} in index: {e}")))
}

/// PostgreSQL implementation of SearchIndex.
#[derive(Clone)]
pub struct PgSearchIndex {
    pool: Pool<Postgres>,
    similarity_threshold: f32,
}

impl PgSearchIndex {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            similarity_threshold: defaults::FUZZY_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    async fn count(&self, conn: &mut PgConnection, query: &SearchQuery) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM search_document d WHERE {}", where_clause());
        let total: i64 = sqlx::query_scalar(&sql)
            .bind(&query.text)
            .bind(self.similarity_threshold)
            .bind(query.subject.as_deref())
            .bind(query.category.map(|c| c.as_str()))
            .bind(query.format.map(|f| f.extension()))
            .fetch_one(conn)
            .await
            .map_err(index_error)?;
        Ok(total.max(0) as u64)
    }
}

/// Index failures surface as `Error::Index` so callers can degrade.
fn index_error(e: sqlx::Error) -> Error {
    Error::Index(e.to_string())
}

#[async_trait]
impl SearchIndex for PgSearchIndex {
    async fn upsert(&self, doc: &IndexDocument) -> Result<()> {
        sqlx::query(
            "INSERT INTO search_document
                 (id, owner_id, filename, display_name, subject, category, format,
                  size_bytes, content, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (id) DO UPDATE SET
                 owner_id = EXCLUDED.owner_id,
                 filename = EXCLUDED.filename,
                 display_name = EXCLUDED.display_name,
                 subject = EXCLUDED.subject,
                 category = EXCLUDED.category,
                 format = EXCLUDED.format,
                 size_bytes = EXCLUDED.size_bytes,
                 content = EXCLUDED.content,
                 created_at = EXCLUDED.created_at,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(doc.id)
        .bind(doc.owner_id)
        .bind(&doc.filename)
        .bind(&doc.display_name)
        .bind(&doc.subject)
        .bind(doc.category.as_str())
        .bind(doc.format.extension())
        .bind(doc.size_bytes)
        .bind(&doc.content)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await
        .map_err(index_error)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM search_document WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(index_error)?;
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        let mut tx = self.pool.begin().await.map_err(index_error)?;
        sqlx::query("SELECT set_config('pg_trgm.word_similarity_threshold', $1, true)")
            .bind(self.similarity_threshold.to_string())
            .execute(&mut *tx)
            .await
            .map_err(index_error)?;

        let rows = sqlx::query(&search_sql())
            .bind(&query.text)
            .bind(self.similarity_threshold)
            .bind(query.subject.as_deref())
            .bind(query.category.map(|c| c.as_str()))
            .bind(query.format.map(|f| f.extension()))
            .bind(headline_options())
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&mut *tx)
            .await
            .map_err(index_error)?;

        let mut total = 0u64;
        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let row_total: i64 = row.try_get("total")?;
            total = row_total.max(0) as u64;
            let headline: String = row.try_get("headline")?;
            hits.push(SearchHit {
                id: row.try_get("id")?,
                score: row.try_get::<Option<f32>, _>("score")?.unwrap_or(0.0),
                filename: row.try_get("filename")?,
                display_name: row.try_get("display_name")?,
                subject: row.try_get("subject")?,
                category: parse_enum::<Category>(row, "category")?,
                format: parse_enum::<FileFormat>(row, "format")?,
                size_bytes: row.try_get("size_bytes")?,
                updated_at: row.try_get("updated_at")?,
                highlights: split_headline(&headline),
            });
        }

        // Window totals are lost when the page is past the end.
        if rows.is_empty() && query.offset > 0 {
            total = self.count(&mut *tx, query).await?;
        }
        tx.commit().await.map_err(index_error)?;

        debug!(
            subsystem = "search",
            component = "pg_index",
            op = "search",
            result_count = total,
            "Search complete"
        );
        Ok(SearchResults { total, hits })
    }

    async fn aggregate_by(&self, field: IndexField) -> Result<Vec<FacetCount>> {
        let column = field.as_str();
        let sql = format!(
            "SELECT {column} AS value, COUNT(*) AS count
             FROM search_document
             GROUP BY {column}
             ORDER BY count DESC, value ASC"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(index_error)?;

        rows.iter()
            .map(|row| {
                let count: i64 = row.try_get("count")?;
                Ok(FacetCount {
                    value: row.try_get("value")?,
                    count: count.max(0) as u64,
                })
            })
            .collect()
    }

    async fn rename_field_value(&self, field: IndexField, old: &str, new: &str) -> Result<u64> {
        match field {
            IndexField::Category => {
                new.parse::<Category>()?;
            }
            IndexField::Format => {
                new.parse::<FileFormat>()?;
            }
            IndexField::Subject => {}
        }

        let column = field.as_str();
        let sql = format!("UPDATE search_document SET {column} = $2 WHERE {column} = $1");
        let result = sqlx::query(&sql)
            .bind(old)
            .bind(new)
            .execute(&self.pool)
            .await
            .map_err(index_error)?;
        Ok(result.rows_affected())
    }

    async fn get(&self, id: Uuid) -> Result<Option<IndexDocument>> {
        let row = sqlx::query(
            "SELECT id, owner_id, filename, display_name, subject, category, format,
                    size_bytes, content, created_at, updated_at
             FROM search_document WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(index_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(IndexDocument {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            filename: row.try_get("filename")?,
            display_name: row.try_get("display_name")?,
            subject: row.try_get("subject")?,
            category: parse_enum(&row, "category")?,
            format: parse_enum(&row, "format")?,
            size_bytes: row.try_get("size_bytes")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn health_check(&self) -> Result<bool> {
        let ok = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok();
        Ok(ok)
    }
}
