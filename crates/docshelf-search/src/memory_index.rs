//! In-process search index.
//!
//! Per-field token sets with exact, prefix and bounded-edit-distance
//! matching. Every query term must match some field; a term's score is the
//! best `field weight * match factor` over all fields.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use docshelf_core::{
    defaults, tokenize, Category, Error, FacetCount, FileFormat, IndexDocument, IndexField, Result,
    SearchHit, SearchIndex, SearchQuery, SearchResults,
};

use crate::fuzzy::match_term;
use crate::highlight::highlight_fragments;

/// Field weights: filename > display name > subject > body.
const FIELD_WEIGHTS: [f32; 4] = [4.0, 3.0, 2.0, 1.0];
const CONTENT_FIELD: usize = 3;

struct IndexedEntry {
    doc: IndexDocument,
    /// Token sets for filename, display name, subject, content.
    fields: [HashSet<String>; 4],
}

impl IndexedEntry {
    fn new(doc: IndexDocument) -> Self {
        let fields = [
            tokenize(&doc.filename).into_iter().collect(),
            tokenize(&doc.display_name).into_iter().collect(),
            tokenize(&doc.subject).into_iter().collect(),
            tokenize(&doc.content).into_iter().collect(),
        ];
        Self { doc, fields }
    }

    /// Score the entry against `terms`, collecting matched content tokens.
    /// `None` when some term matches no field.
    fn score(&self, terms: &[String], content_hits: &mut HashSet<String>) -> Option<f32> {
        let mut total = 0.0;
        for term in terms {
            let mut best: Option<f32> = None;
            for (field, tokens) in self.fields.iter().enumerate() {
                for token in tokens {
                    if let Some(m) = match_term(term, token) {
                        let s = FIELD_WEIGHTS[field] * m.factor();
                        best = Some(best.map_or(s, |b: f32| b.max(s)));
                        if field == CONTENT_FIELD {
                            content_hits.insert(token.clone());
                        }
                    }
                }
            }
            total += best?;
        }
        Some(total)
    }
}

/// In-memory implementation of SearchIndex.
#[derive(Default)]
pub struct MemorySearchIndex {
    entries: RwLock<HashMap<Uuid, IndexedEntry>>,
    unavailable: AtomicBool,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with an index error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Index("search index unavailable".to_string()));
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn to_hit(doc: &IndexDocument, score: f32, highlights: Vec<String>) -> SearchHit {
    SearchHit {
        id: doc.id,
        score,
        filename: doc.filename.clone(),
        display_name: doc.display_name.clone(),
        subject: doc.subject.clone(),
        category: doc.category,
        format: doc.format,
        size_bytes: doc.size_bytes,
        updated_at: doc.updated_at,
        highlights,
    }
}

/// Score descending, then `updated_at` descending, then id.
fn rank_order(a: &SearchHit, b: &SearchHit) -> CmpOrdering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(CmpOrdering::Equal)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn upsert(&self, doc: &IndexDocument) -> Result<()> {
        self.check_available()?;
        self.entries
            .write()
            .await
            .insert(doc.id, IndexedEntry::new(doc.clone()));
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.check_available()?;
        self.entries.write().await.remove(&id);
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        self.check_available()?;
        let terms = tokenize(&query.text);
        let entries = self.entries.read().await;

        let mut hits: Vec<SearchHit> = entries
            .values()
            .filter(|e| query.filters_match(&e.doc))
            .filter_map(|e| {
                if terms.is_empty() {
                    return Some(to_hit(&e.doc, 0.0, Vec::new()));
                }
                let mut content_hits = HashSet::new();
                let score = e.score(&terms, &mut content_hits)?;
                let highlights = highlight_fragments(
                    &e.doc.content,
                    &content_hits,
                    defaults::HIGHLIGHT_FRAGMENTS,
                    defaults::HIGHLIGHT_CONTEXT_CHARS,
                );
                Some(to_hit(&e.doc, score, highlights))
            })
            .collect();

        hits.sort_by(rank_order);
        let total = hits.len() as u64;
        let hits = hits
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect();

        debug!(
            subsystem = "search",
            component = "memory_index",
            op = "search",
            result_count = total,
            "In-process search complete"
        );
        Ok(SearchResults { total, hits })
    }

    async fn aggregate_by(&self, field: IndexField) -> Result<Vec<FacetCount>> {
        self.check_available()?;
        let entries = self.entries.read().await;
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for entry in entries.values() {
            *counts.entry(field.value_of(&entry.doc)).or_default() += 1;
        }
        let mut facets: Vec<FacetCount> = counts
            .into_iter()
            .map(|(value, count)| FacetCount {
                value: value.to_string(),
                count,
            })
            .collect();
        facets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        Ok(facets)
    }

    async fn rename_field_value(&self, field: IndexField, old: &str, new: &str) -> Result<u64> {
        self.check_available()?;
        let category = match field {
            IndexField::Category => Some(new.parse::<Category>()?),
            _ => None,
        };
        let format = match field {
            IndexField::Format => Some(new.parse::<FileFormat>()?),
            _ => None,
        };

        let mut entries = self.entries.write().await;
        let mut renamed = 0;

        for entry in entries.values_mut() {
            if field.value_of(&entry.doc) != old {
                continue;
            }
            let mut doc = entry.doc.clone();
            match field {
                IndexField::Subject => doc.subject = new.to_string(),
                IndexField::Category => doc.category = category.unwrap_or(doc.category),
                IndexField::Format => doc.format = format.unwrap_or(doc.format),
            }
            *entry = IndexedEntry::new(doc);
            renamed += 1;
        }
        Ok(renamed)
    }

    async fn get(&self, id: Uuid) -> Result<Option<IndexDocument>> {
        self.check_available()?;
        Ok(self.entries.read().await.get(&id).map(|e| e.doc.clone()))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.unavailable.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use docshelf_core::{Category, FileFormat};

    fn doc(filename: &str, subject: &str, content: &str) -> IndexDocument {
        let now = Utc::now();
        IndexDocument {
            id: Uuid::now_v7(),
            owner_id: Uuid::now_v7(),
            filename: filename.to_string(),
            display_name: docshelf_core::display_name(filename),
            subject: subject.to_string(),
            category: Category::Notes,
            format: FileFormat::Txt,
            size_bytes: content.len() as i64,
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_exact_and_fuzzy_content_match() {
        let index = MemorySearchIndex::new();
        let d = doc("week1.txt", "Biology", "The mitochondria is the powerhouse");
        index.upsert(&d).await.unwrap();

        let exact = index.search(&SearchQuery::new("mitochondria")).await.unwrap();
        assert_eq!(exact.total, 1);
        assert_eq!(exact.hits[0].id, d.id);
        assert!(exact.hits[0].highlights[0].contains("<em>mitochondria</em>"));

        let typo = index.search(&SearchQuery::new("mitochondira")).await.unwrap();
        assert_eq!(typo.total, 1);
    }

    #[tokio::test]
    async fn test_filename_outranks_content() {
        let index = MemorySearchIndex::new();
        let in_name = doc("enzymes.txt", "Biology", "chapter four");
        let in_body = doc("chapter4.txt", "Biology", "enzymes catalyse reactions");
        index.upsert(&in_name).await.unwrap();
        index.upsert(&in_body).await.unwrap();

        let results = index.search(&SearchQuery::new("enzymes")).await.unwrap();
        assert_eq!(results.total, 2);
        assert_eq!(results.hits[0].id, in_name.id);
        assert_eq!(results.hits[1].id, in_body.id);
    }

    #[tokio::test]
    async fn test_all_terms_required() {
        let index = MemorySearchIndex::new();
        index
            .upsert(&doc("a.txt", "Biology", "cell membrane"))
            .await
            .unwrap();
        let results = index
            .search(&SearchQuery::new("membrane quantum"))
            .await
            .unwrap();
        assert_eq!(results.total, 0);
    }

    #[tokio::test]
    async fn test_filters_are_conjunctive() {
        let index = MemorySearchIndex::new();
        let mut slides = doc("a.pdf", "Biology", "osmosis");
        slides.category = Category::Slides;
        slides.format = FileFormat::Pdf;
        index.upsert(&slides).await.unwrap();
        index
            .upsert(&doc("b.txt", "Biology", "osmosis"))
            .await
            .unwrap();
        index
            .upsert(&doc("c.txt", "Physics", "osmosis"))
            .await
            .unwrap();

        let q = SearchQuery::new("osmosis")
            .with_subject("Biology")
            .with_category(Category::Slides);
        let results = index.search(&q).await.unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.hits[0].id, slides.id);
    }

    #[tokio::test]
    async fn test_empty_query_lists_newest_first() {
        let index = MemorySearchIndex::new();
        let mut older = doc("old.txt", "Biology", "");
        older.updated_at = Utc::now() - Duration::hours(1);
        let newer = doc("new.txt", "Biology", "");
        index.upsert(&older).await.unwrap();
        index.upsert(&newer).await.unwrap();

        let results = index.search(&SearchQuery::new("")).await.unwrap();
        assert_eq!(results.total, 2);
        assert_eq!(results.hits[0].id, newer.id);
    }

    #[tokio::test]
    async fn test_total_counts_before_pagination() {
        let index = MemorySearchIndex::new();
        for i in 0..5 {
            index
                .upsert(&doc(&format!("n{i}.txt"), "Biology", "glucose"))
                .await
                .unwrap();
        }
        let results = index
            .search(&SearchQuery::new("glucose").with_page(2, 4))
            .await
            .unwrap();
        assert_eq!(results.total, 5);
        assert_eq!(results.hits.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let index = MemorySearchIndex::new();
        let mut d = doc("a.txt", "Biology", "first");
        index.upsert(&d).await.unwrap();
        d.content = "second".to_string();
        index.upsert(&d).await.unwrap();

        assert_eq!(index.len().await, 1);
        assert_eq!(index.search(&SearchQuery::new("first")).await.unwrap().total, 0);
        assert_eq!(index.search(&SearchQuery::new("second")).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_aggregate_and_rename() {
        let index = MemorySearchIndex::new();
        index.upsert(&doc("a.txt", "Bio", "")).await.unwrap();
        index.upsert(&doc("b.txt", "Bio", "")).await.unwrap();
        index.upsert(&doc("c.txt", "Chem", "")).await.unwrap();

        let facets = index.aggregate_by(IndexField::Subject).await.unwrap();
        assert_eq!(facets[0], FacetCount { value: "Bio".into(), count: 2 });
        assert_eq!(facets[1], FacetCount { value: "Chem".into(), count: 1 });

        let renamed = index
            .rename_field_value(IndexField::Subject, "Bio", "Biology")
            .await
            .unwrap();
        assert_eq!(renamed, 2);
        let q = SearchQuery::new("").with_subject("Biology");
        assert_eq!(index.search(&q).await.unwrap().total, 2);
        let q = SearchQuery::new("").with_subject("Bio");
        assert_eq!(index.search(&q).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_ok() {
        let index = MemorySearchIndex::new();
        index.delete(Uuid::now_v7()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_switch() {
        let index = MemorySearchIndex::new();
        index.set_unavailable(true);
        assert!(matches!(
            index.search(&SearchQuery::new("x")).await,
            Err(Error::Index(_))
        ));
        assert!(!index.health_check().await.unwrap());
    }
}
