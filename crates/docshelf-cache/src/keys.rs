//! Cache keys and invalidation tags.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use docshelf_core::defaults;

/// Hex characters of the SHA-256 digest kept in a key.
const KEY_HASH_CHARS: usize = 32;

/// Invalidation tag attached to cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTag {
    /// Anything derived from the set of documents.
    Files,
    /// Anything derived from subject names.
    Subjects,
    /// Library-wide totals.
    Stats,
}

impl CacheTag {
    pub const ALL: [CacheTag; 3] = [CacheTag::Files, CacheTag::Subjects, CacheTag::Stats];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTag::Files => "files",
            CacheTag::Subjects => "subjects",
            CacheTag::Stats => "stats",
        }
    }
}

/// Store key of a tag's generation counter.
pub fn generation_key(tag: &str) -> String {
    format!("{}{}", defaults::CACHE_GENERATION_PREFIX, tag)
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sorted, deduplicated copy of `tags`.
pub fn canonical_tags(tags: &[CacheTag]) -> Vec<CacheTag> {
    let mut tags = tags.to_vec();
    tags.sort();
    tags.dedup();
    tags
}

/// Deterministic cache key: a namespace plus ordered request parameters.
///
/// An absent parameter and an empty one hash differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    namespace: &'static str,
    params: Vec<(&'static str, Option<String>)>,
}

impl CacheKey {
    pub fn new(namespace: &'static str) -> Self {
        Self {
            namespace,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: &'static str, value: impl ToString) -> Self {
        self.params.push((name, Some(value.to_string())));
        self
    }

    pub fn param_opt<V: ToString>(mut self, name: &'static str, value: Option<V>) -> Self {
        self.params.push((name, value.map(|v| v.to_string())));
        self
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Store key: `ds:cache:<namespace>:<32 hex chars>`.
    pub fn to_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.namespace.as_bytes());
        for (name, value) in &self.params {
            hasher.update([0u8]);
            hasher.update(name.as_bytes());
            match value {
                None => hasher.update([0u8]),
                Some(v) => {
                    hasher.update([1u8]);
                    hasher.update((v.len() as u64).to_le_bytes());
                    hasher.update(v.as_bytes());
                }
            }
        }
        let hash = hex::encode(hasher.finalize());
        format!(
            "{}{}:{}",
            defaults::CACHE_KEY_PREFIX,
            self.namespace,
            &hash[..KEY_HASH_CHARS]
        )
    }
}
