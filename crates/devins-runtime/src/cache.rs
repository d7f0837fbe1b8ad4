//! Parsed document cache keyed by content hash

use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use devins_core::{ParseError, SourceDocument};

/// Default number of documents kept
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Default)]
struct Inner {
    documents: HashMap<String, Arc<SourceDocument>>,
    order: VecDeque<String>,
}

/// Bounded cache of parsed documents
///
/// Entries are keyed by the SHA-256 of the source text, so an edited file
/// is parsed again. The oldest entry is evicted first.
pub struct DocumentCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for DocumentCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl DocumentCache {
    /// Cache holding at most `capacity` documents
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Hex SHA-256 of `source`
    pub fn key(source: &str) -> String {
        hex::encode(Sha256::digest(source.as_bytes()))
    }

    /// Parsed form of `source`, parsing it on a miss. Parse errors are not
    /// cached.
    pub fn get_or_parse(&self, source: &str) -> Result<Arc<SourceDocument>, ParseError> {
        let key = Self::key(source);
        if let Some(document) = self.lock().documents.get(&key) {
            tracing::trace!(key = %key, "document cache hit");
            return Ok(document.clone());
        }

        let document = Arc::new(devins_core::parse(source)?);
        let mut inner = self.lock();
        if inner.documents.insert(key.clone(), document.clone()).is_none() {
            inner.order.push_back(key);
        }
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.documents.remove(&oldest);
            }
        }
        Ok(document)
    }

    /// Number of cached documents
    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.documents.clear();
        inner.order.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // The map stays consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_returns_same_document() {
        let cache = DocumentCache::default();
        let a = cache.get_or_parse("hello $name").unwrap();
        let b = cache.get_or_parse("hello $name").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_eviction_is_fifo() {
        let cache = DocumentCache::new(2);
        let first = cache.get_or_parse("one").unwrap();
        cache.get_or_parse("two").unwrap();
        cache.get_or_parse("three").unwrap();
        assert_eq!(cache.len(), 2);
        let again = cache.get_or_parse("one").unwrap();
        assert!(!Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn test_parse_errors_are_not_cached() {
        let cache = DocumentCache::default();
        assert!(cache.get_or_parse("---\nwhen: { $a\n---\nbody").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_is_sha256() {
        assert_eq!(
            DocumentCache::key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
