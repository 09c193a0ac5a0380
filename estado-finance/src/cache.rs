//! Category memo keyed by normalized description.

use dashmap::DashMap;
use estado_core::Category;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedCategory {
    pub category: Category,
    pub confidence: f64,
    /// False when the entry records a failed or unusable model answer
    pub resolved: bool,
}

pub trait CategoryCache: Send + Sync {
    fn get(&self, key: &str) -> Option<CachedCategory>;

    fn insert(&self, key: String, value: CachedCategory);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct MemoryCategoryCache {
    entries: DashMap<String, CachedCategory>,
}

impl MemoryCategoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl CategoryCache for MemoryCategoryCache {
    fn get(&self, key: &str) -> Option<CachedCategory> {
        self.entries.get(key).map(|e| *e.value())
    }

    fn insert(&self, key: String, value: CachedCategory) {
        self.entries.insert(key, value);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache = MemoryCategoryCache::new();
        assert!(cache.is_empty());
        cache.insert(
            "TAQUITOS DON PEPE".into(),
            CachedCategory {
                category: Category::Food,
                confidence: 0.6,
                resolved: true,
            },
        );
        assert_eq!(cache.get("TAQUITOS DON PEPE").map(|c| c.category), Some(Category::Food));
        assert!(cache.get("otra cosa").is_none());
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
