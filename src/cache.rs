use std::collections::{HashMap, VecDeque};

use sha2::{Digest, Sha256};

use crate::types::{TargetMode, TransformResult};

/// Memo of finished transforms keyed by source content and target mode.
///
/// Bounded; the oldest entry is evicted first. The engine never consults it,
/// the embedding build tool does.
#[derive(Debug)]
pub struct TransformCache {
    capacity: usize,
    entries: HashMap<(String, TargetMode), TransformResult>,
    order: VecDeque<(String, TargetMode)>,
}

impl TransformCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn compute_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, source: &str, mode: TargetMode) -> Option<&TransformResult> {
        self.entries.get(&(Self::compute_hash(source), mode))
    }

    pub fn set(&mut self, source: &str, mode: TargetMode, result: TransformResult) {
        if self.capacity == 0 {
            return;
        }
        let key = (Self::compute_hash(source), mode);
        if self.entries.insert(key.clone(), result).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                tracing::debug!(hash = %oldest.0, "evicting cached transform");
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

impl Default for TransformCache {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(text: &str) -> TransformResult {
        TransformResult {
            generated_text: text.to_string(),
            source_map: None,
            dependency_list: Vec::new(),
        }
    }

    #[test]
    fn test_hash_is_stable_hex() {
        let hash = TransformCache::compute_hash("fetch('/api/records')");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, TransformCache::compute_hash("fetch('/api/records')"));
        assert_ne!(hash, TransformCache::compute_hash("fetch('/api/record')"));
    }

    #[test]
    fn test_keyed_by_mode() {
        let mut cache = TransformCache::new(4);
        cache.set("a", TargetMode::Production, result("prod"));
        assert_eq!(cache.get("a", TargetMode::Production).unwrap().generated_text, "prod");
        assert!(cache.get("a", TargetMode::Development).is_none());
    }

    #[test]
    fn test_evicts_oldest() {
        let mut cache = TransformCache::new(2);
        cache.set("a", TargetMode::Production, result("1"));
        cache.set("b", TargetMode::Production, result("2"));
        // Overwriting keeps the original insertion slot.
        cache.set("a", TargetMode::Production, result("1b"));
        cache.set("c", TargetMode::Production, result("3"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a", TargetMode::Production).is_none());
        assert_eq!(cache.get("b", TargetMode::Production).unwrap().generated_text, "2");
        assert_eq!(cache.get("c", TargetMode::Production).unwrap().generated_text, "3");

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut cache = TransformCache::new(0);
        cache.set("a", TargetMode::Production, result("1"));
        assert!(cache.is_empty());
    }
}
