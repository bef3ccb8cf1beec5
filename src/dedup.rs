//! Bounded duplicate-suppression cache.
//!
//! The cache knows nothing about messages: callers supply a key function that
//! turns an item into a signature string. Keys are evicted oldest-first once
//! `max_cache_size` is reached, so a duplicate arriving after its key was
//! evicted is emitted again.

use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};

/// Default number of signatures retained.
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1000;

/// Cache tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupOptions {
    /// When false every item is emitted.
    pub enabled: bool,
    pub max_cache_size: usize,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
        }
    }
}

/// FIFO-bounded set of seen signatures.
#[derive(Debug, Clone, Default)]
pub struct DedupCache {
    options: DedupOptions,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl DedupCache {
    pub fn new(options: DedupOptions) -> Self {
        Self {
            options,
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Record `item` and report whether it should be emitted.
    ///
    /// Returns `false` only when the item's key is already present.
    pub fn should_emit<T, F>(&mut self, item: &T, key_fn: F) -> bool
    where
        T: ?Sized,
        F: FnOnce(&T) -> String,
    {
        if !self.options.enabled || self.options.max_cache_size == 0 {
            return true;
        }
        let key = key_fn(item);
        if self.seen.contains(&key) {
            return false;
        }
        while self.order.len() >= self.options.max_cache_size {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.seen.remove(&oldest);
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        true
    }

    /// Forget every recorded key.
    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn options(&self) -> DedupOptions {
        self.options
    }
}

/// Stable digest over signature fields.
///
/// Fields are length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
pub fn signature_digest(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(key: &str) -> String {
        key.to_string()
    }

    #[test]
    fn second_submission_of_same_key_is_suppressed() {
        let mut cache = DedupCache::new(DedupOptions::default());
        assert!(cache.should_emit("a", identity));
        assert!(!cache.should_emit("a", identity));
        assert!(cache.should_emit("b", identity));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn key_function_ignores_volatile_fields() {
        struct Delivery {
            id: u32,
            content: &'static str,
        }
        let mut cache = DedupCache::new(DedupOptions::default());
        let key = |d: &Delivery| d.content.to_string();
        assert!(cache.should_emit(&Delivery { id: 1, content: "hi" }, key));
        assert!(!cache.should_emit(&Delivery { id: 2, content: "hi" }, key));
    }

    #[test]
    fn overflow_evicts_oldest_keys_first() {
        let mut cache = DedupCache::new(DedupOptions {
            enabled: true,
            max_cache_size: 3,
        });
        for key in ["k0", "k1", "k2", "k3", "k4"] {
            assert!(cache.should_emit(key, identity));
        }
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("k0"));
        assert!(!cache.contains("k1"));
        assert!(cache.contains("k2"));
        assert!(cache.contains("k4"));
        // Evicted keys are accepted again.
        assert!(cache.should_emit("k0", identity));
    }

    #[test]
    fn disabled_cache_never_suppresses() {
        let mut cache = DedupCache::new(DedupOptions {
            enabled: false,
            max_cache_size: 10,
        });
        assert!(cache.should_emit("a", identity));
        assert!(cache.should_emit("a", identity));
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let mut cache = DedupCache::new(DedupOptions {
            enabled: true,
            max_cache_size: 0,
        });
        assert!(cache.should_emit("a", identity));
        assert!(cache.should_emit("a", identity));
    }

    #[test]
    fn clear_forgets_history() {
        let mut cache = DedupCache::new(DedupOptions::default());
        cache.should_emit("a", identity);
        cache.clear();
        assert!(cache.should_emit("a", identity));
    }

    #[test]
    fn signature_digest_is_field_boundary_sensitive() {
        assert_eq!(signature_digest(&["a", "b"]), signature_digest(&["a", "b"]));
        assert_ne!(signature_digest(&["ab", "c"]), signature_digest(&["a", "bc"]));
        assert_eq!(signature_digest(&["x"]).len(), 64);
    }

    #[cfg(feature = "fuzz-tests")]
    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn cache_never_exceeds_capacity(
                cap in 1usize..16,
                keys in proptest::collection::vec("[a-z]{1,3}", 0..64)
            ) {
                let mut cache = DedupCache::new(DedupOptions { enabled: true, max_cache_size: cap });
                for key in &keys {
                    cache.should_emit(key.as_str(), identity);
                    prop_assert!(cache.len() <= cap);
                }
            }
        }
    }
}
