// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared caches that deduplicate upstream work across subscribers.
//!
//! Both caches are keyed by normalized inputs and guarded by
//! reader-preferring locks. Lock guards are never held across await points.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use mmcs_core::Item;
use tracing::debug;

/// Entry cap; exceeding it clears the whole translation map.
const TRANSLATION_CACHE_CAP: usize = 1_200;

/// How long a shared search result stays valid. Intentionally short: the
/// cache exists to collapse identical searches from concurrent subscribers
/// within one cycle, nothing more.
const SEARCH_CACHE_TTL_SECS: i64 = 30;

/// Entry count above which an insert triggers a mid-cycle sweep.
const SEARCH_CACHE_SWEEP_LEN: usize = 100;

/// English term → Japanese term. No per-entry TTL: English search terms are
/// considered stable. Eviction is coarse — the whole map is cleared past the
/// cap.
#[derive(Debug, Default)]
pub struct TranslationCache {
    map: RwLock<HashMap<String, String>>,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the cached translation for the exact English string.
    pub fn get(&self, term: &str) -> Option<String> {
        self.map
            .read()
            .expect("translation cache lock poisoned")
            .get(term)
            .cloned()
    }

    pub fn insert(&self, term: &str, japanese: &str) {
        let mut map = self.map.write().expect("translation cache lock poisoned");
        map.insert(term.to_string(), japanese.to_string());
        if map.len() > TRANSLATION_CACHE_CAP {
            debug!(len = map.len(), "translation cache over cap, clearing");
            map.clear();
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map.read().unwrap().len()
    }
}

#[derive(Debug, Clone)]
struct CachedSearch {
    items: Vec<Item>,
    expires_at: DateTime<Utc>,
}

/// `(japaneseTerm, sortedMarketCSV)` → search results, with a 30-second TTL.
///
/// Values are stored and returned as owned copies: the items are consumed by
/// parallel subscriber tasks after the seen-filter stage.
#[derive(Debug, Default)]
pub struct SearchCache {
    map: RwLock<HashMap<String, CachedSearch>>,
}

impl SearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache key for a search: the Japanese term and the sorted market
    /// CSV, colon-joined.
    pub fn key(term_jp: &str, market_keys: &[String]) -> String {
        format!("{term_jp}:{}", market_keys.join(","))
    }

    /// Returns a copy of the cached items, or `None` past the entry's expiry.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<Vec<Item>> {
        let map = self.map.read().expect("search cache lock poisoned");
        let cached = map.get(key)?;
        if now >= cached.expires_at {
            return None;
        }
        Some(cached.items.clone())
    }

    pub fn insert(&self, key: &str, items: &[Item], now: DateTime<Utc>) {
        let mut map = self.map.write().expect("search cache lock poisoned");
        map.insert(
            key.to_string(),
            CachedSearch {
                items: items.to_vec(),
                expires_at: now + Duration::seconds(SEARCH_CACHE_TTL_SECS),
            },
        );
        if map.len() > SEARCH_CACHE_SWEEP_LEN {
            map.retain(|_, cached| now < cached.expires_at);
        }
    }

    /// Drops every expired entry; runs at the end of each cycle.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut map = self.map.write().expect("search cache lock poisoned");
        let before = map.len();
        map.retain(|_, cached| now < cached.expires_at);
        before - map.len()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map.read().unwrap().len()
    }
}
