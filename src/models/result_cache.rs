//! LRU cache of successful analysis results.
//!
//! Keyed by a SHA-256 over the entry point, the serialized input, and the
//! artifact identity that served the request.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::metadata::ArtifactType;

/// Which processing path produced a cached result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    Parsing,
    Prioritization,
    Insights,
}

impl EntryPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryPoint::Parsing => "parsing",
            EntryPoint::Prioritization => "prioritization",
            EntryPoint::Insights => "insights",
        }
    }

    /// Artifact type that serves this entry point.
    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            EntryPoint::Parsing => ArtifactType::Parser,
            EntryPoint::Prioritization => ArtifactType::Prioritizer,
            EntryPoint::Insights => ArtifactType::Insights,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedResult {
    value: Value,
    last_used: u64,
}

/// Hit/miss counters and occupancy for one cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Bounded LRU with hash-based lookup.
#[derive(Debug)]
pub struct ResultCache {
    entries: HashMap<[u8; 32], CachedResult>,
    capacity: usize,
    access_counter: u64,
    hits: u64,
    misses: u64,
}

impl ResultCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.min(1024)),
            capacity,
            access_counter: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub fn key(entry_point: EntryPoint, input: &Value, name: &str, version: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(entry_point.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(input.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(version.as_bytes());
        hasher.finalize().into()
    }

    pub fn get(&mut self, key: &[u8; 32]) -> Option<Value> {
        self.access_counter += 1;
        let counter = self.access_counter;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = counter;
                self.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, key: [u8; 32], value: Value) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }

        self.access_counter += 1;
        self.entries.insert(
            key,
            CachedResult {
                value,
                last_used: self.access_counter,
            },
        );
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| *k);

        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.hits as f64 / lookups as f64
            },
        }
    }
}
