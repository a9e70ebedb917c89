// In-memory summary cache
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::preprocess::collapse_whitespace;
use crate::service::{SummaryParams, SummaryResult};

/// Identity of a summarisation: normalized input text plus the generation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(text: &str, params: &SummaryParams) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(collapse_whitespace(text).as_bytes());
        hasher.update(
            format!(
                "|{}|{}|{}|{:.3}",
                params.max_length, params.min_length, params.do_sample, params.temperature
            )
            .as_bytes(),
        );
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 100,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl From<Option<&common::CacheConfig>> for CacheSettings {
    fn from(cfg: Option<&common::CacheConfig>) -> Self {
        let defaults = Self::default();
        Self {
            enabled: cfg.and_then(|c| c.enabled).unwrap_or(defaults.enabled),
            capacity: cfg.and_then(|c| c.capacity).unwrap_or(defaults.capacity),
            ttl: cfg
                .and_then(|c| c.ttl_seconds)
                .map(Duration::from_secs)
                .unwrap_or(defaults.ttl),
        }
    }
}

#[derive(Default)]
struct Entries {
    map: HashMap<CacheKey, (Instant, SummaryResult)>,
    // insertion order, oldest first
    order: VecDeque<CacheKey>,
}

/// Bounded cache of finished summaries. Oldest entries are evicted first;
/// entries older than the TTL are treated as misses.
/// A disabled cache or a zero capacity never hits.
pub struct SummaryCache {
    settings: CacheSettings,
    entries: Mutex<Entries>,
}

impl SummaryCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            entries: Mutex::new(Entries::default()),
        }
    }

    fn active(&self) -> bool {
        self.settings.enabled && self.settings.capacity > 0
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &CacheKey) -> Option<SummaryResult> {
        if !self.active() {
            return None;
        }
        let mut entries = self.entries();
        let expired = match entries.map.get(key) {
            Some((stored_at, result)) if stored_at.elapsed() < self.settings.ttl => {
                return Some(result.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.map.remove(key);
            entries.order.retain(|k| k != key);
        }
        None
    }

    pub fn insert(&self, key: CacheKey, result: SummaryResult) {
        if !self.active() {
            return;
        }
        let mut entries = self.entries();
        if entries.map.insert(key.clone(), (Instant::now(), result)).is_some() {
            entries.order.retain(|k| k != &key);
        }
        entries.order.push_back(key);

        while entries.map.len() > self.settings.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.map.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
