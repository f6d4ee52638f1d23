//! Decision caching.
//!
//! Caches final decisions keyed by a coarse request fingerprint so that
//! repeated identical requests skip rule evaluation entirely. The
//! fingerprint covers the stable identity of a request (tenant, subject,
//! resource, operation, device, source IP) and deliberately excludes
//! volatile fields like the timestamp and geolocation; those feed risk
//! scoring, which has its own much shorter TTL.
//!
//! - **Concurrent access**: DashMap for lock-free reads on the hot path
//! - **Eviction**: TTL sweeps when at capacity, falling back to least
//!   recently used so the map never grows unbounded
//! - **Invalidation**: `clear()` is called whenever the rule index is
//!   rebuilt, so a cached decision never outlives the rules it came from

use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use warden_core::{AccessRequest, Decision};

use crate::config::CacheConfig;

/// A cache key derived from the stable parts of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionCacheKey {
    tenant: String,
    subject_id: String,
    resource: String,
    operation: String,
    device_id: Option<String>,
    ip: Option<String>,
}

impl DecisionCacheKey {
    /// Build the fingerprint for a request.
    #[must_use]
    pub fn from_request(request: &AccessRequest) -> Self {
        Self {
            tenant: request.tenant.clone(),
            subject_id: request.subject.id.clone(),
            resource: request.resource.clone(),
            operation: request.operation.clone(),
            device_id: request.network.device_id.clone(),
            ip: request.network.ip.map(|ip| ip.to_string()),
        }
    }

    fn cache_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

struct CacheEntry {
    decision: Decision,
    risk_floor: f64,
    cached_at: Instant,
    /// Ticket of the most recent read, for LRU eviction.
    last_used: AtomicU64,
}

/// Thread-safe decision cache with TTL and LRU eviction.
pub struct DecisionCache {
    entries: DashMap<u64, CacheEntry>,
    config: CacheConfig,
    stats: Arc<CacheStatistics>,
    /// Monotonic access ticket stamped onto entries on use.
    ticket: AtomicU64,
}

impl std::fmt::Debug for DecisionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionCache")
            .field("capacity", &self.config.max_entries)
            .field("size", &self.entries.len())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

/// A cache hit, with the staleness of its risk component.
pub struct CachedDecision {
    /// The cached base decision, before risk escalation. Its
    /// `risk_score` field holds the score computed when it was cached.
    pub decision: Decision,
    /// The risk floor in effect when the entry was cached, from the
    /// winning rule's risk hint.
    pub risk_floor: f64,
    /// Whether the risk component has outlived its TTL and should be
    /// recomputed before the decision is served.
    pub risk_stale: bool,
}

impl DecisionCache {
    /// Create a cache from configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::with_capacity(config.max_entries.min(1024)),
            config,
            stats: Arc::new(CacheStatistics::default()),
            ticket: AtomicU64::new(0),
        }
    }

    /// Look up a cached decision for a request.
    ///
    /// Entries past the decision TTL are removed and count as misses.
    /// Entries whose risk component is past the risk TTL are still
    /// returned, flagged `risk_stale`, so the caller can re-score
    /// without re-running rule evaluation.
    pub fn get(&self, request: &AccessRequest) -> Option<CachedDecision> {
        let hash = DecisionCacheKey::from_request(request).cache_hash();

        if let Some(entry) = self.entries.get(&hash) {
            let age = entry.cached_at.elapsed();
            if age > self.config.decision_ttl {
                drop(entry);
                self.entries.remove(&hash);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                self.stats.size.store(self.entries.len(), Ordering::Relaxed);
                return None;
            }

            entry
                .last_used
                .store(self.next_ticket(), Ordering::Relaxed);
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Some(CachedDecision {
                decision: entry.decision.clone(),
                risk_floor: entry.risk_floor,
                risk_stale: age > self.config.risk_ttl,
            });
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert the base decision for a request, with the risk floor that
    /// applied to it.
    pub fn insert(&self, request: &AccessRequest, decision: Decision, risk_floor: f64) {
        if self.config.max_entries == 0 {
            return;
        }

        if self.entries.len() >= self.config.max_entries {
            self.evict();
        }

        let hash = DecisionCacheKey::from_request(request).cache_hash();
        self.entries.insert(
            hash,
            CacheEntry {
                decision,
                risk_floor,
                cached_at: Instant::now(),
                last_used: AtomicU64::new(self.next_ticket()),
            },
        );
        self.stats.insertions.fetch_add(1, Ordering::Relaxed);
        self.stats.size.store(self.entries.len(), Ordering::Relaxed);
    }

    /// Drop everything. Called on rule index rebuild.
    pub fn clear(&self) {
        self.entries.clear();
        self.stats.size.store(0, Ordering::Relaxed);
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    fn next_ticket(&self) -> u64 {
        self.ticket.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Sweep stale entries; if nothing was stale, evict the least
    /// recently used entry so an insert always has room.
    fn evict(&self) {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.cached_at.elapsed() <= self.config.decision_ttl);
        let removed = before.saturating_sub(self.entries.len());

        if removed == 0 {
            let coldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.last_used.load(Ordering::Relaxed))
                .map(|entry| *entry.key());
            if let Some(key) = coldest {
                self.entries.remove(&key);
            }
        }

        let evicted = before.saturating_sub(self.entries.len());
        self.stats
            .evictions
            .fetch_add(evicted as u64, Ordering::Relaxed);
        self.stats.size.store(self.entries.len(), Ordering::Relaxed);
    }
}

/// Cache statistics counters.
#[derive(Debug, Default)]
struct CacheStatistics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    insertions: AtomicU64,
    size: AtomicUsize,
}

impl CacheStatistics {
    fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total == 0.0 { 0.0 } else { hits / total }
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            size: self.size.load(Ordering::Relaxed),
            hit_ratio: self.hit_ratio(),
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub insertions: u64,
    pub size: usize,
    pub hit_ratio: f64,
}
