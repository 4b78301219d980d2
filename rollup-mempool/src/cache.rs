//! Short-lived read-through cache of overlay results
//!
//! Each key carries an epoch bumped by every invalidation. A resolver takes
//! the epoch before folding and stores its result only if the epoch is
//! unchanged, so a fold that raced an admission never lands in the cache.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::entity::{Account, LiquidityInfo, NftInfo};

/// Cached resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Account overlay
    Account(i64),
    /// Pool overlay
    Liquidity(i64),
    /// NFT overlay
    Nft(i64),
}

/// Cached overlay value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedState {
    /// Account overlay
    Account(Account),
    /// Pool overlay
    Liquidity(LiquidityInfo),
    /// NFT overlay
    Nft(NftInfo),
}

#[derive(Debug)]
struct Entry {
    value: Option<(CachedState, Instant)>,
    epoch: u64,
}

/// Overlay cache with per-kind TTL
#[derive(Debug)]
pub struct OverlayCache {
    entries: DashMap<CacheKey, Entry>,
    next_epoch: AtomicU64,
    swept_floor: AtomicU64,
    config: CacheConfig,
}

impl OverlayCache {
    /// Create from configuration
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            next_epoch: AtomicU64::new(0),
            swept_floor: AtomicU64::new(0),
            config: config.clone(),
        }
    }

    fn ttl(&self, key: CacheKey) -> Duration {
        let ms = match key {
            CacheKey::Account(_) => self.config.account_ttl_ms,
            CacheKey::Liquidity(_) => self.config.liquidity_ttl_ms,
            CacheKey::Nft(_) => self.config.nft_ttl_ms,
        };
        Duration::from_millis(ms)
    }

    /// Current epoch of `key`
    pub fn epoch(&self, key: CacheKey) -> u64 {
        self.entries
            .get(&key)
            .map(|e| e.epoch)
            .unwrap_or_else(|| self.swept_floor.load(Ordering::SeqCst))
    }

    /// Fresh cached value of `key`
    pub fn get(&self, key: CacheKey) -> Option<CachedState> {
        let entry = self.entries.get(&key)?;
        let (value, stored_at) = entry.value.as_ref()?;
        if stored_at.elapsed() > self.ttl(key) {
            return None;
        }
        Some(value.clone())
    }

    /// Store `value` if no invalidation happened since `epoch` was read
    pub fn insert_if_current(&self, key: CacheKey, epoch: u64, value: CachedState) -> bool {
        if self.entries.len() >= self.config.max_entries {
            self.sweep();
        }
        let floor = self.swept_floor.load(Ordering::SeqCst);
        let mut entry = self.entries.entry(key).or_insert_with(|| Entry {
            value: None,
            epoch: floor,
        });
        if entry.epoch != epoch {
            return false;
        }
        entry.value = Some((value, Instant::now()));
        true
    }

    /// Drop the cached value of `key` and bump its epoch
    pub fn invalidate(&self, key: CacheKey) {
        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let epoch = epoch.max(self.swept_floor.load(Ordering::SeqCst) + 1);
        self.entries.insert(key, Entry { value: None, epoch });
    }

    /// Remove expired and empty entries
    pub fn sweep(&self) {
        let floor = self.next_epoch.load(Ordering::SeqCst) + 1;
        self.swept_floor.fetch_max(floor, Ordering::SeqCst);
        self.next_epoch.fetch_max(floor, Ordering::SeqCst);
        self.entries.retain(|key, entry| match &entry.value {
            Some((_, stored_at)) => stored_at.elapsed() <= self.ttl(*key),
            None => false,
        });
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
