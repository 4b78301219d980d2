//! Per-resource mutual exclusion
//!
//! Every read-modify-write of a pool, NFT, or id counter happens while the
//! submission holds that resource's lock. A submission takes all of its locks
//! at once through [`LockService::acquire`], which sorts the keys into one
//! global order, so two submissions can never wait on each other in a cycle.
//! Locks are released when the returned [`LockSet`] is dropped, on every exit
//! path including panics.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::LockConfig;
use crate::error::{Error, Result};

/// Lockable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    /// Account nonce of a submitter or a debited counterparty
    Account(i64),
    /// Liquidity pool by pair index
    Liquidity(i64),
    /// NFT by index
    Nft(i64),
    /// Next NFT index counter
    NftIndexCounter,
    /// Next offer id counter of an account
    OfferCounter(i64),
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Account(i) => write!(f, "lock:account:{}", i),
            ResourceKey::Liquidity(i) => write!(f, "lock:liquidity:{}", i),
            ResourceKey::Nft(i) => write!(f, "lock:nft:{}", i),
            ResourceKey::NftIndexCounter => write!(f, "lock:nft_index"),
            ResourceKey::OfferCounter(i) => write!(f, "lock:offer_id:{}", i),
        }
    }
}

/// Locks held by one submission
pub struct LockSet {
    guards: Vec<(ResourceKey, OwnedMutexGuard<()>)>,
    waited: Duration,
}

impl LockSet {
    /// Whether `key` is held
    pub fn holds(&self, key: ResourceKey) -> bool {
        self.guards.iter().any(|(k, _)| *k == key)
    }

    /// Held keys in acquisition order
    pub fn keys(&self) -> impl Iterator<Item = ResourceKey> + '_ {
        self.guards.iter().map(|(k, _)| *k)
    }

    /// Time spent waiting for the locks
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

impl fmt::Debug for LockSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockSet")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .field("waited", &self.waited)
            .finish()
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        // reverse acquisition order
        while let Some((key, guard)) = self.guards.pop() {
            drop(guard);
            tracing::trace!(key = %key, "Lock released");
        }
    }
}

/// In-process lock table keyed by [`ResourceKey`]
#[derive(Debug)]
pub struct LockService {
    locks: DashMap<ResourceKey, Arc<Mutex<()>>>,
    timeout: Duration,
}

/// Lock table size above which idle entries are swept
const PRUNE_THRESHOLD: usize = 4_096;

impl LockService {
    /// Create with the configured bounded wait
    pub fn new(config: &LockConfig) -> Self {
        Self {
            locks: DashMap::new(),
            timeout: config.acquire_timeout(),
        }
    }

    /// Acquire every key, in global order, within one bounded wait
    ///
    /// On timeout nothing stays held and [`Error::LockTimeout`] names the
    /// key that could not be taken.
    pub async fn acquire(&self, keys: impl IntoIterator<Item = ResourceKey>) -> Result<LockSet> {
        let mut keys: Vec<ResourceKey> = keys.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();

        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut set = LockSet {
            guards: Vec::with_capacity(keys.len()),
            waited: Duration::ZERO,
        };

        for key in keys {
            let mutex = self.locks.entry(key).or_default().clone();
            match tokio::time::timeout_at(deadline, mutex.lock_owned()).await {
                Ok(guard) => {
                    tracing::trace!(key = %key, "Lock acquired");
                    set.guards.push((key, guard));
                }
                Err(_) => {
                    tracing::debug!(key = %key, timeout_ms = self.timeout.as_millis() as u64, "Lock wait timed out");
                    return Err(Error::LockTimeout(key.to_string()));
                }
            }
        }

        set.waited = started.elapsed();
        if self.locks.len() > PRUNE_THRESHOLD {
            self.prune_idle();
        }
        Ok(set)
    }

    /// Drop table entries nobody holds or waits on
    pub fn prune_idle(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no key is tracked
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service(timeout_ms: u64) -> Arc<LockService> {
        Arc::new(LockService::new(&LockConfig {
            acquire_timeout_ms: timeout_ms,
        }))
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let locks = service(100);
        let set = locks
            .acquire([ResourceKey::Liquidity(1), ResourceKey::Account(3), ResourceKey::Account(3)])
            .await
            .unwrap();
        assert!(set.holds(ResourceKey::Account(3)));
        assert!(set.holds(ResourceKey::Liquidity(1)));
        assert_eq!(
            set.keys().collect::<Vec<_>>(),
            vec![ResourceKey::Account(3), ResourceKey::Liquidity(1)]
        );
        drop(set);

        // free again
        let again = locks.acquire([ResourceKey::Liquidity(1)]).await.unwrap();
        assert!(again.holds(ResourceKey::Liquidity(1)));
    }

    #[tokio::test]
    async fn test_timeout_releases_partial_set() {
        let locks = service(50);
        let held = locks.acquire([ResourceKey::Nft(9)]).await.unwrap();

        let err = locks
            .acquire([ResourceKey::Account(1), ResourceKey::Nft(9)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LockTimeout(ref key) if key == "lock:nft:9"));
        assert!(err.is_retryable());

        // account 1 was not left held by the failed attempt
        let account = locks.acquire([ResourceKey::Account(1)]).await.unwrap();
        drop(account);
        drop(held);
    }

    #[tokio::test]
    async fn test_mutual_exclusion() {
        let locks = service(5_000);
        let inside = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..16 {
            let locks = locks.clone();
            let inside = inside.clone();
            handles.push(tokio::spawn(async move {
                let _set = locks.acquire([ResourceKey::Liquidity(0)]).await.unwrap();
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                tokio::task::yield_now().await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_prune_idle() {
        let locks = service(100);
        let held = locks.acquire([ResourceKey::Account(1)]).await.unwrap();
        drop(locks.acquire([ResourceKey::Account(2)]).await.unwrap());
        assert_eq!(locks.len(), 2);

        locks.prune_idle();
        assert_eq!(locks.len(), 1);
        drop(held);
        locks.prune_idle();
        assert!(locks.is_empty());
    }

    #[test]
    fn test_key_order() {
        let mut keys = vec![
            ResourceKey::OfferCounter(1),
            ResourceKey::Nft(2),
            ResourceKey::Account(5),
            ResourceKey::NftIndexCounter,
            ResourceKey::Liquidity(0),
        ];
        keys.sort();
        assert_eq!(keys[0], ResourceKey::Account(5));
        assert_eq!(keys[4], ResourceKey::OfferCounter(1));
        assert_eq!(ResourceKey::NftIndexCounter.to_string(), "lock:nft_index");
    }
}
