//! State overlay resolver
//!
//! Produces the latest view of an account, pool, or NFT by folding every
//! pending mempool delta, in admission order, onto the last durable
//! snapshot. Results are cached per key; only callers holding the
//! resource's lock fill the cache.

use std::sync::Arc;

use crate::cache::{CacheKey, CachedState, OverlayCache};
use crate::constants::NIL_NONCE;
use crate::entity::{compute_new_balance, parse_entity, Account, AccountAsset, LiquidityInfo, NftInfo};
use crate::error::{Error, Result};
use crate::storage::LedgerStore;
use crate::types::AssetType;

/// Whether a resolution may populate the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFill {
    /// Caller holds the resource lock
    Write,
    /// Read-only caller
    ReadOnly,
}

/// Latest-state reader over a ledger store and the pending pool
#[derive(Clone)]
pub struct StateResolver {
    store: Arc<dyn LedgerStore>,
    cache: Arc<OverlayCache>,
}

impl std::fmt::Debug for StateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateResolver")
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl StateResolver {
    /// Create over a store and cache
    pub fn new(store: Arc<dyn LedgerStore>, cache: Arc<OverlayCache>) -> Self {
        Self { store, cache }
    }

    /// Durable account snapshot only, no mempool overlay
    pub fn basic_account(&self, account_index: i64) -> Result<Account> {
        self.store.get_account(account_index)
    }

    /// Latest account: durable snapshot plus pending deltas
    ///
    /// The stored nonce is the next expected one; every pending transaction
    /// submitted by the account moves it past that transaction's nonce.
    pub fn latest_account(&self, account_index: i64, fill: CacheFill) -> Result<Account> {
        let key = CacheKey::Account(account_index);
        if let Some(CachedState::Account(account)) = self.cache.get(key) {
            return Ok(account);
        }
        let epoch = self.cache.epoch(key);

        let mut account = self.store.get_account(account_index)?;
        let pending = self.store.pending_txs_for_account(account_index)?;
        for tx in &pending {
            if tx.account_index == account_index && tx.nonce != NIL_NONCE {
                account.nonce = tx.nonce + 1;
            }
            for detail in tx.details.iter().filter(|d| d.account_index == account_index) {
                match detail.asset_type {
                    AssetType::General => {
                        let delta: AccountAsset = parse_entity(&detail.balance_delta)?;
                        if delta.asset_id != detail.asset_id {
                            return Err(Error::MalformedSnapshot(format!(
                                "detail of tx {} targets asset {} but carries {}",
                                tx.tx_hash, detail.asset_id, delta.asset_id
                            )));
                        }
                        account = account.apply_asset_delta(&delta)?;
                    }
                    AssetType::CollectionNonce => {
                        // the detail carries the consumed collection id
                        let consumed = compute_new_balance(
                            AssetType::CollectionNonce,
                            &account.collection_nonce.to_string(),
                            &detail.balance_delta,
                        )?;
                        let consumed: i64 = consumed
                            .parse()
                            .map_err(|_| Error::MalformedSnapshot(consumed.clone()))?;
                        account.collection_nonce = consumed + 1;
                    }
                    AssetType::Liquidity | AssetType::Nft => {}
                }
            }
        }

        tracing::debug!(
            account_index,
            pending = pending.len(),
            nonce = account.nonce,
            "Account overlay folded"
        );

        if fill == CacheFill::Write {
            self.cache
                .insert_if_current(key, epoch, CachedState::Account(account.clone()));
        }
        Ok(account)
    }

    /// Latest pool: durable snapshot plus pending pool deltas
    pub fn latest_liquidity(&self, pair_index: i64, fill: CacheFill) -> Result<LiquidityInfo> {
        let key = CacheKey::Liquidity(pair_index);
        if let Some(CachedState::Liquidity(pool)) = self.cache.get(key) {
            return Ok(pool);
        }
        let epoch = self.cache.epoch(key);

        let mut pool = self.store.get_liquidity(pair_index)?;
        let pending = self.store.pending_details(AssetType::Liquidity, pair_index)?;
        for detail in &pending {
            let delta: LiquidityInfo = parse_entity(&detail.balance_delta)?;
            pool = pool.apply(&delta)?;
        }

        tracing::debug!(pair_index, pending = pending.len(), "Liquidity overlay folded");

        if fill == CacheFill::Write {
            self.cache
                .insert_if_current(key, epoch, CachedState::Liquidity(pool.clone()));
        }
        Ok(pool)
    }

    /// Latest NFT: durable snapshot replaced by the last pending record
    pub fn latest_nft(&self, nft_index: i64, fill: CacheFill) -> Result<NftInfo> {
        let key = CacheKey::Nft(nft_index);
        if let Some(CachedState::Nft(nft)) = self.cache.get(key) {
            return Ok(nft);
        }
        let epoch = self.cache.epoch(key);

        let mut nft = self.store.get_nft(nft_index)?;
        let pending = self.store.pending_details(AssetType::Nft, nft_index)?;
        for detail in &pending {
            nft = parse_entity(&detail.balance_delta)?;
        }

        tracing::debug!(nft_index, pending = pending.len(), "NFT overlay folded");

        if fill == CacheFill::Write {
            self.cache.insert_if_current(key, epoch, CachedState::Nft(nft.clone()));
        }
        Ok(nft)
    }

    /// Next NFT index to issue
    pub fn next_nft_index(&self) -> Result<i64> {
        Ok(self.store.latest_nft_index()?.map_or(0, |i| i + 1))
    }

    /// Next offer id of an account
    pub fn next_offer_id(&self, account_index: i64) -> Result<i64> {
        Ok(self.store.latest_offer_id(account_index)?.map_or(0, |i| i + 1))
    }

    /// Drop cached overlays
    pub fn invalidate(&self, keys: impl IntoIterator<Item = CacheKey>) {
        for key in keys {
            self.cache.invalidate(key);
        }
    }
}
