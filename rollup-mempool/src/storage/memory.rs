//! In-memory ledger store

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use super::{is_pending_detail_of, Companion, LedgerStore};
use crate::entity::{Account, LiquidityInfo, NftInfo};
use crate::error::{Error, Result};
use crate::types::{AssetType, Collection, FailedTransaction, MempoolTx, MempoolTxDetail, OfferRecord};

#[derive(Debug, Default)]
struct Inner {
    accounts: BTreeMap<i64, Account>,
    account_history: BTreeMap<(i64, i64), Account>,
    liquidity: BTreeMap<i64, LiquidityInfo>,
    liquidity_history: BTreeMap<(i64, i64), LiquidityInfo>,
    nfts: BTreeMap<i64, NftInfo>,
    nft_history: BTreeMap<(i64, i64), NftInfo>,
    mempool: Vec<MempoolTx>,
    mempool_by_hash: HashMap<String, usize>,
    offers: BTreeMap<(i64, i64), OfferRecord>,
    collections: BTreeMap<(i64, i64), Collection>,
    fail_txs: Vec<FailedTransaction>,
}

/// Ledger store backed by ordered maps behind one lock
///
/// Every write holds the lock for its whole duration, so an admission and
/// its companion row become visible together.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

fn latest_history<T: Clone>(history: &BTreeMap<(i64, i64), T>, index: i64) -> Option<T> {
    history
        .range((index, i64::MIN)..=(index, i64::MAX))
        .next_back()
        .map(|(_, v)| v.clone())
}

impl LedgerStore for MemoryStore {
    fn get_account(&self, account_index: i64) -> Result<Account> {
        let inner = self.inner.read();
        inner
            .accounts
            .get(&account_index)
            .cloned()
            .or_else(|| latest_history(&inner.account_history, account_index))
            .ok_or_else(|| Error::ResourceNotFound(format!("account {}", account_index)))
    }

    fn get_liquidity(&self, pair_index: i64) -> Result<LiquidityInfo> {
        let inner = self.inner.read();
        inner
            .liquidity
            .get(&pair_index)
            .cloned()
            .or_else(|| latest_history(&inner.liquidity_history, pair_index))
            .ok_or_else(|| Error::ResourceNotFound(format!("liquidity {}", pair_index)))
    }

    fn get_nft(&self, nft_index: i64) -> Result<NftInfo> {
        let inner = self.inner.read();
        inner
            .nfts
            .get(&nft_index)
            .cloned()
            .or_else(|| latest_history(&inner.nft_history, nft_index))
            .ok_or_else(|| Error::ResourceNotFound(format!("nft {}", nft_index)))
    }

    fn put_account(&self, account: &Account) -> Result<()> {
        self.inner.write().accounts.insert(account.account_index, account.clone());
        Ok(())
    }

    fn put_account_history(&self, account: &Account, block_height: i64) -> Result<()> {
        self.inner
            .write()
            .account_history
            .insert((account.account_index, block_height), account.clone());
        Ok(())
    }

    fn put_liquidity(&self, liquidity: &LiquidityInfo) -> Result<()> {
        self.inner.write().liquidity.insert(liquidity.pair_index, liquidity.clone());
        Ok(())
    }

    fn put_liquidity_history(&self, liquidity: &LiquidityInfo, block_height: i64) -> Result<()> {
        self.inner
            .write()
            .liquidity_history
            .insert((liquidity.pair_index, block_height), liquidity.clone());
        Ok(())
    }

    fn put_nft(&self, nft: &NftInfo) -> Result<()> {
        self.inner.write().nfts.insert(nft.nft_index, nft.clone());
        Ok(())
    }

    fn put_nft_history(&self, nft: &NftInfo, block_height: i64) -> Result<()> {
        self.inner
            .write()
            .nft_history
            .insert((nft.nft_index, block_height), nft.clone());
        Ok(())
    }

    fn pending_txs_for_account(&self, account_index: i64) -> Result<Vec<MempoolTx>> {
        let inner = self.inner.read();
        Ok(inner
            .mempool
            .iter()
            .filter(|tx| tx.is_pending() && tx.touches_account(account_index))
            .cloned()
            .collect())
    }

    fn pending_details(&self, asset_type: AssetType, asset_id: i64) -> Result<Vec<MempoolTxDetail>> {
        let inner = self.inner.read();
        Ok(inner
            .mempool
            .iter()
            .filter(|tx| tx.is_pending())
            .flat_map(|tx| tx.details.iter())
            .filter(|d| is_pending_detail_of(d, asset_type, asset_id))
            .cloned()
            .collect())
    }

    fn latest_nft_index(&self) -> Result<Option<i64>> {
        let inner = self.inner.read();
        let confirmed = inner.nfts.keys().next_back().copied();
        let history = inner.nft_history.keys().map(|(index, _)| *index).max();
        Ok(confirmed.max(history))
    }

    fn latest_offer_id(&self, account_index: i64) -> Result<Option<i64>> {
        let inner = self.inner.read();
        Ok(inner
            .offers
            .range((account_index, i64::MIN)..=(account_index, i64::MAX))
            .next_back()
            .map(|((_, offer_id), _)| *offer_id))
    }

    fn get_mempool_tx(&self, tx_hash: &str) -> Result<MempoolTx> {
        let inner = self.inner.read();
        inner
            .mempool_by_hash
            .get(tx_hash)
            .and_then(|pos| inner.mempool.get(*pos))
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound(format!("mempool tx {}", tx_hash)))
    }

    fn pending_tx_count(&self) -> Result<u64> {
        Ok(self.inner.read().mempool.iter().filter(|tx| tx.is_pending()).count() as u64)
    }

    fn admit(&self, tx: &MempoolTx, companion: &Companion) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.mempool_by_hash.contains_key(&tx.tx_hash) {
            return Err(Error::InvariantViolation(format!("duplicate tx hash {}", tx.tx_hash)));
        }
        match companion {
            Companion::None => {}
            Companion::Nft(nft) => {
                inner.nfts.insert(nft.nft_index, nft.clone());
            }
            Companion::Collection(collection) => {
                inner
                    .collections
                    .insert((collection.account_index, collection.collection_id), collection.clone());
            }
        }
        let pos = inner.mempool.len();
        inner.mempool_by_hash.insert(tx.tx_hash.clone(), pos);
        inner.mempool.push(tx.clone());
        Ok(())
    }

    fn put_offer(&self, offer: &OfferRecord) -> Result<()> {
        self.inner
            .write()
            .offers
            .insert((offer.account_index, offer.offer_id), offer.clone());
        Ok(())
    }

    fn get_offer(&self, account_index: i64, offer_id: i64) -> Result<OfferRecord> {
        self.inner
            .read()
            .offers
            .get(&(account_index, offer_id))
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound(format!("offer {} of account {}", offer_id, account_index)))
    }

    fn get_collection(&self, account_index: i64, collection_id: i64) -> Result<Collection> {
        self.inner
            .read()
            .collections
            .get(&(account_index, collection_id))
            .cloned()
            .ok_or_else(|| {
                Error::ResourceNotFound(format!("collection {} of account {}", collection_id, account_index))
            })
    }

    fn insert_fail_tx(&self, fail_tx: &FailedTransaction) -> Result<()> {
        self.inner.write().fail_txs.push(fail_tx.clone());
        Ok(())
    }

    fn fail_txs(&self) -> Result<Vec<FailedTransaction>> {
        Ok(self.inner.read().fail_txs.clone())
    }
}
