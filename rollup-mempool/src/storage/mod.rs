//! Durable ledger store
//!
//! The admission core only talks to storage through [`LedgerStore`]:
//! point lookups of confirmed snapshots (with a history fallback), ordered
//! scans of pending mempool records, and one atomic write per admission.
//!
//! Two backends:
//! - [`RocksStore`] - RocksDB, column family per table
//! - [`MemoryStore`] - ordered in-memory maps, same semantics

mod memory;
mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

use crate::entity::{Account, LiquidityInfo, NftInfo};
use crate::error::Result;
use crate::types::{AssetType, Collection, FailedTransaction, MempoolTx, MempoolTxDetail, OfferRecord};

/// Row written in the same atomic batch as a mempool transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Companion {
    /// Nothing besides the mempool row
    None,
    /// Newly minted NFT
    Nft(NftInfo),
    /// Newly created collection
    Collection(Collection),
}

/// Storage contract of the admission core
pub trait LedgerStore: Send + Sync {
    /// Confirmed account, falling back to its latest history row
    fn get_account(&self, account_index: i64) -> Result<Account>;

    /// Confirmed pool, falling back to its latest history row
    fn get_liquidity(&self, pair_index: i64) -> Result<LiquidityInfo>;

    /// Confirmed NFT, falling back to its latest history row
    fn get_nft(&self, nft_index: i64) -> Result<NftInfo>;

    /// Write a confirmed account snapshot
    fn put_account(&self, account: &Account) -> Result<()>;

    /// Append an intermediate account snapshot at `block_height`
    fn put_account_history(&self, account: &Account, block_height: i64) -> Result<()>;

    /// Write a confirmed pool snapshot
    fn put_liquidity(&self, liquidity: &LiquidityInfo) -> Result<()>;

    /// Append an intermediate pool snapshot at `block_height`
    fn put_liquidity_history(&self, liquidity: &LiquidityInfo, block_height: i64) -> Result<()>;

    /// Write a confirmed NFT snapshot
    fn put_nft(&self, nft: &NftInfo) -> Result<()>;

    /// Append an intermediate NFT snapshot at `block_height`
    fn put_nft_history(&self, nft: &NftInfo, block_height: i64) -> Result<()>;

    /// Pending transactions touching the account, in admission order
    fn pending_txs_for_account(&self, account_index: i64) -> Result<Vec<MempoolTx>>;

    /// Pending details of one entity, in admission order
    fn pending_details(&self, asset_type: AssetType, asset_id: i64) -> Result<Vec<MempoolTxDetail>>;

    /// Highest NFT index known, including pending mints
    fn latest_nft_index(&self) -> Result<Option<i64>>;

    /// Highest offer id stored for the account
    fn latest_offer_id(&self, account_index: i64) -> Result<Option<i64>>;

    /// Mempool transaction by hash
    fn get_mempool_tx(&self, tx_hash: &str) -> Result<MempoolTx>;

    /// Number of pending mempool transactions
    fn pending_tx_count(&self) -> Result<u64>;

    /// Persist a mempool transaction and its companion row atomically
    fn admit(&self, tx: &MempoolTx, companion: &Companion) -> Result<()>;

    /// Persist a signed offer
    fn put_offer(&self, offer: &OfferRecord) -> Result<()>;

    /// Stored offer
    fn get_offer(&self, account_index: i64, offer_id: i64) -> Result<OfferRecord>;

    /// Stored collection
    fn get_collection(&self, account_index: i64, collection_id: i64) -> Result<Collection>;

    /// Persist a failure record
    fn insert_fail_tx(&self, fail_tx: &FailedTransaction) -> Result<()>;

    /// All failure records, oldest first
    fn fail_txs(&self) -> Result<Vec<FailedTransaction>>;
}

pub(crate) fn is_pending_detail_of(detail: &MempoolTxDetail, asset_type: AssetType, asset_id: i64) -> bool {
    detail.asset_type == asset_type && detail.asset_id == asset_id
}
