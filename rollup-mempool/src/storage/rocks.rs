//! RocksDB ledger store
//!
//! # Column Families
//!
//! - `accounts` / `liquidity` / `nfts` - confirmed snapshots (key: index)
//! - `account_history` / `liquidity_history` / `nft_history` - intermediate
//!   snapshots (key: index || block_height)
//! - `mempool` - pending transactions (key: admission sequence)
//! - `indices` - hash, account and entity indices into `mempool`
//! - `offers` - signed offers (key: account || offer_id)
//! - `collections` - NFT collections (key: account || collection_id)
//! - `fail_txs` - failure records (key: sequence)
//! - `meta` - counters

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{is_pending_detail_of, Companion, LedgerStore};
use crate::entity::{Account, LiquidityInfo, NftInfo};
use crate::error::{Error, Result};
use crate::types::{AssetType, Collection, FailedTransaction, MempoolTx, MempoolTxDetail, OfferRecord};
use crate::Config;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_ACCOUNT_HISTORY: &str = "account_history";
const CF_LIQUIDITY: &str = "liquidity";
const CF_LIQUIDITY_HISTORY: &str = "liquidity_history";
const CF_NFTS: &str = "nfts";
const CF_NFT_HISTORY: &str = "nft_history";
const CF_MEMPOOL: &str = "mempool";
const CF_INDICES: &str = "indices";
const CF_OFFERS: &str = "offers";
const CF_COLLECTIONS: &str = "collections";
const CF_FAIL_TXS: &str = "fail_txs";
const CF_META: &str = "meta";

const ALL_CFS: [&str; 12] = [
    CF_ACCOUNTS,
    CF_ACCOUNT_HISTORY,
    CF_LIQUIDITY,
    CF_LIQUIDITY_HISTORY,
    CF_NFTS,
    CF_NFT_HISTORY,
    CF_MEMPOOL,
    CF_INDICES,
    CF_OFFERS,
    CF_COLLECTIONS,
    CF_FAIL_TXS,
    CF_META,
];

/// Meta keys
const META_MEMPOOL_SEQ: &[u8] = b"mempool_seq";
const META_FAIL_SEQ: &[u8] = b"fail_seq";

/// Index key prefixes
const IDX_HASH: u8 = b'h';
const IDX_ACCOUNT: u8 = b'a';
const IDX_ENTITY: u8 = b'e';

/// Ledger store on RocksDB
pub struct RocksStore {
    db: Arc<DB>,
    mempool_seq: AtomicU64,
    fail_seq: AtomicU64,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .field("mempool_seq", &self.mempool_seq.load(Ordering::Relaxed))
            .finish()
    }
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name)))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let store = Self {
            db: Arc::new(db),
            mempool_seq: AtomicU64::new(0),
            fail_seq: AtomicU64::new(0),
        };
        store.mempool_seq.store(store.read_counter(META_MEMPOOL_SEQ)?, Ordering::SeqCst);
        store.fail_seq.store(store.read_counter(META_FAIL_SEQ)?, Ordering::SeqCst);

        tracing::info!(
            path = ?path,
            column_families = ALL_CFS.len(),
            mempool_seq = store.mempool_seq.load(Ordering::SeqCst),
            "Opened RocksDB ledger store"
        );

        Ok(store)
    }

    fn cf_options(name: &str) -> Options {
        let mut opts = Options::default();
        match name {
            // Hot read path of the overlay resolver
            CF_ACCOUNTS | CF_LIQUIDITY | CF_NFTS | CF_MEMPOOL => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            }
            CF_INDICES => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                let mut block_opts = rocksdb::BlockBasedOptions::default();
                block_opts.set_bloom_filter(10.0, false); // 10 bits per key
                opts.set_block_based_table_factory(&block_opts);
            }
            _ => {
                opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
            }
        }
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::StorageFailure(format!("Column family {} not found", name)))
    }

    fn read_counter(&self, key: &[u8]) -> Result<u64> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(0),
        }
    }

    fn get_value<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_value<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        self.db.put_cf(cf, key, bincode::serialize(value)?)?;
        Ok(())
    }

    /// Keys and values under `prefix`, ascending
    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf_handle(cf_name)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key, value));
        }
        Ok(out)
    }

    fn latest_history<T: DeserializeOwned>(&self, cf_name: &str, index: i64) -> Result<Option<T>> {
        match self.scan_prefix(cf_name, &index.to_be_bytes())?.pop() {
            Some((_, value)) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn snapshot<T: DeserializeOwned>(&self, cf: &str, history_cf: &str, index: i64, what: &str) -> Result<T> {
        if let Some(value) = self.get_value(cf, &index.to_be_bytes())? {
            return Ok(value);
        }
        self.latest_history(history_cf, index)?
            .ok_or_else(|| Error::ResourceNotFound(format!("{} {}", what, index)))
    }

    fn mempool_txs_at(&self, seqs: impl IntoIterator<Item = u64>) -> Result<Vec<MempoolTx>> {
        let mut txs = Vec::new();
        for seq in seqs {
            if let Some(tx) = self.get_value::<MempoolTx>(CF_MEMPOOL, &seq.to_be_bytes())? {
                if tx.is_pending() {
                    txs.push(tx);
                }
            }
        }
        Ok(txs)
    }

    /// Sequence numbers under an index prefix (sequence is the key suffix)
    fn indexed_seqs(&self, prefix: &[u8]) -> Result<Vec<u64>> {
        let mut seqs = self
            .scan_prefix(CF_INDICES, prefix)?
            .into_iter()
            .filter_map(|(key, _)| key.get(key.len().saturating_sub(8)..).and_then(|b| b.try_into().ok()))
            .map(u64::from_be_bytes)
            .collect::<Vec<_>>();
        seqs.sort_unstable();
        seqs.dedup();
        Ok(seqs)
    }

    // Index key helpers

    fn index_key_hash(tx_hash: &str) -> Vec<u8> {
        let mut key = vec![IDX_HASH];
        key.extend_from_slice(tx_hash.as_bytes());
        key
    }

    fn index_key_account(account_index: i64, seq: Option<u64>) -> Vec<u8> {
        let mut key = vec![IDX_ACCOUNT];
        key.extend_from_slice(&account_index.to_be_bytes());
        if let Some(seq) = seq {
            key.extend_from_slice(&seq.to_be_bytes());
        }
        key
    }

    fn index_key_entity(asset_type: AssetType, asset_id: i64, seq: Option<u64>) -> Vec<u8> {
        let mut key = vec![IDX_ENTITY, asset_type.code()];
        key.extend_from_slice(&asset_id.to_be_bytes());
        if let Some(seq) = seq {
            key.extend_from_slice(&seq.to_be_bytes());
        }
        key
    }

    fn pair_key(a: i64, b: i64) -> Vec<u8> {
        let mut key = a.to_be_bytes().to_vec();
        key.extend_from_slice(&b.to_be_bytes());
        key
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

impl LedgerStore for RocksStore {
    fn get_account(&self, account_index: i64) -> Result<Account> {
        self.snapshot(CF_ACCOUNTS, CF_ACCOUNT_HISTORY, account_index, "account")
    }

    fn get_liquidity(&self, pair_index: i64) -> Result<LiquidityInfo> {
        self.snapshot(CF_LIQUIDITY, CF_LIQUIDITY_HISTORY, pair_index, "liquidity")
    }

    fn get_nft(&self, nft_index: i64) -> Result<NftInfo> {
        self.snapshot(CF_NFTS, CF_NFT_HISTORY, nft_index, "nft")
    }

    fn put_account(&self, account: &Account) -> Result<()> {
        self.put_value(CF_ACCOUNTS, &account.account_index.to_be_bytes(), account)
    }

    fn put_account_history(&self, account: &Account, block_height: i64) -> Result<()> {
        self.put_value(
            CF_ACCOUNT_HISTORY,
            &Self::pair_key(account.account_index, block_height),
            account,
        )
    }

    fn put_liquidity(&self, liquidity: &LiquidityInfo) -> Result<()> {
        self.put_value(CF_LIQUIDITY, &liquidity.pair_index.to_be_bytes(), liquidity)
    }

    fn put_liquidity_history(&self, liquidity: &LiquidityInfo, block_height: i64) -> Result<()> {
        self.put_value(
            CF_LIQUIDITY_HISTORY,
            &Self::pair_key(liquidity.pair_index, block_height),
            liquidity,
        )
    }

    fn put_nft(&self, nft: &NftInfo) -> Result<()> {
        self.put_value(CF_NFTS, &nft.nft_index.to_be_bytes(), nft)
    }

    fn put_nft_history(&self, nft: &NftInfo, block_height: i64) -> Result<()> {
        self.put_value(CF_NFT_HISTORY, &Self::pair_key(nft.nft_index, block_height), nft)
    }

    fn pending_txs_for_account(&self, account_index: i64) -> Result<Vec<MempoolTx>> {
        let seqs = self.indexed_seqs(&Self::index_key_account(account_index, None))?;
        self.mempool_txs_at(seqs)
    }

    fn pending_details(&self, asset_type: AssetType, asset_id: i64) -> Result<Vec<MempoolTxDetail>> {
        let seqs = self.indexed_seqs(&Self::index_key_entity(asset_type, asset_id, None))?;
        Ok(self
            .mempool_txs_at(seqs)?
            .into_iter()
            .flat_map(|tx| tx.details.into_iter())
            .filter(|d| is_pending_detail_of(d, asset_type, asset_id))
            .collect())
    }

    fn latest_nft_index(&self) -> Result<Option<i64>> {
        let cf = self.cf_handle(CF_NFTS)?;
        let confirmed = match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                let bytes: [u8; 8] = key
                    .as_ref()
                    .try_into()
                    .map_err(|_| Error::StorageFailure("corrupt nft key".into()))?;
                Some(i64::from_be_bytes(bytes))
            }
            None => None,
        };
        let cf = self.cf_handle(CF_NFT_HISTORY)?;
        let history = match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                key.get(..8)
                    .and_then(|b| b.try_into().ok())
                    .map(i64::from_be_bytes)
            }
            None => None,
        };
        Ok(confirmed.max(history))
    }

    fn latest_offer_id(&self, account_index: i64) -> Result<Option<i64>> {
        Ok(self
            .scan_prefix(CF_OFFERS, &account_index.to_be_bytes())?
            .pop()
            .and_then(|(key, _)| key.get(8..16).and_then(|b| b.try_into().ok()))
            .map(i64::from_be_bytes))
    }

    fn get_mempool_tx(&self, tx_hash: &str) -> Result<MempoolTx> {
        let seq: u64 = self
            .get_value(CF_INDICES, &Self::index_key_hash(tx_hash))?
            .ok_or_else(|| Error::ResourceNotFound(format!("mempool tx {}", tx_hash)))?;
        self.get_value(CF_MEMPOOL, &seq.to_be_bytes())?
            .ok_or_else(|| Error::StorageFailure(format!("dangling index for {}", tx_hash)))
    }

    fn pending_tx_count(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_MEMPOOL)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            let tx: MempoolTx = bincode::deserialize(&value)?;
            if tx.is_pending() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn admit(&self, tx: &MempoolTx, companion: &Companion) -> Result<()> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let hash_key = Self::index_key_hash(&tx.tx_hash);
        if self.db.get_cf(cf_indices, &hash_key)?.is_some() {
            return Err(Error::InvariantViolation(format!("duplicate tx hash {}", tx.tx_hash)));
        }

        let seq = self.mempool_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut batch = WriteBatch::default();

        // 1. Mempool row
        let cf_mempool = self.cf_handle(CF_MEMPOOL)?;
        batch.put_cf(cf_mempool, seq.to_be_bytes(), bincode::serialize(tx)?);

        // 2. Indices
        batch.put_cf(cf_indices, &hash_key, bincode::serialize(&seq)?);
        batch.put_cf(cf_indices, Self::index_key_account(tx.account_index, Some(seq)), b"");
        for detail in &tx.details {
            batch.put_cf(
                cf_indices,
                Self::index_key_account(detail.account_index, Some(seq)),
                b"",
            );
            batch.put_cf(
                cf_indices,
                Self::index_key_entity(detail.asset_type, detail.asset_id, Some(seq)),
                b"",
            );
        }

        // 3. Companion row
        match companion {
            Companion::None => {}
            Companion::Nft(nft) => {
                let cf = self.cf_handle(CF_NFTS)?;
                batch.put_cf(cf, nft.nft_index.to_be_bytes(), bincode::serialize(nft)?);
            }
            Companion::Collection(collection) => {
                let cf = self.cf_handle(CF_COLLECTIONS)?;
                batch.put_cf(
                    cf,
                    Self::pair_key(collection.account_index, collection.collection_id),
                    bincode::serialize(collection)?,
                );
            }
        }

        // 4. Counter
        let cf_meta = self.cf_handle(CF_META)?;
        batch.put_cf(cf_meta, META_MEMPOOL_SEQ, bincode::serialize(&seq)?);

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(tx_hash = %tx.tx_hash, seq, details = tx.details.len(), "Mempool tx persisted");

        Ok(())
    }

    fn put_offer(&self, offer: &OfferRecord) -> Result<()> {
        self.put_value(CF_OFFERS, &Self::pair_key(offer.account_index, offer.offer_id), offer)
    }

    fn get_offer(&self, account_index: i64, offer_id: i64) -> Result<OfferRecord> {
        self.get_value(CF_OFFERS, &Self::pair_key(account_index, offer_id))?
            .ok_or_else(|| Error::ResourceNotFound(format!("offer {} of account {}", offer_id, account_index)))
    }

    fn get_collection(&self, account_index: i64, collection_id: i64) -> Result<Collection> {
        self.get_value(CF_COLLECTIONS, &Self::pair_key(account_index, collection_id))?
            .ok_or_else(|| {
                Error::ResourceNotFound(format!("collection {} of account {}", collection_id, account_index))
            })
    }

    fn insert_fail_tx(&self, fail_tx: &FailedTransaction) -> Result<()> {
        let seq = self.fail_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf_handle(CF_FAIL_TXS)?, seq.to_be_bytes(), bincode::serialize(fail_tx)?);
        batch.put_cf(self.cf_handle(CF_META)?, META_FAIL_SEQ, bincode::serialize(&seq)?);
        self.db.write(batch)?;
        Ok(())
    }

    fn fail_txs(&self) -> Result<Vec<FailedTransaction>> {
        let cf = self.cf_handle(CF_FAIL_TXS)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            out.push(bincode::deserialize(&value)?);
        }
        Ok(out)
    }
}
