//! Submission service
//!
//! [`Mempool`] ties the resolver, the lock table, the validators and the
//! admission step into the two entry points the rest of the rollup uses:
//! [`Mempool::submit`] for raw L2 transactions and the overlaid read API for
//! balance queries.
//!
//! # Example
//!
//! ```no_run
//! use rollup_mempool::{Config, Mempool};
//!
//! #[tokio::main]
//! async fn main() -> rollup_mempool::Result<()> {
//!     let mempool = Mempool::open(Config::default()).await?;
//!
//!     // let tx_hash = mempool.submit(raw_tx.as_bytes(), 6).await?;
//!     let account = mempool.overlaid_account(2)?;
//!     println!("next nonce {}", account.nonce);
//!
//!     mempool.shutdown().await
//! }
//! ```

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::actor::{spawn_fail_recorder, FailRecorderHandle};
use crate::cache::OverlayCache;
use crate::crypto::generate_uuid_v4;
use crate::entity::{Account, LiquidityInfo, NftInfo};
use crate::lock::{LockService, LockSet, ResourceKey};
use crate::mempool::admit;
use crate::metrics::Metrics;
use crate::overlay::{CacheFill, StateResolver};
use crate::storage::{LedgerStore, RocksStore};
use crate::tx::{FailFields, Requirements, Snapshot, Transaction, Verified, VerifyContext};
use crate::types::{FailedTransaction, MempoolTx, TxStatus, TxType};
use crate::{Config, Error, Result};

/// Transaction admission service
pub struct Mempool {
    config: Config,
    store: Arc<dyn LedgerStore>,
    resolver: StateResolver,
    locks: LockService,
    recorder: FailRecorderHandle,
    metrics: Metrics,
}

impl std::fmt::Debug for Mempool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mempool")
            .field("service_name", &self.config.service_name)
            .field("gas_account_index", &self.config.gas_account_index)
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

fn parse(raw: &[u8], tx_type: u8) -> Result<Transaction> {
    let tx_type = TxType::from_code(tx_type)
        .ok_or_else(|| Error::MalformedInput(format!("unsupported transaction type {}", tx_type)))?;
    Transaction::parse(tx_type, raw)
}

fn fail_record(tx_type: u8, raw: &[u8], fields: FailFields, err: &Error) -> FailedTransaction {
    FailedTransaction {
        tx_hash: generate_uuid_v4().to_string(),
        tx_type,
        gas_fee_asset_id: fields.gas_fee_asset_id,
        gas_fee: fields.gas_fee.to_string(),
        asset_a_id: fields.asset_a_id,
        asset_b_id: fields.asset_b_id,
        tx_amount: fields.tx_amount.to_string(),
        native_address: fields.native_address,
        tx_info: String::from_utf8_lossy(raw).into_owned(),
        extra_info: err.to_string(),
        status: TxStatus::Failed,
        created_at: Utc::now(),
    }
}

impl Mempool {
    /// Open over the RocksDB store in `config.data_dir`
    pub async fn open(config: Config) -> Result<Self> {
        let store = Arc::new(RocksStore::open(&config)?);
        Self::with_store(config, store)
    }

    /// Build over any ledger store; must run inside a Tokio runtime
    pub fn with_store(config: Config, store: Arc<dyn LedgerStore>) -> Result<Self> {
        let cache = Arc::new(OverlayCache::new(&config.cache));
        let resolver = StateResolver::new(store.clone(), cache);
        let locks = LockService::new(&config.lock);
        let recorder = spawn_fail_recorder(store.clone(), config.fail_recorder.mailbox_capacity);
        let metrics = Metrics::new().map_err(|e| Error::Config(format!("metrics: {}", e)))?;
        metrics.pending_txs.set(store.pending_tx_count()? as i64);

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            gas_account_index = config.gas_account_index,
            "Mempool opened"
        );

        Ok(Self {
            config,
            store,
            resolver,
            locks,
            recorder,
            metrics,
        })
    }

    /// Verify and admit a raw transaction of type code `tx_type`
    ///
    /// Returns the transaction hash, or the offer id for an offer. Every
    /// rejection is also queued as a [`FailedTransaction`].
    pub async fn submit(&self, raw: &[u8], tx_type: u8) -> Result<String> {
        let started = Instant::now();
        let (result, fields) = match parse(raw, tx_type) {
            Ok(tx) => (self.process(&tx).await, tx.fail_fields()),
            Err(e) => (Err(e), FailFields::default()),
        };
        self.metrics.record_submit_duration(started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            self.metrics.record_rejected(e.kind());
            tracing::warn!(tx_type, kind = e.kind(), error = %e, "Transaction rejected");
            self.recorder.record(fail_record(tx_type, raw, fields, e));
        }
        result
    }

    async fn process(&self, tx: &Transaction) -> Result<String> {
        let requirements = tx.requirements();
        let locks = self.locks.acquire(requirements.locks.iter().copied()).await?;
        self.metrics.record_lock_wait(locks.waited().as_secs_f64());
        tracing::debug!(tx_type = %tx.tx_type(), locks = ?locks, "Locks acquired");

        let snapshot = self.load_snapshot(&requirements, &locks)?;
        let ctx = VerifyContext {
            gas_account_index: self.config.gas_account_index,
            now_ms: Utc::now().timestamp_millis(),
        };

        let id = match tx.verify(&snapshot, &ctx)? {
            Verified::Pending(pending) => {
                let admitted = admit(self.store.as_ref(), &self.resolver, tx.tx_type(), pending)?;
                self.metrics.pending_txs.inc();
                tracing::info!(
                    tx_hash = %admitted.tx_hash,
                    tx_type = %tx.tx_type(),
                    account_index = admitted.account_index,
                    nonce = admitted.nonce,
                    "Transaction admitted"
                );
                admitted.tx_hash
            }
            Verified::Offer(offer) => {
                self.store.put_offer(&offer)?;
                tracing::info!(
                    account_index = offer.account_index,
                    offer_id = offer.offer_id,
                    nft_index = offer.nft_index,
                    "Offer stored"
                );
                offer.offer_id.to_string()
            }
        };
        self.metrics.record_admitted(tx.tx_type().name());
        drop(locks);
        Ok(id)
    }

    /// Resolve every piece of state a validator asked for
    ///
    /// Overlays are cached only for resources whose lock is held.
    fn load_snapshot(&self, requirements: &Requirements, locks: &LockSet) -> Result<Snapshot> {
        let fill = |key: ResourceKey| {
            if locks.holds(key) {
                CacheFill::Write
            } else {
                CacheFill::ReadOnly
            }
        };

        let mut snapshot = Snapshot::default();
        let mut basic = requirements.basic_accounts.clone();

        for &account_index in &requirements.latest_accounts {
            if !snapshot.accounts.contains_key(&account_index) {
                let account = self
                    .resolver
                    .latest_account(account_index, fill(ResourceKey::Account(account_index)))?;
                snapshot.accounts.insert(account_index, account);
            }
        }

        if let Some(pair_index) = requirements.liquidity {
            let pool = self
                .resolver
                .latest_liquidity(pair_index, fill(ResourceKey::Liquidity(pair_index)))?;
            if requirements.pool_treasury {
                basic.push(pool.treasury_account_index);
            }
            snapshot.liquidity = Some(pool);
        }

        if let Some(nft_index) = requirements.nft {
            let nft = self.resolver.latest_nft(nft_index, fill(ResourceKey::Nft(nft_index)))?;
            if requirements.nft_creator {
                basic.push(nft.creator_account_index);
            }
            snapshot.nft = Some(nft);
        }

        for account_index in basic {
            if !snapshot.accounts.contains_key(&account_index) {
                let account = self.resolver.basic_account(account_index)?;
                snapshot.accounts.insert(account_index, account);
            }
        }

        if requirements.next_nft_index {
            snapshot.next_nft_index = Some(self.resolver.next_nft_index()?);
        }
        if let Some(account_index) = requirements.next_offer_id {
            snapshot.next_offer_id = Some(self.resolver.next_offer_id(account_index)?);
        }
        Ok(snapshot)
    }

    /// Latest account including pending transactions
    pub fn overlaid_account(&self, account_index: i64) -> Result<Account> {
        self.resolver.latest_account(account_index, CacheFill::ReadOnly)
    }

    /// Latest pool including pending transactions
    pub fn overlaid_liquidity(&self, pair_index: i64) -> Result<LiquidityInfo> {
        self.resolver.latest_liquidity(pair_index, CacheFill::ReadOnly)
    }

    /// Latest NFT including pending transactions
    pub fn overlaid_nft(&self, nft_index: i64) -> Result<NftInfo> {
        self.resolver.latest_nft(nft_index, CacheFill::ReadOnly)
    }

    /// Durable account snapshot
    pub fn basic_account(&self, account_index: i64) -> Result<Account> {
        self.resolver.basic_account(account_index)
    }

    /// Mempool transaction by hash
    pub fn mempool_tx(&self, tx_hash: &str) -> Result<MempoolTx> {
        self.store.get_mempool_tx(tx_hash)
    }

    /// Number of pending mempool transactions
    pub fn pending_count(&self) -> Result<u64> {
        self.store.pending_tx_count()
    }

    /// Underlying ledger store
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Wait until queued failure records are written
    pub async fn flush_fail_records(&self) -> Result<()> {
        self.recorder.flush().await
    }

    /// Drain the failure recorder and stop
    pub async fn shutdown(self) -> Result<()> {
        self.recorder.flush().await?;
        self.recorder.shutdown().await?;
        tracing::info!(service = %self.config.service_name, "Mempool stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::tx::test_support::{account, sign, signed_transfer, GAS_ACCOUNT};
    use crate::tx::TransferTx;
    use num_bigint::BigInt;

    fn transfer(from: i64, to: i64, amount: i64, nonce: i64) -> TransferTx {
        let mut tx = signed_transfer(from, to, amount, 1, nonce);
        tx.expired_at = i64::MAX;
        tx.sig = sign(from, &tx.msg_hash().unwrap());
        tx
    }

    fn create_test_mempool() -> (Mempool, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for a in [account(2, &[(0, 100)]), account(3, &[]), account(GAS_ACCOUNT, &[])] {
            store.put_account(&a).unwrap();
        }
        let mut config = Config::default();
        config.gas_account_index = GAS_ACCOUNT;
        let mempool = Mempool::with_store(config, store.clone()).unwrap();
        (mempool, store)
    }

    #[tokio::test]
    async fn test_submit_transfer() {
        let (mempool, _store) = create_test_mempool();

        let raw = serde_json::to_vec(&transfer(2, 3, 40, 0)).unwrap();
        let tx_hash = mempool.submit(&raw, TxType::Transfer.code()).await.unwrap();

        let stored = mempool.mempool_tx(&tx_hash).unwrap();
        assert_eq!(stored.tx_type, TxType::Transfer);
        assert_eq!(mempool.pending_count().unwrap(), 1);
        assert_eq!(mempool.metrics().pending_txs.get(), 1);

        assert_eq!(mempool.overlaid_account(2).unwrap().balance(0), BigInt::from(59));
        assert_eq!(mempool.overlaid_account(2).unwrap().nonce, 1);
        assert_eq!(mempool.overlaid_account(3).unwrap().balance(0), BigInt::from(40));
        assert_eq!(mempool.overlaid_account(GAS_ACCOUNT).unwrap().balance(0), BigInt::from(1));
        assert_eq!(mempool.basic_account(2).unwrap().balance(0), BigInt::from(100));

        mempool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejection_is_recorded() {
        let (mempool, store) = create_test_mempool();

        let raw = serde_json::to_vec(&transfer(2, 3, 40, 5)).unwrap();
        let err = mempool.submit(&raw, TxType::Transfer.code()).await.unwrap_err();
        assert!(matches!(err, Error::StaleOrInvalidNonce { expected: 0, got: 5, .. }));

        let err = mempool.submit(b"{}", 4).await.unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));

        mempool.flush_fail_records().await.unwrap();
        let records = store.fail_txs().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tx_type, TxType::Transfer.code());
        assert_eq!(records[0].tx_amount, "40");
        assert!(records[0].extra_info.contains("nonce"));
        assert_eq!(records[1].tx_type, 4);
        assert_eq!(records[1].gas_fee_asset_id, crate::constants::NIL_ASSET_ID);

        assert_eq!(mempool.pending_count().unwrap(), 0);
        assert_eq!(
            mempool
                .metrics()
                .rejected_total
                .with_label_values(&["malformed_input"])
                .get(),
            1
        );
    }
}
