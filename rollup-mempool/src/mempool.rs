//! Mempool admission
//!
//! Turns a verified transaction into a pending [`MempoolTx`], writes it and
//! its companion row in one atomic batch, then invalidates the overlay cache
//! of everything it touched. Invalidation runs after the write: a fold that
//! started before the write carries an older cache epoch and cannot land.

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::cache::CacheKey;
use crate::constants::{NIL_ACCOUNT_INDEX, NIL_BLOCK_HEIGHT};
use crate::error::Result;
use crate::overlay::StateResolver;
use crate::storage::{Companion, LedgerStore};
use crate::tx::PendingTx;
use crate::types::{AssetType, MempoolTx, TxStatus, TxType};

/// Canonical transaction id: SHA-256 over the type code and the stored payload
pub fn tx_hash(tx_type: TxType, tx_info: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update([tx_type.code()]);
    hasher.update(tx_info.as_bytes());
    hex::encode(hasher.finalize())
}

/// Pending record for a verified transaction
pub fn build_mempool_tx(tx_type: TxType, pending: PendingTx) -> (MempoolTx, Companion) {
    let tx = MempoolTx {
        tx_hash: tx_hash(tx_type, &pending.tx_info),
        tx_type,
        gas_fee_asset_id: pending.gas_fee_asset_id,
        gas_fee: pending.gas_fee,
        nft_index: pending.nft_index,
        pair_index: pending.pair_index,
        asset_id: pending.asset_id,
        tx_amount: pending.tx_amount,
        native_address: pending.native_address,
        tx_info: pending.tx_info,
        extra_info: String::new(),
        memo: pending.memo,
        account_index: pending.account_index,
        nonce: pending.nonce,
        expired_at: pending.expired_at,
        l2_block_height: NIL_BLOCK_HEIGHT,
        status: TxStatus::Pending,
        details: pending.details,
        created_at: Utc::now(),
    };
    (tx, pending.companion)
}

/// Cache keys whose overlay changes once `tx` is pending
pub fn touched_keys(tx: &MempoolTx) -> Vec<CacheKey> {
    let mut keys = vec![CacheKey::Account(tx.account_index)];
    for detail in &tx.details {
        let key = match detail.asset_type {
            AssetType::Liquidity => CacheKey::Liquidity(detail.asset_id),
            AssetType::Nft => CacheKey::Nft(detail.asset_id),
            AssetType::General | AssetType::CollectionNonce if detail.account_index != NIL_ACCOUNT_INDEX => {
                CacheKey::Account(detail.account_index)
            }
            AssetType::General | AssetType::CollectionNonce => continue,
        };
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// Persist a verified transaction and return the stored record
pub fn admit(
    store: &dyn LedgerStore,
    resolver: &StateResolver,
    tx_type: TxType,
    pending: PendingTx,
) -> Result<MempoolTx> {
    let (tx, companion) = build_mempool_tx(tx_type, pending);
    store.admit(&tx, &companion)?;
    resolver.invalidate(touched_keys(&tx));

    tracing::debug!(
        tx_hash = %tx.tx_hash,
        tx_type = %tx_type,
        details = tx.details.len(),
        "Mempool transaction persisted"
    );
    Ok(tx)
}
