//! Checks and builders shared by every validator

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::Serialize;
use std::collections::BTreeMap;

use super::{Snapshot, VerifyContext};
use crate::constants::{NIL_ACCOUNT_INDEX, NIL_ACCOUNT_NAME, NIL_ACCOUNT_ORDER, NIL_ASSET_ID, RATE_BASE};
use crate::crypto::{digest_field, verify_signature};
use crate::entity::{serialize_entity, Account, AccountAsset, LiquidityInfo, NftInfo, OfferBitmap};
use crate::error::{Error, Result};
use crate::types::{AssetType, MempoolTxDetail, Signature};

/// Reject a transaction already past its expiry
pub(crate) fn check_expiry(expired_at: i64, ctx: &VerifyContext) -> Result<()> {
    if expired_at < ctx.now_ms {
        return Err(Error::MalformedInput(format!(
            "expired at {}, now {}",
            expired_at, ctx.now_ms
        )));
    }
    Ok(())
}

/// Gas must go to the configured gas account
pub(crate) fn check_gas_account(gas_account_index: i64, ctx: &VerifyContext) -> Result<()> {
    if gas_account_index != ctx.gas_account_index {
        return Err(Error::MalformedInput(format!(
            "gas account {} is not the system gas account {}",
            gas_account_index, ctx.gas_account_index
        )));
    }
    Ok(())
}

pub(crate) fn check_amount(name: &str, amount: &BigInt) -> Result<()> {
    if amount.is_negative() {
        return Err(Error::MalformedInput(format!("{} {} is negative", name, amount)));
    }
    Ok(())
}

pub(crate) fn check_positive(name: &str, amount: &BigInt) -> Result<()> {
    if !amount.is_positive() {
        return Err(Error::MalformedInput(format!("{} {} must be positive", name, amount)));
    }
    Ok(())
}

pub(crate) fn check_rate(name: &str, rate: i64) -> Result<()> {
    if !(0..RATE_BASE).contains(&rate) {
        return Err(Error::MalformedInput(format!(
            "{} {} outside [0, {})",
            name, rate, RATE_BASE
        )));
    }
    Ok(())
}

/// Nonce must equal the account's next expected nonce
pub(crate) fn check_nonce(account: &Account, nonce: i64) -> Result<()> {
    if nonce != account.nonce {
        return Err(Error::StaleOrInvalidNonce {
            account_index: account.account_index,
            expected: account.nonce,
            got: nonce,
        });
    }
    Ok(())
}

/// Name hash carried in a transaction must match the named account
pub(crate) fn check_name_hash(account: &Account, claimed: &str) -> Result<()> {
    if account.account_name_hash != claimed {
        return Err(Error::MalformedInput(format!(
            "name hash {} does not match account {}",
            claimed, account.account_index
        )));
    }
    Ok(())
}

pub(crate) fn check_signature(account: &Account, msg_hash: &[u8; 32], sig: &Signature) -> Result<()> {
    verify_signature(&account.public_key, msg_hash, sig)
}

/// Reject an offer whose bit is already set, otherwise return the updated bitmap
pub(crate) fn consume_offer(account: &Account, offer_id: i64) -> Result<(i64, OfferBitmap)> {
    let (slot, bit) = OfferBitmap::locate(offer_id)?;
    let bitmap = account.offer_bitmap(slot);
    if bitmap.test(bit) {
        return Err(Error::OfferAlreadyConsumed {
            account_index: account.account_index,
            offer_id,
        });
    }
    Ok((slot, bitmap.set(bit)))
}

/// Digest field of a string value (hashes, names, addresses)
pub(crate) fn str_field(value: &str) -> [u8; 32] {
    digest_field(value.as_bytes())
}

/// Net balance change per (account, asset), checked against the snapshot
#[derive(Debug, Default)]
pub(crate) struct BalanceSheet {
    deltas: BTreeMap<(i64, i64), BigInt>,
}

impl BalanceSheet {
    pub(crate) fn credit(&mut self, account_index: i64, asset_id: i64, amount: &BigInt) -> &mut Self {
        *self.deltas.entry((account_index, asset_id)).or_default() += amount;
        self
    }

    pub(crate) fn debit(&mut self, account_index: i64, asset_id: i64, amount: &BigInt) -> &mut Self {
        *self.deltas.entry((account_index, asset_id)).or_default() -= amount;
        self
    }

    /// Every net debit must be covered by the account's current balance
    pub(crate) fn ensure_covered(&self, snapshot: &Snapshot) -> Result<()> {
        for ((account_index, asset_id), delta) in &self.deltas {
            if !delta.is_negative() {
                continue;
            }
            let balance = snapshot.account(*account_index)?.balance(*asset_id);
            if &balance + delta < BigInt::zero() {
                return Err(Error::InsufficientBalance(format!(
                    "account {} holds {} of asset {}, needs {}",
                    account_index,
                    balance,
                    asset_id,
                    -delta
                )));
            }
        }
        Ok(())
    }
}

/// Builds the ordered detail list of one transaction
pub(crate) struct DetailBuilder<'a> {
    snapshot: &'a Snapshot,
    details: Vec<MempoolTxDetail>,
    accounts: Vec<i64>,
}

impl<'a> DetailBuilder<'a> {
    pub(crate) fn new(snapshot: &'a Snapshot) -> Self {
        Self {
            snapshot,
            details: Vec::new(),
            accounts: Vec::new(),
        }
    }

    fn account_order(&mut self, account_index: i64) -> i64 {
        match self.accounts.iter().position(|a| *a == account_index) {
            Some(pos) => pos as i64,
            None => {
                self.accounts.push(account_index);
                self.accounts.len() as i64 - 1
            }
        }
    }

    fn push_account<T: Serialize>(
        &mut self,
        account_index: i64,
        asset_id: i64,
        asset_type: AssetType,
        delta: &T,
    ) -> Result<&mut Self> {
        let account_name = self.snapshot.account(account_index)?.account_name.clone();
        let account_order = self.account_order(account_index);
        let balance_delta = serialize_entity(delta)?;
        self.details.push(MempoolTxDetail {
            asset_id,
            asset_type,
            account_index,
            account_name,
            balance_delta,
            order: self.details.len() as i64,
            account_order,
        });
        Ok(self)
    }

    fn push_resource(&mut self, asset_id: i64, asset_type: AssetType, balance_delta: String) -> &mut Self {
        self.details.push(MempoolTxDetail {
            asset_id,
            asset_type,
            account_index: NIL_ACCOUNT_INDEX,
            account_name: NIL_ACCOUNT_NAME.to_string(),
            balance_delta,
            order: self.details.len() as i64,
            account_order: NIL_ACCOUNT_ORDER,
        });
        self
    }

    /// Balance change of one asset
    pub(crate) fn balance(&mut self, account_index: i64, asset_id: i64, delta: BigInt) -> Result<&mut Self> {
        self.push_account(
            account_index,
            asset_id,
            AssetType::General,
            &AccountAsset::balance_delta(asset_id, delta),
        )
    }

    /// LP share change of one pair
    pub(crate) fn lp(&mut self, account_index: i64, pair_index: i64, delta: BigInt) -> Result<&mut Self> {
        self.push_account(
            account_index,
            pair_index,
            AssetType::General,
            &AccountAsset::lp_delta(pair_index, delta),
        )
    }

    /// Replacement offer bitmap of one slot
    pub(crate) fn offer_bitmap(&mut self, account_index: i64, slot: i64, bitmap: OfferBitmap) -> Result<&mut Self> {
        self.push_account(
            account_index,
            slot,
            AssetType::General,
            &AccountAsset::bitmap_delta(slot, bitmap),
        )
    }

    /// Collection id consumed by a new collection
    pub(crate) fn collection_nonce(&mut self, account_index: i64, collection_id: i64) -> Result<&mut Self> {
        self.push_account(account_index, NIL_ASSET_ID, AssetType::CollectionNonce, &collection_id)
    }

    /// Pool delta
    pub(crate) fn liquidity(&mut self, delta: &LiquidityInfo) -> Result<&mut Self> {
        let balance_delta = serialize_entity(delta)?;
        Ok(self.push_resource(delta.pair_index, AssetType::Liquidity, balance_delta))
    }

    /// Full replacement NFT record
    pub(crate) fn nft(&mut self, nft: &NftInfo) -> Result<&mut Self> {
        let balance_delta = serialize_entity(nft)?;
        Ok(self.push_resource(nft.nft_index, AssetType::Nft, balance_delta))
    }

    pub(crate) fn finish(self) -> Vec<MempoolTxDetail> {
        self.details
    }
}

/// Pool delta carrying the pool's current fee and treasury settings
pub(crate) fn pool_delta(
    pool: &LiquidityInfo,
    delta_a: BigInt,
    delta_b: BigInt,
    delta_lp: BigInt,
    k_last: BigInt,
) -> LiquidityInfo {
    LiquidityInfo {
        pair_index: pool.pair_index,
        asset_a_id: pool.asset_a_id,
        asset_a: delta_a,
        asset_b_id: pool.asset_b_id,
        asset_b: delta_b,
        lp_amount: delta_lp,
        k_last,
        fee_rate: pool.fee_rate,
        treasury_account_index: pool.treasury_account_index,
        treasury_rate: pool.treasury_rate,
    }
}
