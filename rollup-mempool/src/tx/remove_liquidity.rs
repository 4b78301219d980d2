use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use super::add_liquidity::check_pool_orientation;
use super::common::{
    check_amount, check_expiry, check_gas_account, check_nonce, check_positive, check_signature, pool_delta,
    BalanceSheet, DetailBuilder,
};
use super::{pending_header, PendingTx, Requirements, Snapshot, VerifyContext};
use crate::amm::{removal_amounts, treasury_lp};
use crate::crypto::MsgHasher;
use crate::error::{Error, Result};
use crate::lock::ResourceKey;
use crate::types::{bigint_str, Signature, TxType};

/// Liquidity withdrawal by burning LP shares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLiquidityTx {
    /// Provider
    pub from_account_index: i64,
    /// Pool
    pub pair_index: i64,
    /// Pool's first asset
    pub asset_a_id: i64,
    /// Least acceptable amount of A returned
    #[serde(with = "bigint_str")]
    pub asset_a_min_amount: BigInt,
    /// Pool's second asset
    pub asset_b_id: i64,
    /// Least acceptable amount of B returned
    #[serde(with = "bigint_str")]
    pub asset_b_min_amount: BigInt,
    /// LP shares burned
    #[serde(with = "bigint_str")]
    pub lp_amount: BigInt,
    /// Returned A, filled in at admission
    #[serde(with = "bigint_str", default)]
    pub asset_a_amount_delta: BigInt,
    /// Returned B, filled in at admission
    #[serde(with = "bigint_str", default)]
    pub asset_b_amount_delta: BigInt,
    /// Pool invariant after the withdrawal, filled in at admission
    #[serde(with = "bigint_str", default)]
    pub k_last: BigInt,
    /// Treasury LP accrued, filled in at admission
    #[serde(with = "bigint_str", default)]
    pub treasury_amount: BigInt,
    /// Gas fee recipient
    pub gas_account_index: i64,
    /// Gas fee asset
    pub gas_fee_asset_id: i64,
    /// Gas fee amount
    #[serde(with = "bigint_str")]
    pub gas_fee_asset_amount: BigInt,
    /// Expiry (unix milliseconds)
    pub expired_at: i64,
    /// Provider nonce
    pub nonce: i64,
    /// Provider signature
    pub sig: Signature,
}

impl RemoveLiquidityTx {
    /// Digest the provider signs; computed fields are not part of it
    pub fn msg_hash(&self) -> Result<[u8; 32]> {
        MsgHasher::new()
            .write_i64(TxType::RemoveLiquidity.code() as i64)
            .write_i64(self.from_account_index)
            .write_i64(self.pair_index)
            .write_i64(self.asset_a_id)
            .write_bigint(&self.asset_a_min_amount)
            .write_i64(self.asset_b_id)
            .write_bigint(&self.asset_b_min_amount)
            .write_bigint(&self.lp_amount)
            .write_i64(self.gas_account_index)
            .write_i64(self.gas_fee_asset_id)
            .write_bigint(&self.gas_fee_asset_amount)
            .write_i64(self.expired_at)
            .write_i64(self.nonce)
            .finalize()
    }

    pub(crate) fn requirements(&self) -> Requirements {
        Requirements {
            latest_accounts: vec![self.from_account_index],
            basic_accounts: vec![self.gas_account_index],
            liquidity: Some(self.pair_index),
            pool_treasury: true,
            locks: vec![
                ResourceKey::Account(self.from_account_index),
                ResourceKey::Liquidity(self.pair_index),
            ],
            ..Requirements::default()
        }
    }

    pub(crate) fn verify(&self, snapshot: &Snapshot, ctx: &VerifyContext) -> Result<PendingTx> {
        check_positive("LP amount", &self.lp_amount)?;
        check_amount("min A", &self.asset_a_min_amount)?;
        check_amount("min B", &self.asset_b_min_amount)?;
        check_amount("gas fee", &self.gas_fee_asset_amount)?;
        check_gas_account(self.gas_account_index, ctx)?;
        check_expiry(self.expired_at, ctx)?;

        let pool = snapshot.liquidity()?;
        check_pool_orientation(pool, self.pair_index, self.asset_a_id, self.asset_b_id)?;

        let from = snapshot.account(self.from_account_index)?;
        check_nonce(from, self.nonce)?;

        let held_lp = from.lp_amount(self.pair_index);
        if held_lp < self.lp_amount {
            return Err(Error::InsufficientBalance(format!(
                "account {} holds {} LP of pair {}, burns {}",
                self.from_account_index, held_lp, self.pair_index, self.lp_amount
            )));
        }

        let treasury = treasury_lp(pool);
        // accrued treasury LP is not yet in circulation
        let pool_lp = &pool.lp_amount - &treasury;
        let (amount_a, amount_b) = removal_amounts(pool, &self.lp_amount, &pool_lp)?;

        BalanceSheet::default()
            .credit(self.from_account_index, self.asset_a_id, &amount_a)
            .credit(self.from_account_index, self.asset_b_id, &amount_b)
            .debit(self.from_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .credit(self.gas_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .ensure_covered(snapshot)?;

        if amount_a < self.asset_a_min_amount || amount_b < self.asset_b_min_amount {
            return Err(Error::InvariantViolation(format!(
                "returned ({}, {}) below minimum ({}, {})",
                amount_a, amount_b, self.asset_a_min_amount, self.asset_b_min_amount
            )));
        }

        check_signature(from, &self.msg_hash()?, &self.sig)?;

        let k_last = (&pool.asset_a - &amount_a) * (&pool.asset_b - &amount_b);
        let completed = RemoveLiquidityTx {
            asset_a_amount_delta: amount_a.clone(),
            asset_b_amount_delta: amount_b.clone(),
            k_last: k_last.clone(),
            treasury_amount: treasury.clone(),
            ..self.clone()
        };
        let delta = pool_delta(
            pool,
            -amount_a.clone(),
            -amount_b.clone(),
            -self.lp_amount.clone(),
            k_last,
        );

        let mut details = DetailBuilder::new(snapshot);
        details
            .balance(self.from_account_index, self.asset_a_id, amount_a)?
            .balance(self.from_account_index, self.asset_b_id, amount_b)?
            .balance(self.from_account_index, self.gas_fee_asset_id, -self.gas_fee_asset_amount.clone())?
            .lp(self.from_account_index, self.pair_index, -self.lp_amount.clone())?
            .lp(pool.treasury_account_index, self.pair_index, treasury)?
            .liquidity(&delta)?
            .balance(self.gas_account_index, self.gas_fee_asset_id, self.gas_fee_asset_amount.clone())?;

        Ok(PendingTx {
            pair_index: self.pair_index,
            asset_id: self.asset_a_id,
            tx_amount: self.lp_amount.clone(),
            tx_info: serde_json::to_string(&completed)?,
            details: details.finish(),
            ..pending_header(
                self.from_account_index,
                self.nonce,
                self.expired_at,
                self.gas_fee_asset_id,
                &self.gas_fee_asset_amount,
            )
        })
    }
}
