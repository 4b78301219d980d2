use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use super::common::{
    check_amount, check_expiry, check_gas_account, check_nonce, check_positive, check_signature, pool_delta,
    BalanceSheet, DetailBuilder,
};
use super::{pending_header, PendingTx, Requirements, Snapshot, VerifyContext};
use crate::amm::{initial_lp_amount, lp_amount, treasury_lp};
use crate::crypto::MsgHasher;
use crate::entity::LiquidityInfo;
use crate::error::{Error, Result};
use crate::lock::ResourceKey;
use crate::types::{bigint_str, Signature, TxType};

/// Liquidity deposit into a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLiquidityTx {
    /// Provider
    pub from_account_index: i64,
    /// Pool
    pub pair_index: i64,
    /// Pool's first asset
    pub asset_a_id: i64,
    /// Deposited amount of A
    #[serde(with = "bigint_str")]
    pub asset_a_amount: BigInt,
    /// Pool's second asset
    pub asset_b_id: i64,
    /// Deposited amount of B
    #[serde(with = "bigint_str")]
    pub asset_b_amount: BigInt,
    /// Least acceptable LP minted
    #[serde(with = "bigint_str")]
    pub lp_amount_min: BigInt,
    /// LP minted, filled in at admission
    #[serde(with = "bigint_str", default)]
    pub lp_amount: BigInt,
    /// Pool invariant after the deposit, filled in at admission
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

/// Minted LP, treasury accrual, and the new invariant of a deposit
struct Deposit {
    lp_amount: BigInt,
    treasury_amount: BigInt,
    k_last: BigInt,
}

pub(crate) fn check_pool_orientation(pool: &LiquidityInfo, pair_index: i64, asset_a: i64, asset_b: i64) -> Result<()> {
    if pool.pair_index != pair_index || pool.asset_a_id != asset_a || pool.asset_b_id != asset_b {
        return Err(Error::MalformedInput(format!(
            "assets ({}, {}) are not pair {} in order",
            asset_a, asset_b, pair_index
        )));
    }
    Ok(())
}

impl AddLiquidityTx {
    /// Digest the provider signs; computed fields are not part of it
    pub fn msg_hash(&self) -> Result<[u8; 32]> {
        MsgHasher::new()
            .write_i64(TxType::AddLiquidity.code() as i64)
            .write_i64(self.from_account_index)
            .write_i64(self.pair_index)
            .write_i64(self.asset_a_id)
            .write_bigint(&self.asset_a_amount)
            .write_i64(self.asset_b_id)
            .write_bigint(&self.asset_b_amount)
            .write_bigint(&self.lp_amount_min)
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

    fn deposit(&self, pool: &LiquidityInfo) -> Result<Deposit> {
        let (lp, treasury) = if pool.asset_a.is_zero() || pool.asset_b.is_zero() {
            (initial_lp_amount(&self.asset_a_amount, &self.asset_b_amount), BigInt::zero())
        } else {
            // LP is priced off asset A alone
            let treasury = treasury_lp(pool);
            (lp_amount(pool, &self.asset_a_amount, &treasury)?, treasury)
        };
        let k_last = (&pool.asset_a + &self.asset_a_amount) * (&pool.asset_b + &self.asset_b_amount);
        Ok(Deposit {
            lp_amount: lp,
            treasury_amount: treasury,
            k_last,
        })
    }

    pub(crate) fn verify(&self, snapshot: &Snapshot, ctx: &VerifyContext) -> Result<PendingTx> {
        check_positive("asset A amount", &self.asset_a_amount)?;
        check_positive("asset B amount", &self.asset_b_amount)?;
        check_amount("min LP", &self.lp_amount_min)?;
        check_amount("gas fee", &self.gas_fee_asset_amount)?;
        check_gas_account(self.gas_account_index, ctx)?;
        check_expiry(self.expired_at, ctx)?;

        let pool = snapshot.liquidity()?;
        check_pool_orientation(pool, self.pair_index, self.asset_a_id, self.asset_b_id)?;

        let from = snapshot.account(self.from_account_index)?;
        check_nonce(from, self.nonce)?;

        BalanceSheet::default()
            .debit(self.from_account_index, self.asset_a_id, &self.asset_a_amount)
            .debit(self.from_account_index, self.asset_b_id, &self.asset_b_amount)
            .debit(self.from_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .credit(self.gas_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .ensure_covered(snapshot)?;

        let deposit = self.deposit(pool)?;
        if deposit.lp_amount < self.lp_amount_min {
            return Err(Error::InvariantViolation(format!(
                "minted LP {} below minimum {}",
                deposit.lp_amount, self.lp_amount_min
            )));
        }

        check_signature(from, &self.msg_hash()?, &self.sig)?;

        let completed = AddLiquidityTx {
            lp_amount: deposit.lp_amount.clone(),
            k_last: deposit.k_last.clone(),
            treasury_amount: deposit.treasury_amount.clone(),
            ..self.clone()
        };
        let delta = pool_delta(
            pool,
            self.asset_a_amount.clone(),
            self.asset_b_amount.clone(),
            &deposit.lp_amount + &deposit.treasury_amount,
            deposit.k_last,
        );

        let mut details = DetailBuilder::new(snapshot);
        details
            .balance(self.from_account_index, self.asset_a_id, -self.asset_a_amount.clone())?
            .balance(self.from_account_index, self.asset_b_id, -self.asset_b_amount.clone())?
            .balance(self.from_account_index, self.gas_fee_asset_id, -self.gas_fee_asset_amount.clone())?
            .lp(self.from_account_index, self.pair_index, deposit.lp_amount)?
            .lp(pool.treasury_account_index, self.pair_index, deposit.treasury_amount)?
            .liquidity(&delta)?
            .balance(self.gas_account_index, self.gas_fee_asset_id, self.gas_fee_asset_amount.clone())?;

        Ok(PendingTx {
            pair_index: self.pair_index,
            asset_id: self.asset_a_id,
            tx_amount: self.asset_a_amount.clone(),
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

#[cfg(test)]
pub(crate) mod tests {
    use super::super::common::fixtures::*;
    use super::*;
    use crate::entity::{parse_entity, tests::pool};

    pub(crate) fn signed_add(from: i64, a: i64, b: i64, min_lp: i64, nonce: i64) -> AddLiquidityTx {
        let mut tx = AddLiquidityTx {
            from_account_index: from,
            pair_index: 0,
            asset_a_id: 0,
            asset_a_amount: BigInt::from(a),
            asset_b_id: 1,
            asset_b_amount: BigInt::from(b),
            lp_amount_min: BigInt::from(min_lp),
            lp_amount: BigInt::zero(),
            k_last: BigInt::zero(),
            treasury_amount: BigInt::zero(),
            gas_account_index: GAS_ACCOUNT,
            gas_fee_asset_id: 0,
            gas_fee_asset_amount: BigInt::from(1),
            expired_at: NOW_MS + 60_000,
            nonce,
            sig: Signature::default(),
        };
        tx.sig = sign(from, &tx.msg_hash().unwrap());
        tx
    }

    fn state(liquidity: LiquidityInfo) -> Snapshot {
        let mut snapshot = snapshot(vec![
            account(2, &[(0, 1_000), (1, 1_000)]),
            account(GAS_ACCOUNT, &[]),
            account(0, &[]),
        ]);
        snapshot.liquidity = Some(liquidity);
        snapshot
    }

    #[test]
    fn test_first_deposit_mints_sqrt() {
        let mut empty = pool(0, 0);
        empty.lp_amount = BigInt::zero();
        empty.k_last = BigInt::zero();
        let pending = signed_add(2, 100, 400, 200, 0).verify(&state(empty), &ctx()).unwrap();

        assert_eq!(pending.details.len(), 7);
        assert_eq!(general(&pending.details[3]).lp_amount, BigInt::from(200));
        assert_eq!(general(&pending.details[4]).lp_amount, BigInt::zero());
        assert_eq!(pending.details[4].account_index, 0);

        let delta: LiquidityInfo = parse_entity(&pending.details[5].balance_delta).unwrap();
        assert_eq!(delta.lp_amount, BigInt::from(200));
        assert_eq!(delta.k_last, BigInt::from(40_000));

        let completed: AddLiquidityTx = serde_json::from_str(&pending.tx_info).unwrap();
        assert_eq!(completed.lp_amount, BigInt::from(200));
    }

    #[test]
    fn test_later_deposit_accrues_treasury() {
        // sqrt of the invariant more than doubled since the last accrual
        let mut grown = pool(1100, 1000);
        grown.k_last = BigInt::from(250_000);
        grown.fee_rate = 30;
        grown.treasury_rate = 30;
        let treasury = treasury_lp(&grown);
        assert_eq!(treasury, BigInt::from(1));

        let pending = signed_add(2, 110, 100, 0, 0).verify(&state(grown.clone()), &ctx()).unwrap();
        let completed: AddLiquidityTx = serde_json::from_str(&pending.tx_info).unwrap();
        assert_eq!(completed.treasury_amount, treasury);
        assert_eq!(
            completed.lp_amount,
            BigInt::from(110) * (&grown.lp_amount - &treasury) / BigInt::from(1100)
        );
        assert_eq!(general(&pending.details[4]).lp_amount, treasury);
    }

    #[test]
    fn test_deposit_off_ratio_prices_on_asset_a() {
        let pending = signed_add(2, 100, 50, 0, 0).verify(&state(pool(1000, 1000)), &ctx()).unwrap();
        let completed: AddLiquidityTx = serde_json::from_str(&pending.tx_info).unwrap();
        assert_eq!(completed.lp_amount, BigInt::from(100));
        assert_eq!(completed.k_last, BigInt::from(1100 * 1050));

        let delta: LiquidityInfo = parse_entity(&pending.details[5].balance_delta).unwrap();
        assert_eq!(delta.asset_a, BigInt::from(100));
        assert_eq!(delta.asset_b, BigInt::from(50));
    }

    #[test]
    fn test_deposit_below_min_lp() {
        let err = signed_add(2, 100, 100, 1_000, 0).verify(&state(pool(1000, 1000)), &ctx()).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_deposit_insufficient_balance() {
        let err = signed_add(2, 1_000, 1_000, 0, 0)
            .verify(&state(pool(1000, 1000)), &ctx())
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance(_)));
    }
}
