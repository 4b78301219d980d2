use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use super::common::{
    check_amount, check_expiry, check_gas_account, check_nonce, check_signature, pool_delta, BalanceSheet,
    DetailBuilder,
};
use super::{pending_header, PendingTx, Requirements, Snapshot, VerifyContext};
use crate::amm::quote_swap;
use crate::crypto::MsgHasher;
use crate::error::{Error, Result};
use crate::lock::ResourceKey;
use crate::types::{bigint_str, Signature, TxType};

/// AMM swap selling `asset_a` for `asset_b`
///
/// `asset_a`/`asset_b` name the submitter's sold and bought assets, which
/// may be either orientation of the pool's pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapTx {
    /// Trader
    pub from_account_index: i64,
    /// Pool
    pub pair_index: i64,
    /// Sold asset
    pub asset_a_id: i64,
    /// Sold amount
    #[serde(with = "bigint_str")]
    pub asset_a_amount: BigInt,
    /// Bought asset
    pub asset_b_id: i64,
    /// Least acceptable output
    #[serde(with = "bigint_str")]
    pub asset_b_min_amount: BigInt,
    /// Computed output, filled in at admission
    #[serde(with = "bigint_str", default)]
    pub asset_b_amount_delta: BigInt,
    /// Gas fee recipient
    pub gas_account_index: i64,
    /// Gas fee asset
    pub gas_fee_asset_id: i64,
    /// Gas fee amount
    #[serde(with = "bigint_str")]
    pub gas_fee_asset_amount: BigInt,
    /// Expiry (unix milliseconds)
    pub expired_at: i64,
    /// Trader nonce
    pub nonce: i64,
    /// Trader signature
    pub sig: Signature,
}

impl SwapTx {
    /// Digest the trader signs; the computed output is not part of it
    pub fn msg_hash(&self) -> Result<[u8; 32]> {
        MsgHasher::new()
            .write_i64(TxType::Swap.code() as i64)
            .write_i64(self.from_account_index)
            .write_i64(self.pair_index)
            .write_i64(self.asset_a_id)
            .write_bigint(&self.asset_a_amount)
            .write_i64(self.asset_b_id)
            .write_bigint(&self.asset_b_min_amount)
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
            locks: vec![
                ResourceKey::Account(self.from_account_index),
                ResourceKey::Liquidity(self.pair_index),
            ],
            ..Requirements::default()
        }
    }

    pub(crate) fn verify(&self, snapshot: &Snapshot, ctx: &VerifyContext) -> Result<PendingTx> {
        check_amount("sold amount", &self.asset_a_amount)?;
        check_amount("min output", &self.asset_b_min_amount)?;
        check_amount("gas fee", &self.gas_fee_asset_amount)?;
        check_gas_account(self.gas_account_index, ctx)?;
        check_expiry(self.expired_at, ctx)?;

        let pool = snapshot.liquidity()?;
        if pool.pair_index != self.pair_index || !pool.matches_pair(self.asset_a_id, self.asset_b_id) {
            return Err(Error::MalformedInput(format!(
                "assets ({}, {}) are not pair {}",
                self.asset_a_id, self.asset_b_id, self.pair_index
            )));
        }

        let from = snapshot.account(self.from_account_index)?;
        check_nonce(from, self.nonce)?;

        let quote = quote_swap(pool, self.asset_a_id, &self.asset_a_amount)?;
        BalanceSheet::default()
            .debit(self.from_account_index, self.asset_a_id, &self.asset_a_amount)
            .credit(self.from_account_index, self.asset_b_id, &quote.amount_out)
            .debit(self.from_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .credit(self.gas_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .ensure_covered(snapshot)?;

        if quote.amount_out < self.asset_b_min_amount {
            return Err(Error::InvariantViolation(format!(
                "swap output {} below minimum {}",
                quote.amount_out, self.asset_b_min_amount
            )));
        }

        check_signature(from, &self.msg_hash()?, &self.sig)?;

        let completed = SwapTx {
            asset_b_amount_delta: quote.amount_out.clone(),
            ..self.clone()
        };
        let delta = pool_delta(pool, quote.pool_delta_a, quote.pool_delta_b, BigInt::zero(), BigInt::zero());

        let mut details = DetailBuilder::new(snapshot);
        details
            .balance(self.from_account_index, self.asset_a_id, -self.asset_a_amount.clone())?
            .balance(self.from_account_index, self.asset_b_id, quote.amount_out.clone())?
            .balance(self.from_account_index, self.gas_fee_asset_id, -self.gas_fee_asset_amount.clone())?
            .liquidity(&delta)?
            .balance(self.gas_account_index, self.gas_fee_asset_id, self.gas_fee_asset_amount.clone())?;

        tracing::debug!(
            pair_index = self.pair_index,
            amount_in = %self.asset_a_amount,
            amount_out = %quote.amount_out,
            "Swap quoted"
        );

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
    use crate::entity::{parse_entity, tests::pool, LiquidityInfo};

    pub(crate) fn signed_swap(from: i64, sold: i64, bought: i64, amount: i64, min_out: i64, nonce: i64) -> SwapTx {
        let mut tx = SwapTx {
            from_account_index: from,
            pair_index: 0,
            asset_a_id: sold,
            asset_a_amount: BigInt::from(amount),
            asset_b_id: bought,
            asset_b_min_amount: BigInt::from(min_out),
            asset_b_amount_delta: BigInt::zero(),
            gas_account_index: GAS_ACCOUNT,
            gas_fee_asset_id: 2,
            gas_fee_asset_amount: BigInt::from(1),
            expired_at: NOW_MS + 60_000,
            nonce,
            sig: Signature::default(),
        };
        tx.sig = sign(from, &tx.msg_hash().unwrap());
        tx
    }

    fn state() -> Snapshot {
        let mut snapshot = snapshot(vec![account(2, &[(0, 500), (1, 500), (2, 10)]), account(GAS_ACCOUNT, &[])]);
        snapshot.liquidity = Some(pool(1000, 1000));
        snapshot
    }

    #[test]
    fn test_swap_a_for_b() {
        let pending = signed_swap(2, 0, 1, 100, 90, 0).verify(&state(), &ctx()).unwrap();
        assert_eq!(pending.details.len(), 5);
        assert_eq!(general(&pending.details[0]).balance, BigInt::from(-100));
        assert_eq!(general(&pending.details[1]).balance, BigInt::from(90));
        assert_eq!(general(&pending.details[2]).balance, BigInt::from(-1));

        let delta: LiquidityInfo = parse_entity(&pending.details[3].balance_delta).unwrap();
        assert_eq!(delta.asset_a, BigInt::from(100));
        assert_eq!(delta.asset_b, BigInt::from(-90));
        assert_eq!(delta.fee_rate, 30);

        let completed: SwapTx = serde_json::from_str(&pending.tx_info).unwrap();
        assert_eq!(completed.asset_b_amount_delta, BigInt::from(90));
        assert_eq!(pending.pair_index, 0);
    }

    #[test]
    fn test_swap_b_for_a_flips_pool_sign() {
        let pending = signed_swap(2, 1, 0, 100, 0, 0).verify(&state(), &ctx()).unwrap();
        let delta: LiquidityInfo = parse_entity(&pending.details[3].balance_delta).unwrap();
        assert_eq!(delta.asset_a, BigInt::from(-90));
        assert_eq!(delta.asset_b, BigInt::from(100));
    }

    #[test]
    fn test_swap_min_out_rejected() {
        let err = signed_swap(2, 0, 1, 100, 91, 0).verify(&state(), &ctx()).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_swap_wrong_pair() {
        let err = signed_swap(2, 0, 5, 100, 0, 0).verify(&state(), &ctx()).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn test_swap_insufficient_input() {
        let err = signed_swap(2, 0, 1, 501, 0, 0).verify(&state(), &ctx()).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance(_)));
    }
}
