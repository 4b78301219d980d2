use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use super::common::{
    check_amount, check_expiry, check_gas_account, check_nonce, check_signature, str_field, BalanceSheet,
    DetailBuilder,
};
use super::{pending_header, PendingTx, Requirements, Snapshot, VerifyContext};
use crate::crypto::MsgHasher;
use crate::error::{Error, Result};
use crate::lock::ResourceKey;
use crate::types::{bigint_str, Signature, TxType};

/// Asset withdrawal to an L1 address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawTx {
    /// Withdrawing account
    pub from_account_index: i64,
    /// Withdrawn asset
    pub asset_id: i64,
    /// Withdrawn amount
    #[serde(with = "bigint_str")]
    pub asset_amount: BigInt,
    /// L1 destination
    pub to_address: String,
    /// Gas fee recipient
    pub gas_account_index: i64,
    /// Gas fee asset
    pub gas_fee_asset_id: i64,
    /// Gas fee amount
    #[serde(with = "bigint_str")]
    pub gas_fee_asset_amount: BigInt,
    /// Expiry (unix milliseconds)
    pub expired_at: i64,
    /// Account nonce
    pub nonce: i64,
    /// Account signature
    pub sig: Signature,
}

impl WithdrawTx {
    /// Digest the account signs
    pub fn msg_hash(&self) -> Result<[u8; 32]> {
        MsgHasher::new()
            .write_i64(TxType::Withdraw.code() as i64)
            .write_i64(self.from_account_index)
            .write_i64(self.asset_id)
            .write_bigint(&self.asset_amount)
            .write_digest(&str_field(&self.to_address))
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
            locks: vec![ResourceKey::Account(self.from_account_index)],
            ..Requirements::default()
        }
    }

    pub(crate) fn verify(&self, snapshot: &Snapshot, ctx: &VerifyContext) -> Result<PendingTx> {
        check_amount("asset amount", &self.asset_amount)?;
        check_amount("gas fee", &self.gas_fee_asset_amount)?;
        check_gas_account(self.gas_account_index, ctx)?;
        check_expiry(self.expired_at, ctx)?;
        if self.to_address.trim().is_empty() {
            return Err(Error::MalformedInput("empty L1 destination".into()));
        }

        let from = snapshot.account(self.from_account_index)?;
        check_nonce(from, self.nonce)?;

        BalanceSheet::default()
            .debit(self.from_account_index, self.asset_id, &self.asset_amount)
            .debit(self.from_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .credit(self.gas_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .ensure_covered(snapshot)?;

        check_signature(from, &self.msg_hash()?, &self.sig)?;

        let mut details = DetailBuilder::new(snapshot);
        details
            .balance(self.from_account_index, self.asset_id, -self.asset_amount.clone())?
            .balance(self.from_account_index, self.gas_fee_asset_id, -self.gas_fee_asset_amount.clone())?
            .balance(self.gas_account_index, self.gas_fee_asset_id, self.gas_fee_asset_amount.clone())?;

        Ok(PendingTx {
            asset_id: self.asset_id,
            tx_amount: self.asset_amount.clone(),
            native_address: self.to_address.clone(),
            tx_info: serde_json::to_string(self)?,
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
mod tests {
    use super::super::common::fixtures::*;
    use super::*;

    fn signed_withdraw(amount: i64, to_address: &str) -> WithdrawTx {
        let mut tx = WithdrawTx {
            from_account_index: 2,
            asset_id: 0,
            asset_amount: BigInt::from(amount),
            to_address: to_address.to_string(),
            gas_account_index: GAS_ACCOUNT,
            gas_fee_asset_id: 0,
            gas_fee_asset_amount: BigInt::from(2),
            expired_at: NOW_MS + 1,
            nonce: 0,
            sig: Signature::default(),
        };
        tx.sig = sign(2, &tx.msg_hash().unwrap());
        tx
    }

    #[test]
    fn test_withdraw_combines_same_asset() {
        let snapshot = snapshot(vec![account(2, &[(0, 50)]), account(GAS_ACCOUNT, &[])]);
        let pending = signed_withdraw(48, "0xabc").verify(&snapshot, &ctx()).unwrap();
        let total: BigInt = pending.details.iter().map(|d| general(d).balance).sum();
        assert_eq!(total, BigInt::from(-48));
        assert_eq!(pending.native_address, "0xabc");

        let err = signed_withdraw(49, "0xabc").verify(&snapshot, &ctx()).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance(_)));
    }

    #[test]
    fn test_withdraw_requires_destination() {
        let snapshot = snapshot(vec![account(2, &[(0, 50)]), account(GAS_ACCOUNT, &[])]);
        let err = signed_withdraw(1, " ").verify(&snapshot, &ctx()).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }
}
