use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use super::common::{
    check_amount, check_expiry, check_gas_account, check_name_hash, check_nonce, check_signature, str_field,
    BalanceSheet, DetailBuilder,
};
use super::{pending_header, PendingTx, Requirements, Snapshot, VerifyContext};
use crate::crypto::MsgHasher;
use crate::error::Result;
use crate::lock::ResourceKey;
use crate::types::{bigint_str, Signature, TxType};

/// L2 asset transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTx {
    /// Sender
    pub from_account_index: i64,
    /// Receiver
    pub to_account_index: i64,
    /// Receiver's name hash as known to the sender
    pub to_account_name_hash: String,
    /// Transferred asset
    pub asset_id: i64,
    /// Transferred amount
    #[serde(with = "bigint_str")]
    pub asset_amount: BigInt,
    /// Gas fee recipient
    pub gas_account_index: i64,
    /// Gas fee asset
    pub gas_fee_asset_id: i64,
    /// Gas fee amount
    #[serde(with = "bigint_str")]
    pub gas_fee_asset_amount: BigInt,
    /// Free-form memo
    pub memo: String,
    /// Expiry (unix milliseconds)
    pub expired_at: i64,
    /// Sender nonce
    pub nonce: i64,
    /// Sender signature over [`TransferTx::msg_hash`]
    pub sig: Signature,
}

impl TransferTx {
    /// Digest the sender signs
    pub fn msg_hash(&self) -> Result<[u8; 32]> {
        MsgHasher::new()
            .write_i64(TxType::Transfer.code() as i64)
            .write_i64(self.from_account_index)
            .write_i64(self.to_account_index)
            .write_digest(&str_field(&self.to_account_name_hash))
            .write_i64(self.asset_id)
            .write_bigint(&self.asset_amount)
            .write_i64(self.gas_account_index)
            .write_i64(self.gas_fee_asset_id)
            .write_bigint(&self.gas_fee_asset_amount)
            .write_digest(&str_field(&self.memo))
            .write_i64(self.expired_at)
            .write_i64(self.nonce)
            .finalize()
    }

    pub(crate) fn requirements(&self) -> Requirements {
        Requirements {
            latest_accounts: vec![self.from_account_index],
            basic_accounts: vec![self.to_account_index, self.gas_account_index],
            locks: vec![ResourceKey::Account(self.from_account_index)],
            ..Requirements::default()
        }
    }

    pub(crate) fn verify(&self, snapshot: &Snapshot, ctx: &VerifyContext) -> Result<PendingTx> {
        check_amount("asset amount", &self.asset_amount)?;
        check_amount("gas fee", &self.gas_fee_asset_amount)?;
        check_gas_account(self.gas_account_index, ctx)?;
        check_expiry(self.expired_at, ctx)?;

        let from = snapshot.account(self.from_account_index)?;
        check_nonce(from, self.nonce)?;

        BalanceSheet::default()
            .debit(self.from_account_index, self.asset_id, &self.asset_amount)
            .debit(self.from_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .credit(self.to_account_index, self.asset_id, &self.asset_amount)
            .credit(self.gas_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .ensure_covered(snapshot)?;

        check_name_hash(snapshot.account(self.to_account_index)?, &self.to_account_name_hash)?;
        check_signature(from, &self.msg_hash()?, &self.sig)?;

        let mut details = DetailBuilder::new(snapshot);
        details
            .balance(self.from_account_index, self.asset_id, -self.asset_amount.clone())?
            .balance(self.from_account_index, self.gas_fee_asset_id, -self.gas_fee_asset_amount.clone())?
            .balance(self.to_account_index, self.asset_id, self.asset_amount.clone())?
            .balance(self.gas_account_index, self.gas_fee_asset_id, self.gas_fee_asset_amount.clone())?;

        Ok(PendingTx {
            asset_id: self.asset_id,
            tx_amount: self.asset_amount.clone(),
            memo: self.memo.clone(),
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
pub(crate) mod tests {
    use super::super::common::fixtures::*;
    use super::*;
    use crate::error::Error;

    pub(crate) fn signed_transfer(from: i64, to: i64, amount: i64, fee: i64, nonce: i64) -> TransferTx {
        let mut tx = TransferTx {
            from_account_index: from,
            to_account_index: to,
            to_account_name_hash: name_hash(to),
            asset_id: 0,
            asset_amount: BigInt::from(amount),
            gas_account_index: GAS_ACCOUNT,
            gas_fee_asset_id: 0,
            gas_fee_asset_amount: BigInt::from(fee),
            memo: String::new(),
            expired_at: NOW_MS + 60_000,
            nonce,
            sig: Signature::default(),
        };
        tx.sig = sign(from, &tx.msg_hash().unwrap());
        tx
    }

    fn accounts() -> Snapshot {
        let mut from = account(2, &[(0, 100)]);
        from.nonce = 3;
        snapshot(vec![from, account(3, &[]), account(GAS_ACCOUNT, &[])])
    }

    #[test]
    fn test_transfer_details() {
        let tx = signed_transfer(2, 3, 40, 1, 3);
        let pending = tx.verify(&accounts(), &ctx()).unwrap();

        let deltas: Vec<_> = pending
            .details
            .iter()
            .map(|d| (d.account_index, general(d).balance))
            .collect();
        assert_eq!(
            deltas,
            vec![
                (2, BigInt::from(-40)),
                (2, BigInt::from(-1)),
                (3, BigInt::from(40)),
                (GAS_ACCOUNT, BigInt::from(1)),
            ]
        );
        let account_orders: Vec<_> = pending.details.iter().map(|d| d.account_order).collect();
        assert_eq!(account_orders, vec![0, 0, 1, 2]);
        assert_eq!(pending.nonce, 3);
        assert_eq!(pending.tx_amount, BigInt::from(40));
    }

    #[test]
    fn test_transfer_rejections() {
        let snapshot = accounts();
        let ctx = ctx();

        let replay = signed_transfer(2, 3, 40, 1, 2);
        assert!(matches!(
            replay.verify(&snapshot, &ctx),
            Err(Error::StaleOrInvalidNonce { expected: 3, got: 2, .. })
        ));

        let too_much = signed_transfer(2, 3, 100, 1, 3);
        assert!(matches!(too_much.verify(&snapshot, &ctx), Err(Error::InsufficientBalance(_))));

        let mut wrong_name = signed_transfer(2, 3, 40, 1, 3);
        wrong_name.to_account_name_hash = name_hash(9);
        wrong_name.sig = sign(2, &wrong_name.msg_hash().unwrap());
        assert!(matches!(wrong_name.verify(&snapshot, &ctx), Err(Error::MalformedInput(_))));

        let mut tampered = signed_transfer(2, 3, 40, 1, 3);
        tampered.asset_amount = BigInt::from(41);
        assert!(matches!(tampered.verify(&snapshot, &ctx), Err(Error::InvalidSignature(_))));

        let forged = {
            let mut tx = signed_transfer(2, 3, 40, 1, 3);
            tx.sig = sign(3, &tx.msg_hash().unwrap());
            tx
        };
        assert!(matches!(forged.verify(&snapshot, &ctx), Err(Error::InvalidSignature(_))));

        let negative = signed_transfer(2, 3, -5, 1, 3);
        assert!(matches!(negative.verify(&snapshot, &ctx), Err(Error::MalformedInput(_))));

        let mut expired = signed_transfer(2, 3, 40, 1, 3);
        expired.expired_at = NOW_MS - 1;
        assert!(matches!(expired.verify(&snapshot, &ctx), Err(Error::MalformedInput(_))));
    }
}
