use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use super::common::{
    check_amount, check_expiry, check_gas_account, check_nonce, check_signature, consume_offer, BalanceSheet,
    DetailBuilder,
};
use super::{pending_header, PendingTx, Requirements, Snapshot, VerifyContext};
use crate::crypto::MsgHasher;
use crate::error::Result;
use crate::lock::ResourceKey;
use crate::types::{bigint_str, Signature, TxType};

/// Cancellation of one of the signer's offers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOfferTx {
    /// Offer signer
    pub account_index: i64,
    /// Cancelled offer id
    pub offer_id: i64,
    /// Gas fee recipient
    pub gas_account_index: i64,
    /// Gas fee asset
    pub gas_fee_asset_id: i64,
    /// Gas fee amount
    #[serde(with = "bigint_str")]
    pub gas_fee_asset_amount: BigInt,
    /// Expiry (unix milliseconds)
    pub expired_at: i64,
    /// Signer nonce
    pub nonce: i64,
    /// Signer signature
    pub sig: Signature,
}

impl CancelOfferTx {
    /// Digest the signer signs
    pub fn msg_hash(&self) -> Result<[u8; 32]> {
        MsgHasher::new()
            .write_i64(TxType::CancelOffer.code() as i64)
            .write_i64(self.account_index)
            .write_i64(self.offer_id)
            .write_i64(self.gas_account_index)
            .write_i64(self.gas_fee_asset_id)
            .write_bigint(&self.gas_fee_asset_amount)
            .write_i64(self.expired_at)
            .write_i64(self.nonce)
            .finalize()
    }

    pub(crate) fn requirements(&self) -> Requirements {
        Requirements {
            latest_accounts: vec![self.account_index],
            basic_accounts: vec![self.gas_account_index],
            locks: vec![ResourceKey::Account(self.account_index)],
            ..Requirements::default()
        }
    }

    pub(crate) fn verify(&self, snapshot: &Snapshot, ctx: &VerifyContext) -> Result<PendingTx> {
        check_amount("gas fee", &self.gas_fee_asset_amount)?;
        check_gas_account(self.gas_account_index, ctx)?;
        check_expiry(self.expired_at, ctx)?;

        let signer = snapshot.account(self.account_index)?;
        check_nonce(signer, self.nonce)?;

        BalanceSheet::default()
            .debit(self.account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .credit(self.gas_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .ensure_covered(snapshot)?;

        let (slot, bitmap) = consume_offer(signer, self.offer_id)?;

        check_signature(signer, &self.msg_hash()?, &self.sig)?;

        let mut details = DetailBuilder::new(snapshot);
        details
            .balance(self.account_index, self.gas_fee_asset_id, -self.gas_fee_asset_amount.clone())?
            .offer_bitmap(self.account_index, slot, bitmap)?
            .balance(self.gas_account_index, self.gas_fee_asset_id, self.gas_fee_asset_amount.clone())?;

        Ok(PendingTx {
            tx_info: serde_json::to_string(self)?,
            details: details.finish(),
            ..pending_header(
                self.account_index,
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
    use crate::entity::AccountAsset;
    use crate::error::Error;

    pub(crate) fn signed_cancel(account_index: i64, offer_id: i64, nonce: i64) -> CancelOfferTx {
        let mut tx = CancelOfferTx {
            account_index,
            offer_id,
            gas_account_index: GAS_ACCOUNT,
            gas_fee_asset_id: 0,
            gas_fee_asset_amount: BigInt::from(1),
            expired_at: NOW_MS,
            nonce,
            sig: Signature::default(),
        };
        tx.sig = sign(account_index, &tx.msg_hash().unwrap());
        tx
    }

    #[test]
    fn test_cancel_sets_exactly_one_bit() {
        let signer = account(2, &[(0, 5)])
            .apply_asset_delta(&AccountAsset::bitmap_delta(1, crate::entity::OfferBitmap::from_bits(0b1)))
            .unwrap();
        let snapshot = snapshot(vec![signer, account(GAS_ACCOUNT, &[])]);

        let pending = signed_cancel(2, 129, 0).verify(&snapshot, &ctx()).unwrap();
        let bitmap = general(&pending.details[1]).offer_canceled_or_finalized;
        assert_eq!(pending.details[1].asset_id, 1);
        assert_eq!(bitmap.bits(), 0b11);

        let err = signed_cancel(2, 128, 0).verify(&snapshot, &ctx()).unwrap_err();
        assert!(matches!(err, Error::OfferAlreadyConsumed { account_index: 2, offer_id: 128 }));
    }
}
