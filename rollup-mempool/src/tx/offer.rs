use num_bigint::BigInt;
use num_traits::Signed;
use serde::{Deserialize, Serialize};

use super::common::{check_amount, check_expiry, check_rate, check_signature, consume_offer};
use super::transfer_nft::check_owner;
use super::{Requirements, Snapshot, VerifyContext};
use crate::constants::{BUY_OFFER_TYPE, SELL_OFFER_TYPE};
use crate::crypto::MsgHasher;
use crate::entity::Account;
use crate::error::{Error, Result};
use crate::lock::ResourceKey;
use crate::types::{bigint_str, OfferRecord, Signature, TxType};

/// Signed marketplace offer to buy or sell one NFT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferTx {
    /// [`BUY_OFFER_TYPE`] or [`SELL_OFFER_TYPE`]
    pub offer_type: i64,
    /// Offer id, unique per account
    pub offer_id: i64,
    /// Signer
    pub account_index: i64,
    /// NFT traded
    pub nft_index: i64,
    /// Quote asset
    pub asset_id: i64,
    /// Quote amount
    #[serde(with = "bigint_str")]
    pub asset_amount: BigInt,
    /// Listing time (unix milliseconds)
    pub listed_at: i64,
    /// Expiry (unix milliseconds)
    pub expired_at: i64,
    /// Protocol fee in basis points
    pub treasury_rate: i64,
    /// Signer signature
    pub sig: Signature,
}

impl OfferTx {
    /// Digest the signer signs
    pub fn msg_hash(&self) -> Result<[u8; 32]> {
        MsgHasher::new()
            .write_i64(TxType::Offer.code() as i64)
            .write_i64(self.offer_type)
            .write_i64(self.offer_id)
            .write_i64(self.account_index)
            .write_i64(self.nft_index)
            .write_i64(self.asset_id)
            .write_bigint(&self.asset_amount)
            .write_i64(self.listed_at)
            .write_i64(self.expired_at)
            .write_i64(self.treasury_rate)
            .finalize()
    }

    /// Static fields and the signer's signature
    ///
    /// Also rejects an offer whose bit the signer already consumed.
    pub(crate) fn check_signed(&self, signer: &Account, ctx: &VerifyContext) -> Result<()> {
        if self.offer_type != BUY_OFFER_TYPE && self.offer_type != SELL_OFFER_TYPE {
            return Err(Error::MalformedInput(format!("unknown offer type {}", self.offer_type)));
        }
        check_amount("offer amount", &self.asset_amount)?;
        check_rate("treasury rate", self.treasury_rate)?;
        check_expiry(self.expired_at, ctx)?;
        if self.listed_at > self.expired_at {
            return Err(Error::MalformedInput(format!(
                "offer listed at {} after its expiry {}",
                self.listed_at, self.expired_at
            )));
        }
        if signer.account_index != self.account_index {
            return Err(Error::MalformedInput(format!(
                "offer {} is signed by {}, not {}",
                self.offer_id, self.account_index, signer.account_index
            )));
        }
        consume_offer(signer, self.offer_id)?;
        check_signature(signer, &self.msg_hash()?, &self.sig)
    }

    pub(crate) fn requirements(&self) -> Requirements {
        Requirements {
            latest_accounts: vec![self.account_index],
            nft: Some(self.nft_index),
            next_offer_id: Some(self.account_index),
            locks: vec![ResourceKey::OfferCounter(self.account_index)],
            ..Requirements::default()
        }
    }

    pub(crate) fn verify(&self, snapshot: &Snapshot, ctx: &VerifyContext) -> Result<OfferRecord> {
        let signer = snapshot.account(self.account_index)?;

        let next_offer_id = snapshot
            .next_offer_id
            .ok_or_else(|| Error::ResourceNotFound("offer id not issued".into()))?;
        if self.offer_id != next_offer_id {
            return Err(Error::MalformedInput(format!(
                "offer id {} is not the next id {} of account {}",
                self.offer_id, next_offer_id, self.account_index
            )));
        }

        if self.offer_type == SELL_OFFER_TYPE {
            check_owner(snapshot.nft()?, self.nft_index, self.account_index)?;
        } else if !signer.balance(self.asset_id).is_positive() {
            return Err(Error::InsufficientBalance(format!(
                "account {} holds no asset {} to bid with",
                self.account_index, self.asset_id
            )));
        }

        self.check_signed(signer, ctx)?;

        Ok(OfferRecord {
            offer_type: self.offer_type,
            offer_id: self.offer_id,
            account_index: self.account_index,
            nft_index: self.nft_index,
            asset_id: self.asset_id,
            asset_amount: self.asset_amount.to_string(),
            listed_at: self.listed_at,
            expired_at: self.expired_at,
            treasury_rate: self.treasury_rate,
            sig: self.sig.to_hex(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::common::fixtures::*;
    use super::super::transfer_nft::tests::owned_nft;
    use super::*;

    pub(crate) fn signed_offer(offer_type: i64, account_index: i64, offer_id: i64, amount: i64) -> OfferTx {
        let mut offer = OfferTx {
            offer_type,
            offer_id,
            account_index,
            nft_index: 4,
            asset_id: 0,
            asset_amount: BigInt::from(amount),
            listed_at: NOW_MS - 1_000,
            expired_at: NOW_MS + 60_000,
            treasury_rate: 200,
            sig: Signature::default(),
        };
        offer.sig = sign(account_index, &offer.msg_hash().unwrap());
        offer
    }

    fn state(next_offer_id: i64) -> Snapshot {
        let mut snapshot = snapshot(vec![account(2, &[]), account(3, &[(0, 10)])]);
        snapshot.nft = Some(owned_nft(4, 2));
        snapshot.next_offer_id = Some(next_offer_id);
        snapshot
    }

    #[test]
    fn test_sell_and_buy_offers() {
        let record = signed_offer(SELL_OFFER_TYPE, 2, 0, 100).verify(&state(0), &ctx()).unwrap();
        assert_eq!(record.offer_id, 0);
        assert_eq!(record.asset_amount, "100");

        let mut buy_state = state(0);
        buy_state.accounts.remove(&2);
        assert!(signed_offer(BUY_OFFER_TYPE, 3, 0, 100).verify(&buy_state, &ctx()).is_ok());
    }

    #[test]
    fn test_offer_rejections() {
        // seller does not own the NFT
        let err = signed_offer(SELL_OFFER_TYPE, 3, 0, 100).verify(&state(0), &ctx()).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));

        // bidder holds nothing
        let err = signed_offer(BUY_OFFER_TYPE, 2, 0, 100).verify(&state(0), &ctx()).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance(_)));

        // id out of sequence
        let err = signed_offer(SELL_OFFER_TYPE, 2, 1, 100).verify(&state(0), &ctx()).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));

        let mut expired = signed_offer(SELL_OFFER_TYPE, 2, 0, 100);
        expired.expired_at = NOW_MS - 1;
        expired.listed_at = NOW_MS - 2;
        assert!(matches!(expired.verify(&state(0), &ctx()), Err(Error::MalformedInput(_))));
    }
}
