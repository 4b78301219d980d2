use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use super::common::{
    check_amount, check_expiry, check_gas_account, check_nonce, check_signature, consume_offer, BalanceSheet,
    DetailBuilder,
};
use super::offer::OfferTx;
use super::transfer_nft::check_owner;
use super::{pending_header, PendingTx, Requirements, Snapshot, VerifyContext};
use crate::amm::fee_share;
use crate::constants::{BUY_OFFER_TYPE, SELL_OFFER_TYPE};
use crate::crypto::MsgHasher;
use crate::error::{Error, Result};
use crate::lock::ResourceKey;
use crate::types::{bigint_str, Signature, TxType};

/// Settlement of a buy offer against a sell offer
///
/// The submitter pays gas and may be a third party. The buyer pays the
/// offer amount; the protocol fee (buy offer's treasury rate) goes to the
/// gas account, the creator royalty to the NFT creator, and the rest to the
/// seller. Both offers are consumed in their signers' bitmaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicMatchTx {
    /// Submitter
    pub account_index: i64,
    /// Buyer's signed offer
    pub buy_offer: OfferTx,
    /// Seller's signed offer
    pub sell_offer: OfferTx,
    /// Gas fee recipient
    pub gas_account_index: i64,
    /// Gas fee asset
    pub gas_fee_asset_id: i64,
    /// Gas fee amount
    #[serde(with = "bigint_str")]
    pub gas_fee_asset_amount: BigInt,
    /// Creator royalty, filled in at admission
    #[serde(with = "bigint_str", default)]
    pub creator_amount: BigInt,
    /// Protocol fee, filled in at admission
    #[serde(with = "bigint_str", default)]
    pub treasury_amount: BigInt,
    /// Expiry (unix milliseconds)
    pub expired_at: i64,
    /// Submitter nonce
    pub nonce: i64,
    /// Submitter signature
    pub sig: Signature,
}

impl AtomicMatchTx {
    /// Digest the submitter signs, binding both offer signatures
    pub fn msg_hash(&self) -> Result<[u8; 32]> {
        let buy = self.buy_offer.msg_hash()?;
        let sell = self.sell_offer.msg_hash()?;
        MsgHasher::new()
            .write_i64(TxType::AtomicMatch.code() as i64)
            .write_i64(self.account_index)
            .write_digest(&buy)
            .write_digest(&sell)
            .write_i64(self.gas_account_index)
            .write_i64(self.gas_fee_asset_id)
            .write_bigint(&self.gas_fee_asset_amount)
            .write_i64(self.expired_at)
            .write_i64(self.nonce)
            .finalize()
    }

    fn buyer(&self) -> i64 {
        self.buy_offer.account_index
    }

    fn seller(&self) -> i64 {
        self.sell_offer.account_index
    }

    pub(crate) fn requirements(&self) -> Requirements {
        Requirements {
            latest_accounts: vec![self.account_index, self.buyer(), self.seller()],
            basic_accounts: vec![self.gas_account_index],
            nft: Some(self.sell_offer.nft_index),
            nft_creator: true,
            locks: vec![
                ResourceKey::Account(self.account_index),
                ResourceKey::Account(self.buyer()),
                ResourceKey::Account(self.seller()),
                ResourceKey::Nft(self.sell_offer.nft_index),
            ],
            ..Requirements::default()
        }
    }

    fn check_pairing(&self) -> Result<()> {
        let (buy, sell) = (&self.buy_offer, &self.sell_offer);
        if buy.offer_type != BUY_OFFER_TYPE || sell.offer_type != SELL_OFFER_TYPE {
            return Err(Error::MalformedInput(format!(
                "offer sides {} / {} are not buy / sell",
                buy.offer_type, sell.offer_type
            )));
        }
        if buy.nft_index != sell.nft_index || buy.asset_id != sell.asset_id || buy.asset_amount != sell.asset_amount {
            return Err(Error::MalformedInput(format!(
                "offers disagree: buy nft {} asset {} amount {}, sell nft {} asset {} amount {}",
                buy.nft_index, buy.asset_id, buy.asset_amount, sell.nft_index, sell.asset_id, sell.asset_amount
            )));
        }
        if buy.account_index == sell.account_index {
            return Err(Error::MalformedInput(format!(
                "account {} cannot buy from itself",
                buy.account_index
            )));
        }
        Ok(())
    }

    pub(crate) fn verify(&self, snapshot: &Snapshot, ctx: &VerifyContext) -> Result<PendingTx> {
        check_amount("gas fee", &self.gas_fee_asset_amount)?;
        check_gas_account(self.gas_account_index, ctx)?;
        check_expiry(self.expired_at, ctx)?;
        self.check_pairing()?;

        let submitter = snapshot.account(self.account_index)?;
        check_nonce(submitter, self.nonce)?;

        let buyer = snapshot.account(self.buyer())?;
        let seller = snapshot.account(self.seller())?;
        self.buy_offer.check_signed(buyer, ctx)?;
        self.sell_offer.check_signed(seller, ctx)?;

        let nft = snapshot.nft()?;
        check_owner(nft, self.sell_offer.nft_index, self.seller())?;

        let amount = &self.buy_offer.asset_amount;
        let asset_id = self.buy_offer.asset_id;
        let treasury_amount = fee_share(amount, self.buy_offer.treasury_rate);
        let creator_amount = fee_share(amount, nft.creator_treasury_rate);
        let seller_amount = amount - &treasury_amount - &creator_amount;
        let creator_index = nft.creator_account_index;

        BalanceSheet::default()
            .debit(self.account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .debit(self.buyer(), asset_id, amount)
            .credit(self.seller(), asset_id, &seller_amount)
            .credit(creator_index, asset_id, &creator_amount)
            .credit(self.gas_account_index, asset_id, &treasury_amount)
            .credit(self.gas_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .ensure_covered(snapshot)?;

        check_signature(submitter, &self.msg_hash()?, &self.sig)?;

        let (buy_slot, buy_bitmap) = consume_offer(buyer, self.buy_offer.offer_id)?;
        let (sell_slot, sell_bitmap) = consume_offer(seller, self.sell_offer.offer_id)?;

        let completed = AtomicMatchTx {
            creator_amount: creator_amount.clone(),
            treasury_amount: treasury_amount.clone(),
            ..self.clone()
        };

        let mut details = DetailBuilder::new(snapshot);
        details
            .balance(self.account_index, self.gas_fee_asset_id, -self.gas_fee_asset_amount.clone())?
            .balance(self.buyer(), asset_id, -amount.clone())?
            .offer_bitmap(self.buyer(), buy_slot, buy_bitmap)?
            .balance(self.seller(), asset_id, seller_amount)?
            .offer_bitmap(self.seller(), sell_slot, sell_bitmap)?
            .balance(creator_index, asset_id, creator_amount)?
            .nft(&nft.with_owner(self.buyer()))?
            .balance(self.gas_account_index, asset_id, treasury_amount)?
            .balance(self.gas_account_index, self.gas_fee_asset_id, self.gas_fee_asset_amount.clone())?;

        Ok(PendingTx {
            nft_index: nft.nft_index,
            asset_id,
            tx_amount: amount.clone(),
            tx_info: serde_json::to_string(&completed)?,
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
