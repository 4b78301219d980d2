use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use super::common::{
    check_amount, check_expiry, check_gas_account, check_nonce, check_signature, str_field, BalanceSheet,
    DetailBuilder,
};
use super::transfer_nft::check_owner;
use super::{pending_header, PendingTx, Requirements, Snapshot, VerifyContext};
use crate::crypto::MsgHasher;
use crate::entity::NftInfo;
use crate::error::{Error, Result};
use crate::lock::ResourceKey;
use crate::types::{bigint_str, Signature, TxType};

/// NFT withdrawal to an L1 address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawNftTx {
    /// Owner
    pub account_index: i64,
    /// Withdrawn NFT
    pub nft_index: i64,
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
    /// Owner nonce
    pub nonce: i64,
    /// Owner signature
    pub sig: Signature,
}

impl WithdrawNftTx {
    /// Digest the owner signs
    pub fn msg_hash(&self) -> Result<[u8; 32]> {
        MsgHasher::new()
            .write_i64(TxType::WithdrawNft.code() as i64)
            .write_i64(self.account_index)
            .write_i64(self.nft_index)
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
            latest_accounts: vec![self.account_index],
            basic_accounts: vec![self.gas_account_index],
            nft: Some(self.nft_index),
            locks: vec![ResourceKey::Account(self.account_index), ResourceKey::Nft(self.nft_index)],
            ..Requirements::default()
        }
    }

    pub(crate) fn verify(&self, snapshot: &Snapshot, ctx: &VerifyContext) -> Result<PendingTx> {
        check_amount("gas fee", &self.gas_fee_asset_amount)?;
        check_gas_account(self.gas_account_index, ctx)?;
        check_expiry(self.expired_at, ctx)?;
        if self.to_address.trim().is_empty() {
            return Err(Error::MalformedInput("empty L1 destination".into()));
        }

        let owner = snapshot.account(self.account_index)?;
        check_nonce(owner, self.nonce)?;

        BalanceSheet::default()
            .debit(self.account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .credit(self.gas_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .ensure_covered(snapshot)?;

        check_owner(snapshot.nft()?, self.nft_index, self.account_index)?;

        check_signature(owner, &self.msg_hash()?, &self.sig)?;

        let mut details = DetailBuilder::new(snapshot);
        details
            .balance(self.account_index, self.gas_fee_asset_id, -self.gas_fee_asset_amount.clone())?
            .nft(&NftInfo::empty(self.nft_index))?
            .balance(self.gas_account_index, self.gas_fee_asset_id, self.gas_fee_asset_amount.clone())?;

        Ok(PendingTx {
            nft_index: self.nft_index,
            native_address: self.to_address.clone(),
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
