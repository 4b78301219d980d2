use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use super::common::{
    check_amount, check_expiry, check_gas_account, check_name_hash, check_nonce, check_signature, str_field,
    BalanceSheet, DetailBuilder,
};
use super::{pending_header, PendingTx, Requirements, Snapshot, VerifyContext};
use crate::crypto::MsgHasher;
use crate::entity::NftInfo;
use crate::error::{Error, Result};
use crate::lock::ResourceKey;
use crate::types::{bigint_str, Signature, TxType};

/// NFT transfer between accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferNftTx {
    /// Current owner
    pub from_account_index: i64,
    /// New owner
    pub to_account_index: i64,
    /// New owner's name hash
    pub to_account_name_hash: String,
    /// Transferred NFT
    pub nft_index: i64,
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

/// The NFT must exist and belong to `account_index`
pub(crate) fn check_owner(nft: &NftInfo, nft_index: i64, account_index: i64) -> Result<()> {
    if nft.nft_index != nft_index || nft.is_empty() {
        return Err(Error::ResourceNotFound(format!("nft {}", nft_index)));
    }
    if nft.owner_account_index != account_index {
        return Err(Error::MalformedInput(format!(
            "nft {} is owned by {}, not {}",
            nft_index, nft.owner_account_index, account_index
        )));
    }
    Ok(())
}

impl TransferNftTx {
    /// Digest the owner signs
    pub fn msg_hash(&self) -> Result<[u8; 32]> {
        MsgHasher::new()
            .write_i64(TxType::TransferNft.code() as i64)
            .write_i64(self.from_account_index)
            .write_i64(self.to_account_index)
            .write_digest(&str_field(&self.to_account_name_hash))
            .write_i64(self.nft_index)
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
            basic_accounts: vec![self.to_account_index, self.gas_account_index],
            nft: Some(self.nft_index),
            locks: vec![
                ResourceKey::Account(self.from_account_index),
                ResourceKey::Nft(self.nft_index),
            ],
            ..Requirements::default()
        }
    }

    pub(crate) fn verify(&self, snapshot: &Snapshot, ctx: &VerifyContext) -> Result<PendingTx> {
        check_amount("gas fee", &self.gas_fee_asset_amount)?;
        check_gas_account(self.gas_account_index, ctx)?;
        check_expiry(self.expired_at, ctx)?;

        let from = snapshot.account(self.from_account_index)?;
        check_nonce(from, self.nonce)?;

        BalanceSheet::default()
            .debit(self.from_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .credit(self.gas_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .ensure_covered(snapshot)?;

        let nft = snapshot.nft()?;
        check_owner(nft, self.nft_index, self.from_account_index)?;
        check_name_hash(snapshot.account(self.to_account_index)?, &self.to_account_name_hash)?;

        check_signature(from, &self.msg_hash()?, &self.sig)?;

        let mut details = DetailBuilder::new(snapshot);
        details
            .balance(self.from_account_index, self.gas_fee_asset_id, -self.gas_fee_asset_amount.clone())?
            .nft(&nft.with_owner(self.to_account_index))?
            .balance(self.gas_account_index, self.gas_fee_asset_id, self.gas_fee_asset_amount.clone())?;

        Ok(PendingTx {
            nft_index: self.nft_index,
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
