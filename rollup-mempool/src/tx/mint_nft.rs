use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use super::common::{
    check_amount, check_expiry, check_gas_account, check_name_hash, check_nonce, check_rate, check_signature,
    str_field, BalanceSheet, DetailBuilder,
};
use super::{pending_header, PendingTx, Requirements, Snapshot, VerifyContext};
use crate::constants::{NIL_COLLECTION_ID, NIL_L1_ADDRESS, NIL_L1_TOKEN_ID, NIL_TX_NFT_INDEX};
use crate::crypto::{parse_content_hash, MsgHasher};
use crate::entity::NftInfo;
use crate::error::{Error, Result};
use crate::lock::ResourceKey;
use crate::storage::Companion;
use crate::types::{bigint_str, Signature, TxType};

/// NFT mint by a creator for a recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintNftTx {
    /// Creator and submitter
    pub creator_account_index: i64,
    /// First owner
    pub to_account_index: i64,
    /// First owner's name hash
    pub to_account_name_hash: String,
    /// 32-byte content digest (hex)
    pub nft_content_hash: String,
    /// Collection the NFT joins
    pub nft_collection_id: i64,
    /// Creator royalty in basis points
    pub creator_treasury_rate: i64,
    /// Issued index, filled in at admission
    #[serde(default = "nil_nft_index")]
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
    /// Creator nonce
    pub nonce: i64,
    /// Creator signature
    pub sig: Signature,
}

fn nil_nft_index() -> i64 {
    NIL_TX_NFT_INDEX
}

impl MintNftTx {
    /// Digest the creator signs; the issued index is not part of it
    pub fn msg_hash(&self) -> Result<[u8; 32]> {
        let content = parse_content_hash(&self.nft_content_hash)?;
        MsgHasher::new()
            .write_i64(TxType::MintNft.code() as i64)
            .write_i64(self.creator_account_index)
            .write_i64(self.to_account_index)
            .write_digest(&str_field(&self.to_account_name_hash))
            .write_digest(&content)
            .write_i64(self.nft_collection_id)
            .write_i64(self.creator_treasury_rate)
            .write_i64(self.gas_account_index)
            .write_i64(self.gas_fee_asset_id)
            .write_bigint(&self.gas_fee_asset_amount)
            .write_i64(self.expired_at)
            .write_i64(self.nonce)
            .finalize()
    }

    pub(crate) fn requirements(&self) -> Requirements {
        Requirements {
            latest_accounts: vec![self.creator_account_index],
            basic_accounts: vec![self.to_account_index, self.gas_account_index],
            next_nft_index: true,
            locks: vec![
                ResourceKey::Account(self.creator_account_index),
                ResourceKey::NftIndexCounter,
            ],
            ..Requirements::default()
        }
    }

    pub(crate) fn verify(&self, snapshot: &Snapshot, ctx: &VerifyContext) -> Result<PendingTx> {
        check_amount("gas fee", &self.gas_fee_asset_amount)?;
        check_rate("creator treasury rate", self.creator_treasury_rate)?;
        check_gas_account(self.gas_account_index, ctx)?;
        check_expiry(self.expired_at, ctx)?;
        parse_content_hash(&self.nft_content_hash)?;

        let creator = snapshot.account(self.creator_account_index)?;
        check_nonce(creator, self.nonce)?;

        BalanceSheet::default()
            .debit(self.creator_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .credit(self.gas_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .ensure_covered(snapshot)?;

        if self.nft_collection_id == NIL_COLLECTION_ID || self.nft_collection_id > creator.collection_nonce {
            return Err(Error::MalformedInput(format!(
                "collection {} not available to account {} (collection nonce {})",
                self.nft_collection_id, self.creator_account_index, creator.collection_nonce
            )));
        }
        check_name_hash(snapshot.account(self.to_account_index)?, &self.to_account_name_hash)?;

        check_signature(creator, &self.msg_hash()?, &self.sig)?;

        let nft_index = snapshot
            .next_nft_index
            .ok_or_else(|| Error::ResourceNotFound("nft index not issued".into()))?;
        let nft = NftInfo {
            nft_index,
            creator_account_index: self.creator_account_index,
            owner_account_index: self.to_account_index,
            nft_content_hash: self.nft_content_hash.to_lowercase(),
            nft_l1_token_id: NIL_L1_TOKEN_ID.to_string(),
            nft_l1_address: NIL_L1_ADDRESS.to_string(),
            creator_treasury_rate: self.creator_treasury_rate,
            collection_id: self.nft_collection_id,
        };
        let completed = MintNftTx {
            nft_index,
            ..self.clone()
        };

        let mut details = DetailBuilder::new(snapshot);
        details
            .balance(self.creator_account_index, self.gas_fee_asset_id, -self.gas_fee_asset_amount.clone())?
            .balance(self.to_account_index, self.gas_fee_asset_id, BigInt::zero())?
            .nft(&nft)?
            .balance(self.gas_account_index, self.gas_fee_asset_id, self.gas_fee_asset_amount.clone())?;

        Ok(PendingTx {
            nft_index,
            tx_info: serde_json::to_string(&completed)?,
            details: details.finish(),
            companion: Companion::Nft(nft),
            ..pending_header(
                self.creator_account_index,
                self.nonce,
                self.expired_at,
                self.gas_fee_asset_id,
                &self.gas_fee_asset_amount,
            )
        })
    }
}
