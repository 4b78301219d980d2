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
use crate::storage::Companion;
use crate::types::{bigint_str, Collection, Signature, TxType};

/// NFT collection creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCollectionTx {
    /// Creator
    pub account_index: i64,
    /// New collection id, the creator's current collection nonce
    pub collection_id: i64,
    /// Display name
    pub name: String,
    /// Introduction
    #[serde(default)]
    pub introduction: String,
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

impl CreateCollectionTx {
    /// Digest the creator signs
    pub fn msg_hash(&self) -> Result<[u8; 32]> {
        MsgHasher::new()
            .write_i64(TxType::CreateCollection.code() as i64)
            .write_i64(self.account_index)
            .write_i64(self.collection_id)
            .write_digest(&str_field(&self.name))
            .write_digest(&str_field(&self.introduction))
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
        if self.name.trim().is_empty() {
            return Err(Error::MalformedInput("empty collection name".into()));
        }

        let creator = snapshot.account(self.account_index)?;
        check_nonce(creator, self.nonce)?;

        BalanceSheet::default()
            .debit(self.account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .credit(self.gas_account_index, self.gas_fee_asset_id, &self.gas_fee_asset_amount)
            .ensure_covered(snapshot)?;

        if self.collection_id != creator.collection_nonce {
            return Err(Error::MalformedInput(format!(
                "collection id {} is not the next id {} of account {}",
                self.collection_id, creator.collection_nonce, self.account_index
            )));
        }

        check_signature(creator, &self.msg_hash()?, &self.sig)?;

        let mut details = DetailBuilder::new(snapshot);
        details
            .collection_nonce(self.account_index, self.collection_id)?
            .balance(self.account_index, self.gas_fee_asset_id, -self.gas_fee_asset_amount.clone())?
            .balance(self.gas_account_index, self.gas_fee_asset_id, self.gas_fee_asset_amount.clone())?;

        Ok(PendingTx {
            tx_info: serde_json::to_string(self)?,
            details: details.finish(),
            companion: Companion::Collection(Collection {
                collection_id: self.collection_id,
                account_index: self.account_index,
                name: self.name.clone(),
                introduction: self.introduction.clone(),
            }),
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
