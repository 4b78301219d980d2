//! Transaction verification engine
//!
//! Every L2 transaction type is one variant of [`Transaction`]. Admission
//! runs the same pipeline for all of them:
//!
//! 1. [`Transaction::parse`] decodes the raw payload for the declared type
//! 2. [`Transaction::requirements`] names the state to load and the locks to hold
//! 3. the caller resolves that state into an immutable [`Snapshot`]
//! 4. [`Transaction::verify`] checks the transaction against the snapshot and
//!    returns the ordered detail records, or the typed error of the first
//!    failed check
//!
//! Validators never mutate state. They only describe deltas; the overlay
//! resolver applies them when later transactions read the same keys.

mod add_liquidity;
mod atomic_match;
mod cancel_offer;
mod common;
mod create_collection;
mod mint_nft;
mod offer;
mod remove_liquidity;
mod swap;
mod transfer;
mod transfer_nft;
mod withdraw;
mod withdraw_nft;

pub use add_liquidity::AddLiquidityTx;
pub use atomic_match::AtomicMatchTx;
pub use cancel_offer::CancelOfferTx;
pub use create_collection::CreateCollectionTx;
pub use mint_nft::MintNftTx;
pub use offer::OfferTx;
pub use remove_liquidity::RemoveLiquidityTx;
pub use swap::SwapTx;
pub use transfer::TransferTx;
pub use transfer_nft::TransferNftTx;
pub use withdraw::WithdrawTx;
pub use withdraw_nft::WithdrawNftTx;

use num_bigint::BigInt;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

use crate::constants::{NIL_ASSET_ID, NIL_PAIR_INDEX, NIL_TX_NFT_INDEX};
use crate::entity::{Account, LiquidityInfo, NftInfo};
use crate::error::{Error, Result};
use crate::lock::ResourceKey;
use crate::storage::Companion;
use crate::types::{MempoolTxDetail, OfferRecord, TxType};

/// Ambient inputs of a verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyContext {
    /// System gas-fee recipient
    pub gas_account_index: i64,
    /// Current time (unix milliseconds)
    pub now_ms: i64,
}

/// State a transaction needs before it can be verified
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    /// Accounts the transaction debits or whose nonce/bitmap it consumes
    pub latest_accounts: Vec<i64>,
    /// Accounts only credited or named; durable snapshot is enough
    pub basic_accounts: Vec<i64>,
    /// Pool read for write
    pub liquidity: Option<i64>,
    /// NFT read for write
    pub nft: Option<i64>,
    /// Also load the pool's treasury account (basic)
    pub pool_treasury: bool,
    /// Also load the NFT creator's account (basic)
    pub nft_creator: bool,
    /// Issue the next NFT index
    pub next_nft_index: bool,
    /// Issue the next offer id of this account
    pub next_offer_id: Option<i64>,
    /// Locks held from state load until admission completes
    pub locks: Vec<ResourceKey>,
}

/// Immutable state handed to a validator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Loaded accounts by index
    pub accounts: BTreeMap<i64, Account>,
    /// Loaded pool
    pub liquidity: Option<LiquidityInfo>,
    /// Loaded NFT
    pub nft: Option<NftInfo>,
    /// Issued NFT index
    pub next_nft_index: Option<i64>,
    /// Issued offer id
    pub next_offer_id: Option<i64>,
}

impl Snapshot {
    /// Loaded account
    pub fn account(&self, account_index: i64) -> Result<&Account> {
        self.accounts
            .get(&account_index)
            .ok_or_else(|| Error::ResourceNotFound(format!("account {}", account_index)))
    }

    /// Loaded pool
    pub fn liquidity(&self) -> Result<&LiquidityInfo> {
        self.liquidity
            .as_ref()
            .ok_or_else(|| Error::ResourceNotFound("liquidity not loaded".into()))
    }

    /// Loaded NFT
    pub fn nft(&self) -> Result<&NftInfo> {
        self.nft
            .as_ref()
            .ok_or_else(|| Error::ResourceNotFound("nft not loaded".into()))
    }
}

/// Verified transaction bound for the mempool
#[derive(Debug, Clone)]
pub struct PendingTx {
    /// Gas fee asset
    pub gas_fee_asset_id: i64,
    /// Gas fee amount
    pub gas_fee: BigInt,
    /// Touched NFT or `NIL_TX_NFT_INDEX`
    pub nft_index: i64,
    /// Touched pool or `NIL_PAIR_INDEX`
    pub pair_index: i64,
    /// Main asset or `NIL_ASSET_ID`
    pub asset_id: i64,
    /// Main amount
    pub tx_amount: BigInt,
    /// L1 destination for withdrawals
    pub native_address: String,
    /// Submitter memo
    pub memo: String,
    /// Submitting account
    pub account_index: i64,
    /// Consumed nonce
    pub nonce: i64,
    /// Expiry (unix milliseconds)
    pub expired_at: i64,
    /// Payload with server-completed fields filled in
    pub tx_info: String,
    /// Ordered detail records
    pub details: Vec<MempoolTxDetail>,
    /// Row written together with the mempool record
    pub companion: Companion,
}

/// Outcome of a successful verification
#[derive(Debug, Clone)]
pub enum Verified {
    /// Admit into the mempool
    Pending(PendingTx),
    /// Store a marketplace offer
    Offer(OfferRecord),
}

/// Fields copied into a failure record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailFields {
    /// Gas fee asset
    pub gas_fee_asset_id: i64,
    /// Gas fee amount
    pub gas_fee: BigInt,
    /// First asset touched
    pub asset_a_id: i64,
    /// Second asset touched
    pub asset_b_id: i64,
    /// Main amount
    pub tx_amount: BigInt,
    /// L1 destination
    pub native_address: String,
}

impl Default for FailFields {
    fn default() -> Self {
        Self {
            gas_fee_asset_id: NIL_ASSET_ID,
            gas_fee: BigInt::default(),
            asset_a_id: NIL_ASSET_ID,
            asset_b_id: NIL_ASSET_ID,
            tx_amount: BigInt::default(),
            native_address: String::new(),
        }
    }
}

/// Parsed L2 transaction
#[derive(Debug, Clone)]
pub enum Transaction {
    /// Asset transfer between accounts
    Transfer(TransferTx),
    /// AMM swap
    Swap(SwapTx),
    /// Liquidity deposit
    AddLiquidity(AddLiquidityTx),
    /// Liquidity withdrawal
    RemoveLiquidity(RemoveLiquidityTx),
    /// Asset withdrawal to L1
    Withdraw(WithdrawTx),
    /// NFT collection creation
    CreateCollection(CreateCollectionTx),
    /// NFT mint
    MintNft(MintNftTx),
    /// NFT transfer
    TransferNft(TransferNftTx),
    /// Marketplace trade
    AtomicMatch(AtomicMatchTx),
    /// Offer cancellation
    CancelOffer(CancelOfferTx),
    /// NFT withdrawal to L1
    WithdrawNft(WithdrawNftTx),
    /// Marketplace offer listing
    Offer(OfferTx),
}

fn decode<T: DeserializeOwned>(tx_type: TxType, raw: &[u8]) -> Result<T> {
    serde_json::from_slice(raw)
        .map_err(|e| Error::MalformedInput(format!("invalid {} payload: {}", tx_type, e)))
}

impl Transaction {
    /// Decode a raw payload of the declared type
    pub fn parse(tx_type: TxType, raw: &[u8]) -> Result<Self> {
        Ok(match tx_type {
            TxType::Transfer => Transaction::Transfer(decode(tx_type, raw)?),
            TxType::Swap => Transaction::Swap(decode(tx_type, raw)?),
            TxType::AddLiquidity => Transaction::AddLiquidity(decode(tx_type, raw)?),
            TxType::RemoveLiquidity => Transaction::RemoveLiquidity(decode(tx_type, raw)?),
            TxType::Withdraw => Transaction::Withdraw(decode(tx_type, raw)?),
            TxType::CreateCollection => Transaction::CreateCollection(decode(tx_type, raw)?),
            TxType::MintNft => Transaction::MintNft(decode(tx_type, raw)?),
            TxType::TransferNft => Transaction::TransferNft(decode(tx_type, raw)?),
            TxType::AtomicMatch => Transaction::AtomicMatch(decode(tx_type, raw)?),
            TxType::CancelOffer => Transaction::CancelOffer(decode(tx_type, raw)?),
            TxType::WithdrawNft => Transaction::WithdrawNft(decode(tx_type, raw)?),
            TxType::Offer => Transaction::Offer(decode(tx_type, raw)?),
        })
    }

    /// Declared type
    pub fn tx_type(&self) -> TxType {
        match self {
            Transaction::Transfer(_) => TxType::Transfer,
            Transaction::Swap(_) => TxType::Swap,
            Transaction::AddLiquidity(_) => TxType::AddLiquidity,
            Transaction::RemoveLiquidity(_) => TxType::RemoveLiquidity,
            Transaction::Withdraw(_) => TxType::Withdraw,
            Transaction::CreateCollection(_) => TxType::CreateCollection,
            Transaction::MintNft(_) => TxType::MintNft,
            Transaction::TransferNft(_) => TxType::TransferNft,
            Transaction::AtomicMatch(_) => TxType::AtomicMatch,
            Transaction::CancelOffer(_) => TxType::CancelOffer,
            Transaction::WithdrawNft(_) => TxType::WithdrawNft,
            Transaction::Offer(_) => TxType::Offer,
        }
    }

    /// Submitting account
    pub fn account_index(&self) -> i64 {
        match self {
            Transaction::Transfer(tx) => tx.from_account_index,
            Transaction::Swap(tx) => tx.from_account_index,
            Transaction::AddLiquidity(tx) => tx.from_account_index,
            Transaction::RemoveLiquidity(tx) => tx.from_account_index,
            Transaction::Withdraw(tx) => tx.from_account_index,
            Transaction::CreateCollection(tx) => tx.account_index,
            Transaction::MintNft(tx) => tx.creator_account_index,
            Transaction::TransferNft(tx) => tx.from_account_index,
            Transaction::AtomicMatch(tx) => tx.account_index,
            Transaction::CancelOffer(tx) => tx.account_index,
            Transaction::WithdrawNft(tx) => tx.account_index,
            Transaction::Offer(tx) => tx.account_index,
        }
    }

    /// State to load and locks to hold
    pub fn requirements(&self) -> Requirements {
        match self {
            Transaction::Transfer(tx) => tx.requirements(),
            Transaction::Swap(tx) => tx.requirements(),
            Transaction::AddLiquidity(tx) => tx.requirements(),
            Transaction::RemoveLiquidity(tx) => tx.requirements(),
            Transaction::Withdraw(tx) => tx.requirements(),
            Transaction::CreateCollection(tx) => tx.requirements(),
            Transaction::MintNft(tx) => tx.requirements(),
            Transaction::TransferNft(tx) => tx.requirements(),
            Transaction::AtomicMatch(tx) => tx.requirements(),
            Transaction::CancelOffer(tx) => tx.requirements(),
            Transaction::WithdrawNft(tx) => tx.requirements(),
            Transaction::Offer(tx) => tx.requirements(),
        }
    }

    /// Run every check and build the outcome
    pub fn verify(&self, snapshot: &Snapshot, ctx: &VerifyContext) -> Result<Verified> {
        match self {
            Transaction::Transfer(tx) => tx.verify(snapshot, ctx).map(Verified::Pending),
            Transaction::Swap(tx) => tx.verify(snapshot, ctx).map(Verified::Pending),
            Transaction::AddLiquidity(tx) => tx.verify(snapshot, ctx).map(Verified::Pending),
            Transaction::RemoveLiquidity(tx) => tx.verify(snapshot, ctx).map(Verified::Pending),
            Transaction::Withdraw(tx) => tx.verify(snapshot, ctx).map(Verified::Pending),
            Transaction::CreateCollection(tx) => tx.verify(snapshot, ctx).map(Verified::Pending),
            Transaction::MintNft(tx) => tx.verify(snapshot, ctx).map(Verified::Pending),
            Transaction::TransferNft(tx) => tx.verify(snapshot, ctx).map(Verified::Pending),
            Transaction::AtomicMatch(tx) => tx.verify(snapshot, ctx).map(Verified::Pending),
            Transaction::CancelOffer(tx) => tx.verify(snapshot, ctx).map(Verified::Pending),
            Transaction::WithdrawNft(tx) => tx.verify(snapshot, ctx).map(Verified::Pending),
            Transaction::Offer(tx) => tx.verify(snapshot, ctx).map(Verified::Offer),
        }
    }

    /// Fields recorded when the transaction is rejected
    pub fn fail_fields(&self) -> FailFields {
        let gas = |asset: i64, fee: &BigInt| FailFields {
            gas_fee_asset_id: asset,
            gas_fee: fee.clone(),
            ..FailFields::default()
        };
        match self {
            Transaction::Transfer(tx) => FailFields {
                asset_a_id: tx.asset_id,
                tx_amount: tx.asset_amount.clone(),
                ..gas(tx.gas_fee_asset_id, &tx.gas_fee_asset_amount)
            },
            Transaction::Swap(tx) => FailFields {
                asset_a_id: tx.asset_a_id,
                asset_b_id: tx.asset_b_id,
                tx_amount: tx.asset_a_amount.clone(),
                ..gas(tx.gas_fee_asset_id, &tx.gas_fee_asset_amount)
            },
            Transaction::AddLiquidity(tx) => FailFields {
                asset_a_id: tx.asset_a_id,
                asset_b_id: tx.asset_b_id,
                tx_amount: tx.asset_a_amount.clone(),
                ..gas(tx.gas_fee_asset_id, &tx.gas_fee_asset_amount)
            },
            Transaction::RemoveLiquidity(tx) => FailFields {
                asset_a_id: tx.asset_a_id,
                asset_b_id: tx.asset_b_id,
                tx_amount: tx.lp_amount.clone(),
                ..gas(tx.gas_fee_asset_id, &tx.gas_fee_asset_amount)
            },
            Transaction::Withdraw(tx) => FailFields {
                asset_a_id: tx.asset_id,
                tx_amount: tx.asset_amount.clone(),
                native_address: tx.to_address.clone(),
                ..gas(tx.gas_fee_asset_id, &tx.gas_fee_asset_amount)
            },
            Transaction::CreateCollection(tx) => gas(tx.gas_fee_asset_id, &tx.gas_fee_asset_amount),
            Transaction::MintNft(tx) => gas(tx.gas_fee_asset_id, &tx.gas_fee_asset_amount),
            Transaction::TransferNft(tx) => gas(tx.gas_fee_asset_id, &tx.gas_fee_asset_amount),
            Transaction::AtomicMatch(tx) => FailFields {
                asset_a_id: tx.buy_offer.asset_id,
                tx_amount: tx.buy_offer.asset_amount.clone(),
                ..gas(tx.gas_fee_asset_id, &tx.gas_fee_asset_amount)
            },
            Transaction::CancelOffer(tx) => gas(tx.gas_fee_asset_id, &tx.gas_fee_asset_amount),
            Transaction::WithdrawNft(tx) => FailFields {
                native_address: tx.to_address.clone(),
                ..gas(tx.gas_fee_asset_id, &tx.gas_fee_asset_amount)
            },
            Transaction::Offer(tx) => FailFields {
                asset_a_id: tx.asset_id,
                tx_amount: tx.asset_amount.clone(),
                ..FailFields::default()
            },
        }
    }
}

/// Header shared by every pending transaction; type modules fill the rest
pub(crate) fn pending_header(
    account_index: i64,
    nonce: i64,
    expired_at: i64,
    gas_fee_asset_id: i64,
    gas_fee: &BigInt,
) -> PendingTx {
    PendingTx {
        gas_fee_asset_id,
        gas_fee: gas_fee.clone(),
        nft_index: NIL_TX_NFT_INDEX,
        pair_index: NIL_PAIR_INDEX,
        asset_id: NIL_ASSET_ID,
        tx_amount: BigInt::default(),
        native_address: String::new(),
        memo: String::new(),
        account_index,
        nonce,
        expired_at,
        tx_info: String::new(),
        details: Vec::new(),
        companion: Companion::None,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    pub(crate) use super::common::fixtures::*;
    pub(crate) use super::offer::tests::signed_offer;
    pub(crate) use super::transfer::tests::signed_transfer;
    pub(crate) use super::transfer_nft::tests::owned_nft;
}
