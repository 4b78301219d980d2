//! Ledger entity model
//!
//! Accounts, per-asset balances, liquidity pools and NFTs, together with
//! their canonical string form. The canonical form is what a
//! [`MempoolTxDetail`](crate::types::MempoolTxDetail) carries as its delta
//! payload and what [`compute_new_balance`] folds.
//!
//! # Invariants
//!
//! - `balance >= 0` and `lp_amount >= 0` for every stored asset
//! - Offer bitmap bits are only ever set, never cleared
//! - NFT content and creator fields never change after mint

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::{
    NIL_COLLECTION_ID, NIL_L1_ADDRESS, NIL_L1_TOKEN_ID, NIL_NFT_CONTENT_HASH, OFFER_PER_ASSET,
};
use crate::error::{Error, Result};
use crate::types::{bigint_str, AssetType};

/// Consumed-offer bit-set for one account-asset slot
///
/// Offer id `k` lives in slot `k / 128` at bit `k % 128`. An all-zero bitmap
/// inside a delta means "leave the bitmap unchanged".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OfferBitmap(u128);

impl OfferBitmap {
    /// Empty bitmap
    pub const EMPTY: OfferBitmap = OfferBitmap(0);

    /// Wrap raw bits
    pub fn from_bits(bits: u128) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub fn bits(&self) -> u128 {
        self.0
    }

    /// Whether no bit is set
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Whether `bit` is set
    pub fn test(&self, bit: u32) -> bool {
        bit < u128::BITS && self.0 & (1u128 << bit) != 0
    }

    /// Copy with `bit` set
    pub fn set(&self, bit: u32) -> Self {
        if bit >= u128::BITS {
            return *self;
        }
        Self(self.0 | (1u128 << bit))
    }

    /// Split an offer id into `(asset slot, bit index)`
    pub fn locate(offer_id: i64) -> Result<(i64, u32)> {
        if offer_id < 0 {
            return Err(Error::MalformedInput(format!("negative offer id {}", offer_id)));
        }
        Ok((offer_id / OFFER_PER_ASSET, (offer_id % OFFER_PER_ASSET) as u32))
    }
}

impl Serialize for OfferBitmap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for OfferBitmap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<u128>()
            .map(OfferBitmap)
            .map_err(|e| serde::de::Error::custom(format!("invalid offer bitmap {:?}: {}", s, e)))
    }
}

/// Balance of one asset held by one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAsset {
    /// Asset id (or pair index for LP shares, or offer slot)
    pub asset_id: i64,

    /// Spendable balance
    #[serde(with = "bigint_str")]
    pub balance: BigInt,

    /// LP shares when `asset_id` is a pair index
    #[serde(with = "bigint_str")]
    pub lp_amount: BigInt,

    /// Consumed offers of this slot
    pub offer_canceled_or_finalized: OfferBitmap,
}

impl AccountAsset {
    /// Zero balance for `asset_id`
    pub fn zero(asset_id: i64) -> Self {
        Self {
            asset_id,
            balance: BigInt::zero(),
            lp_amount: BigInt::zero(),
            offer_canceled_or_finalized: OfferBitmap::EMPTY,
        }
    }

    /// Delta changing only `balance`
    pub fn balance_delta(asset_id: i64, delta: BigInt) -> Self {
        Self {
            balance: delta,
            ..Self::zero(asset_id)
        }
    }

    /// Delta changing only `lp_amount`
    pub fn lp_delta(asset_id: i64, delta: BigInt) -> Self {
        Self {
            lp_amount: delta,
            ..Self::zero(asset_id)
        }
    }

    /// Delta replacing only the offer bitmap
    pub fn bitmap_delta(asset_id: i64, bitmap: OfferBitmap) -> Self {
        Self {
            offer_canceled_or_finalized: bitmap,
            ..Self::zero(asset_id)
        }
    }

    /// Apply a delta: balances add, a non-empty bitmap replaces
    pub fn apply(&self, delta: &AccountAsset) -> Result<AccountAsset> {
        let balance = &self.balance + &delta.balance;
        let lp_amount = &self.lp_amount + &delta.lp_amount;
        if balance.is_negative() || lp_amount.is_negative() {
            return Err(Error::InvariantViolation(format!(
                "asset {} would go negative: balance {}, lp {}",
                self.asset_id, balance, lp_amount
            )));
        }
        let offer_canceled_or_finalized = if delta.offer_canceled_or_finalized.is_empty() {
            self.offer_canceled_or_finalized
        } else {
            delta.offer_canceled_or_finalized
        };
        Ok(AccountAsset {
            asset_id: self.asset_id,
            balance,
            lp_amount,
            offer_canceled_or_finalized,
        })
    }
}

/// Account registration status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Registered on L1, not yet in a proven block
    Pending,
    /// Included in a proven block
    Confirmed,
}

/// L2 account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account index
    pub account_index: i64,

    /// Registered name
    pub account_name: String,

    /// Verification key (hex)
    pub public_key: String,

    /// Hash of the registered name (hex)
    pub account_name_hash: String,

    /// L1 owner address
    pub l1_address: String,

    /// Next expected nonce
    pub nonce: i64,

    /// Next collection id
    pub collection_nonce: i64,

    /// Balances by asset id
    pub assets: BTreeMap<i64, AccountAsset>,

    /// Asset tree root (hex)
    pub asset_root: String,

    /// Lifecycle status
    pub status: AccountStatus,
}

impl Account {
    /// Asset entry, zero when absent
    pub fn asset(&self, asset_id: i64) -> AccountAsset {
        self.assets
            .get(&asset_id)
            .cloned()
            .unwrap_or_else(|| AccountAsset::zero(asset_id))
    }

    /// Balance of `asset_id`, zero when absent
    pub fn balance(&self, asset_id: i64) -> BigInt {
        self.assets
            .get(&asset_id)
            .map(|a| a.balance.clone())
            .unwrap_or_default()
    }

    /// LP shares of `pair_index`, zero when absent
    pub fn lp_amount(&self, pair_index: i64) -> BigInt {
        self.assets
            .get(&pair_index)
            .map(|a| a.lp_amount.clone())
            .unwrap_or_default()
    }

    /// Offer bitmap of `slot`
    pub fn offer_bitmap(&self, slot: i64) -> OfferBitmap {
        self.assets
            .get(&slot)
            .map(|a| a.offer_canceled_or_finalized)
            .unwrap_or_default()
    }

    /// Fold a General delta into the asset it targets
    pub fn apply_asset_delta(mut self, delta: &AccountAsset) -> Result<Self> {
        let updated = self.asset(delta.asset_id).apply(delta)?;
        self.assets.insert(delta.asset_id, updated);
        Ok(self)
    }
}

/// Constant-product pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityInfo {
    /// Pair index
    pub pair_index: i64,

    /// First asset of the pair
    pub asset_a_id: i64,

    /// Reserve of asset A
    #[serde(with = "bigint_str")]
    pub asset_a: BigInt,

    /// Second asset of the pair
    pub asset_b_id: i64,

    /// Reserve of asset B
    #[serde(with = "bigint_str")]
    pub asset_b: BigInt,

    /// Outstanding LP shares
    #[serde(with = "bigint_str")]
    pub lp_amount: BigInt,

    /// Reserve product at the last fee accrual
    #[serde(with = "bigint_str")]
    pub k_last: BigInt,

    /// Swap fee in basis points
    pub fee_rate: i64,

    /// Treasury account receiving protocol LP
    pub treasury_account_index: i64,

    /// Treasury share of the fee in basis points
    pub treasury_rate: i64,
}

impl LiquidityInfo {
    /// Apply a pool delta
    ///
    /// Reserves and LP add; `k_last` is replaced only by a non-zero value;
    /// fee rate and treasury fields are always overwritten.
    pub fn apply(&self, delta: &LiquidityInfo) -> Result<LiquidityInfo> {
        let asset_a = &self.asset_a + &delta.asset_a;
        let asset_b = &self.asset_b + &delta.asset_b;
        let lp_amount = &self.lp_amount + &delta.lp_amount;
        if asset_a.is_negative() || asset_b.is_negative() || lp_amount.is_negative() {
            return Err(Error::InvariantViolation(format!(
                "pool {} would go negative: A {}, B {}, lp {}",
                self.pair_index, asset_a, asset_b, lp_amount
            )));
        }
        let k_last = if delta.k_last.is_zero() {
            self.k_last.clone()
        } else {
            delta.k_last.clone()
        };
        Ok(LiquidityInfo {
            pair_index: self.pair_index,
            asset_a_id: delta.asset_a_id,
            asset_a,
            asset_b_id: delta.asset_b_id,
            asset_b,
            lp_amount,
            k_last,
            fee_rate: delta.fee_rate,
            treasury_account_index: delta.treasury_account_index,
            treasury_rate: delta.treasury_rate,
        })
    }

    /// Whether the pair is `(x, y)` in either orientation
    pub fn matches_pair(&self, x: i64, y: i64) -> bool {
        (self.asset_a_id == x && self.asset_b_id == y) || (self.asset_a_id == y && self.asset_b_id == x)
    }
}

/// L2 NFT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftInfo {
    /// Unique NFT index
    pub nft_index: i64,
    /// Minting account
    pub creator_account_index: i64,
    /// Current owner
    pub owner_account_index: i64,
    /// Content digest (hex)
    pub nft_content_hash: String,
    /// L1 token id when bridged
    pub nft_l1_token_id: String,
    /// L1 contract when bridged
    pub nft_l1_address: String,
    /// Creator royalty in basis points
    pub creator_treasury_rate: i64,
    /// Owning collection
    pub collection_id: i64,
}

impl NftInfo {
    /// Canonical empty record, used when an NFT leaves L2
    pub fn empty(nft_index: i64) -> Self {
        Self {
            nft_index,
            creator_account_index: 0,
            owner_account_index: 0,
            nft_content_hash: NIL_NFT_CONTENT_HASH.to_string(),
            nft_l1_token_id: NIL_L1_TOKEN_ID.to_string(),
            nft_l1_address: NIL_L1_ADDRESS.to_string(),
            creator_treasury_rate: 0,
            collection_id: NIL_COLLECTION_ID,
        }
    }

    /// Whether this is the empty record
    pub fn is_empty(&self) -> bool {
        self.nft_content_hash == NIL_NFT_CONTENT_HASH
    }

    /// Copy owned by `owner`
    pub fn with_owner(&self, owner: i64) -> Self {
        Self {
            owner_account_index: owner,
            ..self.clone()
        }
    }
}

/// Canonical string form of an entity
pub fn serialize_entity<T: Serialize>(entity: &T) -> Result<String> {
    Ok(serde_json::to_string(entity)?)
}

/// Parse the canonical string form of an entity
pub fn parse_entity<T: DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_str(s).map_err(|e| Error::MalformedSnapshot(format!("{}: {:?}", e, s)))
}

fn parse_nonce(s: &str) -> Result<i64> {
    s.trim()
        .parse::<i64>()
        .map_err(|e| Error::MalformedSnapshot(format!("invalid collection nonce {:?}: {}", s, e)))
}

/// Apply a serialized delta to a serialized snapshot
///
/// General folds an [`AccountAsset`], Liquidity folds a [`LiquidityInfo`],
/// Nft and CollectionNonce replace the snapshot with the delta.
pub fn compute_new_balance(asset_type: AssetType, current: &str, delta: &str) -> Result<String> {
    match asset_type {
        AssetType::General => {
            let current: AccountAsset = parse_entity(current)?;
            let delta: AccountAsset = parse_entity(delta)?;
            serialize_entity(&current.apply(&delta)?)
        }
        AssetType::Liquidity => {
            let current: LiquidityInfo = parse_entity(current)?;
            let delta: LiquidityInfo = parse_entity(delta)?;
            serialize_entity(&current.apply(&delta)?)
        }
        AssetType::Nft => {
            let _: NftInfo = parse_entity(current)?;
            let delta: NftInfo = parse_entity(delta)?;
            serialize_entity(&delta)
        }
        AssetType::CollectionNonce => {
            parse_nonce(current)?;
            Ok(parse_nonce(delta)?.to_string())
        }
    }
}
