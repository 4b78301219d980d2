//! Core types for transaction admission
//!
//! All records are designed for:
//! - Deterministic serialization (bincode for storage, JSON for payloads)
//! - Exact arithmetic (arbitrary-precision integers, decimal-string encoded)
//! - A fixed wire shape shared with the proving pipeline

use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::NIL_BLOCK_HEIGHT;

/// Serde adapter encoding [`BigInt`] as a base-10 string
pub mod bigint_str {
    use num_bigint::BigInt;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    /// Serialize as decimal string
    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    /// Deserialize from decimal string
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<BigInt>()
            .map_err(|e| D::Error::custom(format!("invalid integer {:?}: {}", s, e)))
    }
}

/// Transaction type codes understood by the admission core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxType {
    /// L2 transfer between accounts
    Transfer = 6,
    /// AMM swap
    Swap = 7,
    /// Provide liquidity to a pool
    AddLiquidity = 8,
    /// Burn LP shares for reserves
    RemoveLiquidity = 9,
    /// Withdraw an asset to L1
    Withdraw = 10,
    /// Create an NFT collection
    CreateCollection = 11,
    /// Mint an NFT
    MintNft = 12,
    /// Transfer an NFT
    TransferNft = 13,
    /// Match a buy offer with a sell offer
    AtomicMatch = 14,
    /// Cancel a marketplace offer
    CancelOffer = 15,
    /// Withdraw an NFT to L1
    WithdrawNft = 16,
    /// Signed marketplace offer (stored, not a mempool transaction)
    Offer = 19,
}

impl TxType {
    /// Numeric code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Parse from numeric code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            6 => Some(TxType::Transfer),
            7 => Some(TxType::Swap),
            8 => Some(TxType::AddLiquidity),
            9 => Some(TxType::RemoveLiquidity),
            10 => Some(TxType::Withdraw),
            11 => Some(TxType::CreateCollection),
            12 => Some(TxType::MintNft),
            13 => Some(TxType::TransferNft),
            14 => Some(TxType::AtomicMatch),
            15 => Some(TxType::CancelOffer),
            16 => Some(TxType::WithdrawNft),
            19 => Some(TxType::Offer),
            _ => None,
        }
    }

    /// Name used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            TxType::Transfer => "transfer",
            TxType::Swap => "swap",
            TxType::AddLiquidity => "add_liquidity",
            TxType::RemoveLiquidity => "remove_liquidity",
            TxType::Withdraw => "withdraw",
            TxType::CreateCollection => "create_collection",
            TxType::MintNft => "mint_nft",
            TxType::TransferNft => "transfer_nft",
            TxType::AtomicMatch => "atomic_match",
            TxType::CancelOffer => "cancel_offer",
            TxType::WithdrawNft => "withdraw_nft",
            TxType::Offer => "offer",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Kind of entity a detail record changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum AssetType {
    /// Fungible asset balance of an account (also LP shares and offer slots)
    General = 1,
    /// Pool reserves
    Liquidity = 2,
    /// NFT ownership record
    Nft = 3,
    /// Account's next collection id
    CollectionNonce = 4,
}

impl AssetType {
    /// Numeric code
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Lifecycle of a mempool transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxStatus {
    /// Admitted, waiting for a block
    Pending = 0,
    /// Dropped after its expiry
    Expired = 1,
    /// Included in a proven block
    Included = 2,
    /// Rejected during admission or execution
    Failed = 3,
}

/// Ed25519 signature, hex encoded on the wire
#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    bytes: [u8; 64],
}

impl Signature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self { bytes }
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }

    /// Parse from hex
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let mut bytes = [0u8; 64];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| crate::Error::MalformedInput(format!("invalid signature hex: {}", e)))?;
        Ok(Self { bytes })
    }

    /// Hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self { bytes: [0u8; 64] }
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Signature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// One entity's delta within an admitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MempoolTxDetail {
    /// Asset id, pair index or NFT index depending on `asset_type`
    pub asset_id: i64,

    /// Entity kind
    pub asset_type: AssetType,

    /// Touched account, or `NIL_ACCOUNT_INDEX` for pool/NFT records
    pub account_index: i64,

    /// Touched account's name
    pub account_name: String,

    /// Canonical serialized delta of the entity
    pub balance_delta: String,

    /// Position within the transaction
    pub order: i64,

    /// Position among distinct accounts touched
    pub account_order: i64,
}

/// Transaction admitted into the pending pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolTx {
    /// Canonical transaction hash (hex)
    pub tx_hash: String,

    /// Transaction type
    pub tx_type: TxType,

    /// Gas fee asset
    pub gas_fee_asset_id: i64,

    /// Gas fee amount
    #[serde(with = "bigint_str")]
    pub gas_fee: BigInt,

    /// Touched NFT or `NIL_TX_NFT_INDEX`
    pub nft_index: i64,

    /// Touched pool or `NIL_PAIR_INDEX`
    pub pair_index: i64,

    /// Main asset or `NIL_ASSET_ID`
    pub asset_id: i64,

    /// Main amount
    #[serde(with = "bigint_str")]
    pub tx_amount: BigInt,

    /// L1 destination for withdrawals
    pub native_address: String,

    /// Raw serialized transaction payload, with server-completed fields
    pub tx_info: String,

    /// Free-form extra information
    pub extra_info: String,

    /// Submitter memo
    pub memo: String,

    /// Submitting account
    pub account_index: i64,

    /// Consumed nonce or `NIL_NONCE`
    pub nonce: i64,

    /// Expiry (unix milliseconds)
    pub expired_at: i64,

    /// Block height, `NIL_BLOCK_HEIGHT` until included
    pub l2_block_height: i64,

    /// Lifecycle status
    pub status: TxStatus,

    /// Ordered detail records
    pub details: Vec<MempoolTxDetail>,

    /// Admission timestamp
    pub created_at: DateTime<Utc>,
}

impl MempoolTx {
    /// Whether the record still awaits a block
    pub fn is_pending(&self) -> bool {
        self.status == TxStatus::Pending && self.l2_block_height == NIL_BLOCK_HEIGHT
    }

    /// Whether any detail or the submitter touches the account
    pub fn touches_account(&self, account_index: i64) -> bool {
        self.account_index == account_index
            || self.details.iter().any(|d| d.account_index == account_index)
    }
}

/// Audit record of a rejected submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTransaction {
    /// Random id (uuid v4)
    pub tx_hash: String,

    /// Transaction type code as submitted
    pub tx_type: u8,

    /// Gas fee asset, `NIL_ASSET_ID` if the payload did not parse
    pub gas_fee_asset_id: i64,

    /// Gas fee amount
    pub gas_fee: String,

    /// First asset touched
    pub asset_a_id: i64,

    /// Second asset touched
    pub asset_b_id: i64,

    /// Main amount
    pub tx_amount: String,

    /// L1 destination for withdrawals
    pub native_address: String,

    /// Raw payload as submitted
    pub tx_info: String,

    /// Diagnostic message of the triggering error
    pub extra_info: String,

    /// Always [`TxStatus::Failed`]
    pub status: TxStatus,

    /// Rejection timestamp
    pub created_at: DateTime<Utc>,
}

/// Stored marketplace offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRecord {
    /// Buy or sell
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
    pub asset_amount: String,
    /// Listing time (unix milliseconds)
    pub listed_at: i64,
    /// Expiry (unix milliseconds)
    pub expired_at: i64,
    /// Treasury rate in basis points
    pub treasury_rate: i64,
    /// Signature (hex)
    pub sig: String,
}

/// Stored NFT collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Collection id, unique per account
    pub collection_id: i64,
    /// Creator
    pub account_index: i64,
    /// Display name
    pub name: String,
    /// Introduction
    pub introduction: String,
}
