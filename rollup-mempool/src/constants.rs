//! Protocol constants and sentinel values shared with the proving circuit

/// Denominator for fee and treasury rates (basis points)
pub const RATE_BASE: i64 = 10_000;

/// Number of offer ids tracked by one account-asset bitmap slot
pub const OFFER_PER_ASSET: i64 = 128;

/// Offer side: buyer
pub const BUY_OFFER_TYPE: i64 = 0;
/// Offer side: seller
pub const SELL_OFFER_TYPE: i64 = 1;

/// No account (pool-only or NFT-only details)
pub const NIL_ACCOUNT_INDEX: i64 = -1;
/// No account order
pub const NIL_ACCOUNT_ORDER: i64 = -1;
/// No account name
pub const NIL_ACCOUNT_NAME: &str = "";
/// No asset id
pub const NIL_ASSET_ID: i64 = -1;
/// No nonce (transaction does not consume one)
pub const NIL_NONCE: i64 = -1;
/// No NFT index
pub const NIL_TX_NFT_INDEX: i64 = -1;
/// No pair index
pub const NIL_PAIR_INDEX: i64 = -1;
/// Mempool transaction not yet included in a block
pub const NIL_BLOCK_HEIGHT: i64 = -1;
/// No collection
pub const NIL_COLLECTION_ID: i64 = 0;
/// NFT not bridged from L1
pub const NIL_L1_TOKEN_ID: &str = "0";
/// NFT not bridged from L1
pub const NIL_L1_ADDRESS: &str = "0";
/// Content hash of the empty NFT
pub const NIL_NFT_CONTENT_HASH: &str = "0";

/// Length of an NFT content hash in bytes
pub const NFT_CONTENT_HASH_LEN: usize = 32;
