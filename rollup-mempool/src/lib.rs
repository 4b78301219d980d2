//! Rollup Mempool
//!
//! Transaction admission core of a ZK-rollup L2: verifies signed L2
//! transactions against the latest state (durable snapshot plus every pending
//! mempool delta) and admits them into the pending pool.
//!
//! # Architecture
//!
//! - **Overlay resolution**: latest state is folded from the durable store and
//!   pending deltas, cached per key with epoch-checked fills
//! - **Resource locks**: every submission takes its account, pool, NFT and
//!   counter locks at once, in one global order
//! - **Pure validators**: one per transaction type, emitting ordered detail
//!   records in the layout the proving circuit expects
//! - **Atomic admission**: mempool row and companion row in one write batch
//!
//! # Invariants
//!
//! - Balances and LP shares never go negative in any overlaid view
//! - An account's nonces are consumed strictly in sequence
//! - An offer bit, once set, is never cleared or reused
//! - A pool's reserve product never decreases through a swap

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod amm;
pub mod cache;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod entity;
pub mod error;
pub mod lock;
pub mod mempool;
pub mod metrics;
pub mod overlay;
pub mod service;
pub mod storage;
pub mod tx;
pub mod types;

// Re-exports
pub use config::Config;
pub use entity::{Account, AccountAsset, LiquidityInfo, NftInfo, OfferBitmap};
pub use error::{Error, Result};
pub use service::Mempool;
pub use storage::{LedgerStore, MemoryStore, RocksStore};
pub use tx::Transaction;
pub use types::{AssetType, FailedTransaction, MempoolTx, MempoolTxDetail, Signature, TxType};
