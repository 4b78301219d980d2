//! Shared fixtures for integration tests

#![allow(dead_code)]

use num_bigint::BigInt;
use rollup_mempool::config::Config;
use rollup_mempool::crypto::{digest_field, KeyPair};
use rollup_mempool::entity::{AccountStatus, LiquidityInfo, NftInfo};
use rollup_mempool::{Account, AccountAsset, LedgerStore, Mempool, MemoryStore, Signature};
use std::collections::BTreeMap;
use std::sync::Arc;

/// System gas account in every fixture
pub const GAS_ACCOUNT: i64 = 1;

/// Pool treasury account in every fixture
pub const TREASURY_ACCOUNT: i64 = 0;

/// Expiry far in the future
pub const NEVER: i64 = i64::MAX;

pub fn keypair(account_index: i64) -> KeyPair {
    KeyPair::from_seed(&[account_index as u8 + 1; 32])
}

pub fn name_hash(account_index: i64) -> String {
    hex::encode(digest_field(format!("user{}.legend", account_index).as_bytes()))
}

pub fn sign(account_index: i64, msg_hash: &[u8; 32]) -> Signature {
    keypair(account_index).sign(msg_hash)
}

pub fn account(account_index: i64, balances: &[(i64, i64)]) -> Account {
    let assets: BTreeMap<i64, AccountAsset> = balances
        .iter()
        .map(|(asset_id, balance)| (*asset_id, AccountAsset::balance_delta(*asset_id, BigInt::from(*balance))))
        .collect();
    Account {
        account_index,
        account_name: format!("user{}.legend", account_index),
        public_key: keypair(account_index).public_key_hex(),
        account_name_hash: name_hash(account_index),
        l1_address: format!("0x{:040x}", account_index),
        nonce: 0,
        collection_nonce: 1,
        assets,
        asset_root: String::new(),
        status: AccountStatus::Confirmed,
    }
}

pub fn pool(pair_index: i64, reserve_a: i64, reserve_b: i64, lp: i64) -> LiquidityInfo {
    LiquidityInfo {
        pair_index,
        asset_a_id: 0,
        asset_a: BigInt::from(reserve_a),
        asset_b_id: 1,
        asset_b: BigInt::from(reserve_b),
        lp_amount: BigInt::from(lp),
        k_last: BigInt::from(reserve_a) * BigInt::from(reserve_b),
        fee_rate: 30,
        treasury_account_index: TREASURY_ACCOUNT,
        treasury_rate: 5,
    }
}

pub fn nft(nft_index: i64, creator: i64, owner: i64) -> NftInfo {
    NftInfo {
        nft_index,
        creator_account_index: creator,
        owner_account_index: owner,
        nft_content_hash: "ab".repeat(32),
        nft_l1_token_id: "0".into(),
        nft_l1_address: "0".into(),
        creator_treasury_rate: 100,
        collection_id: 1,
    }
}

/// Store holding the gas and treasury accounts plus `accounts`
pub fn seeded_store(accounts: Vec<Account>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.put_account(&account(GAS_ACCOUNT, &[])).unwrap();
    store.put_account(&account(TREASURY_ACCOUNT, &[])).unwrap();
    for a in &accounts {
        store.put_account(a).unwrap();
    }
    store
}

pub fn mempool(store: Arc<MemoryStore>) -> Mempool {
    let mut config = Config::default();
    config.gas_account_index = GAS_ACCOUNT;
    Mempool::with_store(config, store).unwrap()
}
