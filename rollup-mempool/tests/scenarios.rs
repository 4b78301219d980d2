//! End-to-end admission scenarios
//!
//! Every scenario drives [`Mempool::submit`] with serialized transactions and
//! checks the overlaid state afterwards.

mod common;

use common::*;
use num_bigint::BigInt;
use rollup_mempool::constants::{BUY_OFFER_TYPE, SELL_OFFER_TYPE};
use rollup_mempool::tx::{
    AddLiquidityTx, AtomicMatchTx, CancelOfferTx, CreateCollectionTx, MintNftTx, OfferTx, SwapTx, TransferTx,
};
use rollup_mempool::{Error, LedgerStore, Mempool, NftInfo, Signature, TxType};
use serde::Serialize;
use std::sync::Arc;

async fn submit<T: Serialize>(mempool: &Mempool, tx_type: TxType, tx: &T) -> rollup_mempool::Result<String> {
    let raw = serde_json::to_vec(tx).unwrap();
    mempool.submit(&raw, tx_type.code()).await
}

fn transfer(from: i64, to: i64, amount: i64, nonce: i64) -> TransferTx {
    let mut tx = TransferTx {
        from_account_index: from,
        to_account_index: to,
        to_account_name_hash: name_hash(to),
        asset_id: 0,
        asset_amount: BigInt::from(amount),
        gas_account_index: GAS_ACCOUNT,
        gas_fee_asset_id: 0,
        gas_fee_asset_amount: BigInt::from(1),
        memo: "scenario".into(),
        expired_at: NEVER,
        nonce,
        sig: Signature::default(),
    };
    tx.sig = sign(from, &tx.msg_hash().unwrap());
    tx
}

fn swap(from: i64, amount_in: i64, min_out: i64, nonce: i64) -> SwapTx {
    let mut tx = SwapTx {
        from_account_index: from,
        pair_index: 0,
        asset_a_id: 0,
        asset_a_amount: BigInt::from(amount_in),
        asset_b_id: 1,
        asset_b_min_amount: BigInt::from(min_out),
        asset_b_amount_delta: BigInt::default(),
        gas_account_index: GAS_ACCOUNT,
        gas_fee_asset_id: 0,
        gas_fee_asset_amount: BigInt::from(1),
        expired_at: NEVER,
        nonce,
        sig: Signature::default(),
    };
    tx.sig = sign(from, &tx.msg_hash().unwrap());
    tx
}

fn add_liquidity(from: i64, amount: i64, nonce: i64) -> AddLiquidityTx {
    let mut tx = AddLiquidityTx {
        from_account_index: from,
        pair_index: 0,
        asset_a_id: 0,
        asset_a_amount: BigInt::from(amount),
        asset_b_id: 1,
        asset_b_amount: BigInt::from(amount),
        lp_amount_min: BigInt::from(1),
        lp_amount: BigInt::default(),
        k_last: BigInt::default(),
        treasury_amount: BigInt::default(),
        gas_account_index: GAS_ACCOUNT,
        gas_fee_asset_id: 0,
        gas_fee_asset_amount: BigInt::from(1),
        expired_at: NEVER,
        nonce,
        sig: Signature::default(),
    };
    tx.sig = sign(from, &tx.msg_hash().unwrap());
    tx
}

fn offer(offer_type: i64, account_index: i64, offer_id: i64, amount: i64) -> OfferTx {
    let mut tx = OfferTx {
        offer_type,
        offer_id,
        account_index,
        nft_index: 4,
        asset_id: 0,
        asset_amount: BigInt::from(amount),
        listed_at: 0,
        expired_at: NEVER,
        treasury_rate: 200,
        sig: Signature::default(),
    };
    tx.sig = sign(account_index, &tx.msg_hash().unwrap());
    tx
}

#[tokio::test]
async fn test_transfer_scenario() {
    let mut sender = account(2, &[(0, 100)]);
    sender.nonce = 3;
    let store = seeded_store(vec![sender, account(3, &[])]);
    let mempool = mempool(store);

    let tx_hash = submit(&mempool, TxType::Transfer, &transfer(2, 3, 40, 3)).await.unwrap();

    let sender = mempool.overlaid_account(2).unwrap();
    assert_eq!(sender.balance(0), BigInt::from(59));
    assert_eq!(sender.nonce, 4);
    assert_eq!(mempool.overlaid_account(3).unwrap().balance(0), BigInt::from(40));
    assert_eq!(mempool.overlaid_account(GAS_ACCOUNT).unwrap().balance(0), BigInt::from(1));

    let stored = mempool.mempool_tx(&tx_hash).unwrap();
    assert_eq!(stored.memo, "scenario");
    assert_eq!(stored.nonce, 3);
    let orders: Vec<i64> = stored.details.iter().map(|d| d.account_order).collect();
    assert_eq!(orders, vec![0, 0, 1, 2]);

    mempool.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_nonce_sequence() {
    let store = seeded_store(vec![account(2, &[(0, 100)]), account(3, &[])]);
    let mempool = mempool(store);

    submit(&mempool, TxType::Transfer, &transfer(2, 3, 10, 0)).await.unwrap();

    let replay = submit(&mempool, TxType::Transfer, &transfer(2, 3, 10, 0)).await.unwrap_err();
    assert!(matches!(replay, Error::StaleOrInvalidNonce { expected: 1, got: 0, .. }));

    let gap = submit(&mempool, TxType::Transfer, &transfer(2, 3, 10, 2)).await.unwrap_err();
    assert!(matches!(gap, Error::StaleOrInvalidNonce { expected: 1, got: 2, .. }));

    submit(&mempool, TxType::Transfer, &transfer(2, 3, 10, 1)).await.unwrap();
    assert_eq!(mempool.overlaid_account(2).unwrap().nonce, 2);
    assert_eq!(mempool.pending_count().unwrap(), 2);
}

#[tokio::test]
async fn test_overdraft_rejected() {
    let store = seeded_store(vec![account(2, &[(0, 40)]), account(3, &[])]);
    let mempool = mempool(store.clone());

    let err = submit(&mempool, TxType::Transfer, &transfer(2, 3, 40, 0)).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientBalance(_)));
    assert_eq!(mempool.overlaid_account(2).unwrap().balance(0), BigInt::from(40));

    mempool.flush_fail_records().await.unwrap();
    let records = store.fail_txs().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tx_type, TxType::Transfer.code());
}

#[tokio::test]
async fn test_swap_scenario() {
    let store = seeded_store(vec![account(2, &[(0, 101)])]);
    store.put_liquidity(&pool(0, 1_000, 1_000, 1_000)).unwrap();
    let mempool = mempool(store);

    // constant-product output for 100 in at 30 bps is 90
    let err = submit(&mempool, TxType::Swap, &swap(2, 100, 91, 0)).await.unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));

    let tx_hash = submit(&mempool, TxType::Swap, &swap(2, 100, 90, 0)).await.unwrap();
    let stored: SwapTx = serde_json::from_str(&mempool.mempool_tx(&tx_hash).unwrap().tx_info).unwrap();
    assert_eq!(stored.asset_b_amount_delta, BigInt::from(90));

    let pool = mempool.overlaid_liquidity(0).unwrap();
    assert_eq!(pool.asset_a, BigInt::from(1_100));
    assert_eq!(pool.asset_b, BigInt::from(910));
    assert!(&pool.asset_a * &pool.asset_b >= BigInt::from(1_000_000));

    let trader = mempool.overlaid_account(2).unwrap();
    assert_eq!(trader.balance(0), BigInt::from(0));
    assert_eq!(trader.balance(1), BigInt::from(90));
}

#[tokio::test]
async fn test_cancel_then_match_rejected() {
    let store = seeded_store(vec![
        account(2, &[(0, 5)]),
        account(3, &[(0, 1_000)]),
        account(5, &[(0, 10)]),
        account(9, &[]),
    ]);
    store.put_nft(&nft(4, 9, 2)).unwrap();
    let mempool = mempool(store);

    let mut cancel = CancelOfferTx {
        account_index: 2,
        offer_id: 7,
        gas_account_index: GAS_ACCOUNT,
        gas_fee_asset_id: 0,
        gas_fee_asset_amount: BigInt::from(1),
        expired_at: NEVER,
        nonce: 0,
        sig: Signature::default(),
    };
    cancel.sig = sign(2, &cancel.msg_hash().unwrap());
    submit(&mempool, TxType::CancelOffer, &cancel).await.unwrap();
    assert!(mempool.overlaid_account(2).unwrap().offer_bitmap(0).test(7));

    let mut matched = AtomicMatchTx {
        account_index: 5,
        buy_offer: offer(BUY_OFFER_TYPE, 3, 0, 500),
        sell_offer: offer(SELL_OFFER_TYPE, 2, 7, 500),
        gas_account_index: GAS_ACCOUNT,
        gas_fee_asset_id: 0,
        gas_fee_asset_amount: BigInt::from(1),
        creator_amount: BigInt::default(),
        treasury_amount: BigInt::default(),
        expired_at: NEVER,
        nonce: 0,
        sig: Signature::default(),
    };
    matched.sig = sign(5, &matched.msg_hash().unwrap());
    let err = submit(&mempool, TxType::AtomicMatch, &matched).await.unwrap_err();
    assert!(matches!(err, Error::OfferAlreadyConsumed { account_index: 2, offer_id: 7 }));

    // a fresh sell offer goes through and moves the NFT
    matched.sell_offer = offer(SELL_OFFER_TYPE, 2, 8, 500);
    matched.sig = sign(5, &matched.msg_hash().unwrap());
    submit(&mempool, TxType::AtomicMatch, &matched).await.unwrap();

    let moved: NftInfo = mempool.overlaid_nft(4).unwrap();
    assert_eq!(moved.owner_account_index, 3);
    // 500 - 2% treasury - 1% royalty
    assert_eq!(mempool.overlaid_account(2).unwrap().balance(0), BigInt::from(4 + 485));
    assert_eq!(mempool.overlaid_account(9).unwrap().balance(0), BigInt::from(5));
    assert_eq!(mempool.overlaid_account(GAS_ACCOUNT).unwrap().balance(0), BigInt::from(1 + 10 + 1));
    assert_eq!(mempool.overlaid_account(3).unwrap().balance(0), BigInt::from(500));
    assert_eq!(mempool.overlaid_account(5).unwrap().balance(0), BigInt::from(9));
    assert!(mempool.overlaid_account(3).unwrap().offer_bitmap(0).test(0));
    assert!(mempool.overlaid_account(2).unwrap().offer_bitmap(0).test(8));
}

#[tokio::test]
async fn test_offer_ids_issued_in_sequence() {
    let store = seeded_store(vec![account(2, &[]), account(9, &[])]);
    store.put_nft(&nft(4, 9, 2)).unwrap();
    let mempool = mempool(store.clone());

    let id = submit(&mempool, TxType::Offer, &offer(SELL_OFFER_TYPE, 2, 0, 500)).await.unwrap();
    assert_eq!(id, "0");
    assert_eq!(store.get_offer(2, 0).unwrap().asset_amount, "500");

    let err = submit(&mempool, TxType::Offer, &offer(SELL_OFFER_TYPE, 2, 0, 500)).await.unwrap_err();
    assert!(matches!(err, Error::MalformedInput(_)));
    let id = submit(&mempool, TxType::Offer, &offer(SELL_OFFER_TYPE, 2, 1, 600)).await.unwrap();
    assert_eq!(id, "1");
}

#[tokio::test]
async fn test_collection_then_mint() {
    let store = seeded_store(vec![account(2, &[(0, 10)]), account(3, &[])]);
    let mempool = mempool(store.clone());

    let mut create = CreateCollectionTx {
        account_index: 2,
        collection_id: 1,
        name: "genesis".into(),
        introduction: String::new(),
        gas_account_index: GAS_ACCOUNT,
        gas_fee_asset_id: 0,
        gas_fee_asset_amount: BigInt::from(1),
        expired_at: NEVER,
        nonce: 0,
        sig: Signature::default(),
    };
    create.sig = sign(2, &create.msg_hash().unwrap());
    submit(&mempool, TxType::CreateCollection, &create).await.unwrap();
    assert_eq!(mempool.overlaid_account(2).unwrap().collection_nonce, 2);
    assert_eq!(store.get_collection(2, 1).unwrap().name, "genesis");

    let mut mint = MintNftTx {
        creator_account_index: 2,
        to_account_index: 3,
        to_account_name_hash: name_hash(3),
        nft_content_hash: "cd".repeat(32),
        nft_collection_id: 1,
        creator_treasury_rate: 250,
        nft_index: -1,
        gas_account_index: GAS_ACCOUNT,
        gas_fee_asset_id: 0,
        gas_fee_asset_amount: BigInt::from(1),
        expired_at: NEVER,
        nonce: 1,
        sig: Signature::default(),
    };
    mint.sig = sign(2, &mint.msg_hash().unwrap());
    let tx_hash = submit(&mempool, TxType::MintNft, &mint).await.unwrap();

    let minted = mempool.mempool_tx(&tx_hash).unwrap();
    assert_eq!(minted.nft_index, 0);
    let nft = mempool.overlaid_nft(0).unwrap();
    assert_eq!(nft.owner_account_index, 3);
    assert_eq!(nft.creator_treasury_rate, 250);
    assert_eq!(mempool.overlaid_account(2).unwrap().balance(0), BigInt::from(8));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_add_liquidity_is_serialized() {
    let store = seeded_store(vec![
        account(2, &[(0, 1_000), (1, 1_000)]),
        account(3, &[(0, 1_000), (1, 1_000)]),
    ]);
    store.put_liquidity(&pool(0, 1_000, 1_000, 1_000)).unwrap();
    let mempool = Arc::new(mempool(store));

    let first = {
        let mempool = mempool.clone();
        tokio::spawn(async move { submit(&mempool, TxType::AddLiquidity, &add_liquidity(2, 100, 0)).await })
    };
    let second = {
        let mempool = mempool.clone();
        tokio::spawn(async move { submit(&mempool, TxType::AddLiquidity, &add_liquidity(3, 50, 0)).await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let pool = mempool.overlaid_liquidity(0).unwrap();
    assert_eq!(pool.asset_a, BigInt::from(1_150));
    assert_eq!(pool.asset_b, BigInt::from(1_150));
    assert_eq!(pool.lp_amount, BigInt::from(1_150));
    // the later deposit saw the earlier one's reserves
    assert_eq!(pool.k_last, BigInt::from(1_150 * 1_150));

    assert_eq!(mempool.overlaid_account(2).unwrap().lp_amount(0), BigInt::from(100));
    assert_eq!(mempool.overlaid_account(3).unwrap().lp_amount(0), BigInt::from(50));
}
