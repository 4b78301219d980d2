//! Property-based tests for admission invariants
//!
//! These tests use proptest to verify:
//! - Constant product: a swap never shrinks `x * y`
//! - Conservation: a transfer's general deltas of one asset sum to zero
//! - Nonce sequencing: only the account's current nonce is accepted
//! - Offer bitmaps: setting a bit is idempotent and never clears another
//! - Entity encoding: serialized snapshots parse back unchanged

mod common;

use common::*;
use num_bigint::BigInt;
use num_traits::Zero;
use proptest::prelude::*;
use rollup_mempool::amm::{fee_share, quote_swap, swap_output};
use rollup_mempool::entity::{parse_entity, serialize_entity};
use rollup_mempool::tx::{Snapshot, TransferTx, Verified, VerifyContext};
use rollup_mempool::{AccountAsset, AssetType, Error, LiquidityInfo, OfferBitmap, Signature, Transaction};

fn ctx() -> VerifyContext {
    VerifyContext {
        gas_account_index: GAS_ACCOUNT,
        now_ms: 0,
    }
}

fn snapshot(from_balance: i64, from_nonce: i64) -> Snapshot {
    let mut from = account(2, &[(0, from_balance)]);
    from.nonce = from_nonce;
    let mut snapshot = Snapshot::default();
    for a in [from, account(3, &[]), account(GAS_ACCOUNT, &[])] {
        snapshot.accounts.insert(a.account_index, a);
    }
    snapshot
}

fn transfer(amount: i64, fee: i64, nonce: i64) -> Transaction {
    let mut tx = TransferTx {
        from_account_index: 2,
        to_account_index: 3,
        to_account_name_hash: name_hash(3),
        asset_id: 0,
        asset_amount: BigInt::from(amount),
        gas_account_index: GAS_ACCOUNT,
        gas_fee_asset_id: 0,
        gas_fee_asset_amount: BigInt::from(fee),
        memo: String::new(),
        expired_at: NEVER,
        nonce,
        sig: Signature::default(),
    };
    tx.sig = sign(2, &tx.msg_hash().unwrap());
    Transaction::Transfer(tx)
}

/// Strategy for pools with non-empty reserves
fn pool_strategy() -> impl Strategy<Value = LiquidityInfo> {
    (1i64..1_000_000_000, 1i64..1_000_000_000, 0i64..1_000).prop_map(|(a, b, fee_rate)| {
        let mut pool = pool(0, a, b, 1_000);
        pool.fee_rate = fee_rate;
        pool
    })
}

proptest! {
    /// A swap in either direction never decreases the reserve product
    #[test]
    fn prop_swap_never_shrinks_product(
        pool in pool_strategy(),
        amount_in in 0i64..1_000_000_000,
        sell_a in any::<bool>(),
    ) {
        let asset_in = if sell_a { pool.asset_a_id } else { pool.asset_b_id };
        let quote = quote_swap(&pool, asset_in, &BigInt::from(amount_in)).unwrap();

        let after_a = &pool.asset_a + &quote.pool_delta_a;
        let after_b = &pool.asset_b + &quote.pool_delta_b;
        prop_assert!(after_a >= BigInt::zero());
        prop_assert!(after_b >= BigInt::zero());
        prop_assert!(&after_a * &after_b >= &pool.asset_a * &pool.asset_b);
    }

    /// Output is monotone in the input and bounded by the reserve
    #[test]
    fn prop_swap_output_bounded(
        reserve_in in 1i64..1_000_000_000,
        reserve_out in 1i64..1_000_000_000,
        amount_in in 0i64..1_000_000_000,
        fee_rate in 0i64..1_000,
    ) {
        let (x, y) = (BigInt::from(reserve_in), BigInt::from(reserve_out));
        let out = swap_output(&x, &y, &BigInt::from(amount_in), fee_rate).unwrap();
        let more = swap_output(&x, &y, &BigInt::from(amount_in + 1), fee_rate).unwrap();
        prop_assert!(out < y);
        prop_assert!(out <= more);
    }

    /// Fee shares never exceed the amount they are taken from
    #[test]
    fn prop_fee_share_bounded(amount in 0i64..i64::MAX / 10_000, rate in 0i64..10_000) {
        let amount = BigInt::from(amount);
        let share = fee_share(&amount, rate);
        prop_assert!(share <= amount);
        prop_assert!(share >= BigInt::zero());
    }

    /// Every unit leaving the sender arrives at the recipient or the gas account
    #[test]
    fn prop_transfer_conserves_value(
        balance in 2i64..1_000_000,
        amount_pct in 1i64..100,
        fee in 1i64..10,
    ) {
        let amount = (balance - fee).max(1) * amount_pct / 100;
        prop_assume!(amount > 0 && amount + fee <= balance);

        let verified = transfer(amount, fee, 0).verify(&snapshot(balance, 0), &ctx()).unwrap();
        let pending = match verified {
            Verified::Pending(pending) => pending,
            Verified::Offer(_) => panic!("transfer produced an offer"),
        };

        let mut total = BigInt::zero();
        for detail in &pending.details {
            prop_assert_eq!(detail.asset_type, AssetType::General);
            let delta: AccountAsset = parse_entity(&detail.balance_delta).unwrap();
            total += delta.balance;
        }
        prop_assert!(total.is_zero());
    }

    /// Only the account's current nonce is accepted
    #[test]
    fn prop_nonce_accepted_iff_current(current in 0i64..1_000, submitted in 0i64..1_000) {
        let result = transfer(10, 1, submitted).verify(&snapshot(100, current), &ctx());
        if submitted == current {
            prop_assert!(result.is_ok());
        } else {
            let is_nonce_error = matches!(
                result,
                Err(Error::StaleOrInvalidNonce { expected, got, .. }) if expected == current && got == submitted
            );
            prop_assert!(is_nonce_error);
        }
    }

    /// Offer ids map to a unique (slot, bit) and bits are never cleared
    #[test]
    fn prop_offer_bitmap(bits in any::<u128>(), offer_id in 0i64..1_000_000) {
        let (slot, bit) = OfferBitmap::locate(offer_id).unwrap();
        prop_assert_eq!(slot * 128 + bit as i64, offer_id);

        let bitmap = OfferBitmap::from_bits(bits);
        let set = bitmap.set(bit);
        prop_assert!(set.test(bit));
        prop_assert_eq!(set.set(bit), set);
        prop_assert_eq!(set.bits() & bits, bits);
    }

    /// Account asset snapshots survive their canonical encoding
    #[test]
    fn prop_account_asset_encoding(
        asset_id in 0i64..1_000,
        balance in any::<i64>(),
        lp in any::<i64>(),
        bits in any::<u128>(),
    ) {
        let asset = AccountAsset {
            asset_id,
            balance: BigInt::from(balance),
            lp_amount: BigInt::from(lp),
            offer_canceled_or_finalized: OfferBitmap::from_bits(bits),
        };
        let parsed: AccountAsset = parse_entity(&serialize_entity(&asset).unwrap()).unwrap();
        prop_assert_eq!(parsed, asset);
    }
}
