use criterion::{criterion_group, criterion_main, Criterion};
use num_bigint::BigInt;
use rollup_mempool::amm::{quote_swap, swap_output, treasury_lp};
use rollup_mempool::entity::{parse_entity, serialize_entity};
use rollup_mempool::{LiquidityInfo, OfferBitmap};
use std::hint::black_box;

fn large_pool() -> LiquidityInfo {
    let reserve = BigInt::from(10u64).pow(24);
    LiquidityInfo {
        pair_index: 0,
        asset_a_id: 0,
        asset_a: reserve.clone(),
        asset_b_id: 1,
        asset_b: &reserve * 3,
        lp_amount: &reserve * 2,
        k_last: &reserve * &reserve * 2,
        fee_rate: 30,
        treasury_account_index: 0,
        treasury_rate: 5,
    }
}

fn bench_swap_output(c: &mut Criterion) {
    let pool = large_pool();
    let amount_in = BigInt::from(10u64).pow(20);
    c.bench_function("amm_swap_output", |b| {
        b.iter(|| black_box(swap_output(&pool.asset_a, &pool.asset_b, &amount_in, pool.fee_rate)))
    });
}

fn bench_quote_swap(c: &mut Criterion) {
    let pool = large_pool();
    let amount_in = BigInt::from(10u64).pow(20);
    c.bench_function("amm_quote_swap_reverse", |b| {
        b.iter(|| black_box(quote_swap(&pool, pool.asset_b_id, &amount_in)))
    });
}

fn bench_treasury_lp(c: &mut Criterion) {
    let pool = large_pool();
    c.bench_function("amm_treasury_lp", |b| b.iter(|| black_box(treasury_lp(&pool))));
}

fn bench_pool_encoding(c: &mut Criterion) {
    let pool = large_pool();
    let encoded = serialize_entity(&pool).unwrap_or_default();
    c.bench_function("entity_pool_parse", |b| {
        b.iter(|| black_box(parse_entity::<LiquidityInfo>(&encoded)))
    });
    c.bench_function("offer_bitmap_set", |b| {
        b.iter(|| {
            let mut bitmap = OfferBitmap::EMPTY;
            for bit in 0..128 {
                bitmap = bitmap.set(black_box(bit));
            }
            bitmap
        })
    });
}

criterion_group!(benches, bench_swap_output, bench_quote_swap, bench_treasury_lp, bench_pool_encoding);
criterion_main!(benches);
