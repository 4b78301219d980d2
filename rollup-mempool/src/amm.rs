//! Constant-product AMM arithmetic
//!
//! All results are floored integer values; the prover re-executes the same
//! integer steps, so no intermediate rounding may differ.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};

use crate::constants::RATE_BASE;
use crate::entity::LiquidityInfo;
use crate::error::{Error, Result};

/// Swap quote for one side of a pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapQuote {
    /// Amount leaving the pool
    pub amount_out: BigInt,
    /// Pool delta, oriented to the pool's A/B
    pub pool_delta_a: BigInt,
    /// Pool delta, oriented to the pool's A/B
    pub pool_delta_b: BigInt,
}

fn rate(value: i64) -> BigInt {
    BigInt::from(value)
}

fn check_rate(name: &str, value: i64) -> Result<()> {
    if !(0..RATE_BASE).contains(&value) {
        return Err(Error::MalformedInput(format!(
            "{} {} outside [0, {})",
            name, value, RATE_BASE
        )));
    }
    Ok(())
}

/// `delta * (RATE_BASE - fee_rate) / RATE_BASE`
pub fn delta_after_fee(delta: &BigInt, fee_rate: i64) -> BigInt {
    delta * rate(RATE_BASE - fee_rate) / rate(RATE_BASE)
}

/// Output of selling `amount_in` into reserves `(reserve_in, reserve_out)`
///
/// `floor((R - f) * dx * y / (R * x + (R - f) * dx))`, which is
/// `y - x*y / (x + dx*(1 - f))` evaluated without intermediate rounding.
pub fn swap_output(
    reserve_in: &BigInt,
    reserve_out: &BigInt,
    amount_in: &BigInt,
    fee_rate: i64,
) -> Result<BigInt> {
    check_rate("fee rate", fee_rate)?;
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(Error::InvariantViolation("pool has no liquidity".into()));
    }
    if amount_in.is_negative() {
        return Err(Error::MalformedInput("negative swap amount".into()));
    }
    let in_with_fee = rate(RATE_BASE - fee_rate) * amount_in;
    let numerator = &in_with_fee * reserve_out;
    let denominator = rate(RATE_BASE) * reserve_in + in_with_fee;
    Ok(numerator / denominator)
}

/// Quote a swap of `amount_in` of `asset_in` against `pool`
pub fn quote_swap(pool: &LiquidityInfo, asset_in: i64, amount_in: &BigInt) -> Result<SwapQuote> {
    if asset_in == pool.asset_a_id {
        let amount_out = swap_output(&pool.asset_a, &pool.asset_b, amount_in, pool.fee_rate)?;
        Ok(SwapQuote {
            pool_delta_a: amount_in.clone(),
            pool_delta_b: -amount_out.clone(),
            amount_out,
        })
    } else if asset_in == pool.asset_b_id {
        let amount_out = swap_output(&pool.asset_b, &pool.asset_a, amount_in, pool.fee_rate)?;
        Ok(SwapQuote {
            pool_delta_a: -amount_out.clone(),
            pool_delta_b: amount_in.clone(),
            amount_out,
        })
    } else {
        Err(Error::MalformedInput(format!(
            "asset {} not in pair {}",
            asset_in, pool.pair_index
        )))
    }
}

/// LP minted by the first deposit: `sqrt(a * b)`
pub fn initial_lp_amount(delta_a: &BigInt, delta_b: &BigInt) -> BigInt {
    (delta_a * delta_b).sqrt()
}

/// LP minted by a later deposit: `delta_a * (lp - treasury_lp) / reserve_a`
pub fn lp_amount(pool: &LiquidityInfo, delta_a: &BigInt, treasury_lp: &BigInt) -> Result<BigInt> {
    if pool.asset_a.is_zero() {
        return Err(Error::InvariantViolation("pool has no liquidity".into()));
    }
    Ok(delta_a * (&pool.lp_amount - treasury_lp) / &pool.asset_a)
}

/// Reserves returned for burning `lp` shares out of `total_lp`
pub fn removal_amounts(pool: &LiquidityInfo, lp: &BigInt, total_lp: &BigInt) -> Result<(BigInt, BigInt)> {
    if total_lp.is_zero() || lp > total_lp {
        return Err(Error::InvariantViolation(format!(
            "cannot burn {} of {} LP",
            lp, total_lp
        )));
    }
    Ok((lp * &pool.asset_a / total_lp, lp * &pool.asset_b / total_lp))
}

/// Treasury LP accrued since `k_last` from sqrt-invariant growth
///
/// `R*(sqrt(k) - sqrt(k_last)) / ((R*(fee/treasury) - R)*sqrt(k) + R*sqrt(k_last))`
/// with the ratio `fee/treasury` in integer arithmetic. Zero when the pool is
/// empty, when the invariant did not grow, when `treasury_rate` is zero, or
/// when the denominator is not positive.
pub fn treasury_lp(pool: &LiquidityInfo) -> BigInt {
    let k_current = &pool.asset_a * &pool.asset_b;
    if k_current.is_zero() || pool.treasury_rate <= 0 || pool.k_last.is_negative() {
        return BigInt::zero();
    }
    let root_k = k_current.sqrt();
    let root_k_last = pool.k_last.sqrt();
    if root_k <= root_k_last {
        return BigInt::zero();
    }
    let base = rate(RATE_BASE);
    let numerator = (&root_k - &root_k_last) * &base;
    let ratio = rate(pool.fee_rate / pool.treasury_rate);
    let denominator = (&base * ratio - &base) * &root_k + &base * &root_k_last;
    if !denominator.is_positive() {
        return BigInt::zero();
    }
    numerator / denominator
}

/// `floor(amount * rate_bps / RATE_BASE)`
pub fn fee_share(amount: &BigInt, rate_bps: i64) -> BigInt {
    amount * rate(rate_bps) / rate(RATE_BASE)
}
