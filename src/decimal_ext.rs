//! High-precision decimal helpers shared by the metrics and scoring engines.
//!
//! Floating point is prohibited on these paths (spec §9 "Decimals"); `rust_decimal::Decimal`
//! gives us the 28-digit precision the spec calls for without pulling in an arbitrary-precision
//! bignum library the rest of the pack doesn't use.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Quantize a money/percentage value to 2 decimal places (spec §3).
pub fn quantize_money(value: Decimal) -> Decimal {
    value.round_dp(2)
}

/// Quantize a Sharpe-style ratio to 3 decimal places (spec §3).
pub fn quantize_ratio(value: Decimal) -> Decimal {
    value.round_dp(3)
}

/// Large-number sentinel used for win/loss ratio when there are no losing trades (spec §3, §4.5).
pub fn win_loss_sentinel() -> Decimal {
    dec!(999999)
}

/// Sample standard deviation of a decimal series, 0 when fewer than 2 points.
pub fn stdev(values: &[Decimal]) -> Decimal {
    if values.len() < 2 {
        return Decimal::ZERO;
    }
    let n = Decimal::from(values.len() as u64);
    let mean = values.iter().sum::<Decimal>() / n;
    let variance = values
        .iter()
        .map(|v| {
            let d = *v - mean;
            d * d
        })
        .sum::<Decimal>()
        / (n - Decimal::ONE);
    sqrt_decimal(variance)
}

pub fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().sum::<Decimal>() / Decimal::from(values.len() as u64)
}

/// `Decimal` has no native sqrt; Newton's method converges in a handful of iterations
/// at 28-digit precision, which is all the Sharpe-ratio denominator needs.
pub fn sqrt_decimal(value: Decimal) -> Decimal {
    if value <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let mut guess = value;
    for _ in 0..64 {
        let next = (guess + value / guess) / dec!(2);
        if (next - guess).abs() < dec!(0.0000000001) {
            return next;
        }
        guess = next;
    }
    guess
}
