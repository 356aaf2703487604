//! Slippage controller (spec §4.15): bounds the realized price impact of a swap against the
//! instruction's configured maximum, re-quoting immediately before submission.

use rust_decimal::Decimal;

use crate::error::SlippageError;
use crate::types::SwapInstruction;

/// Percentage difference between an expected and a realized output amount, signed so a
/// worse-than-expected fill is positive.
pub fn realized_slippage_percent(expected: Decimal, realized: Decimal) -> Decimal {
    if expected == Decimal::ZERO {
        return Decimal::ZERO;
    }
    (expected - realized) / expected * Decimal::from(100)
}

/// Re-derive `minimum_to_amount` from a freshly fetched quote and the instruction's
/// configured bound, so a stale quote never under-protects a trade (spec §4.15 step 1).
pub fn minimum_acceptable(expected_to_amount: Decimal, max_slippage_percent: Decimal) -> Decimal {
    expected_to_amount * (Decimal::ONE - max_slippage_percent / Decimal::from(100))
}

/// Verify a pre-submission quote still clears the instruction's bound, and that a realized
/// fill (if already known) did too (spec §4.15 steps 2-3).
pub fn check_quote(instruction: &SwapInstruction, fresh_expected_to_amount: Decimal) -> Result<(), SlippageError> {
    let bound = minimum_acceptable(fresh_expected_to_amount, instruction.max_slippage_percent);
    if bound < instruction.minimum_to_amount {
        let realized_percent = realized_slippage_percent(instruction.expected_to_amount, fresh_expected_to_amount)
            .to_string()
            .parse()
            .unwrap_or(0.0);
        return Err(SlippageError::Exceeded {
            realized_percent,
            max_percent: instruction
                .max_slippage_percent
                .to_string()
                .parse()
                .unwrap_or(0.0),
        });
    }
    Ok(())
}

pub fn check_fill(instruction: &SwapInstruction, realized_to_amount: Decimal) -> Result<(), SlippageError> {
    if realized_to_amount < instruction.minimum_to_amount {
        let realized_percent = realized_slippage_percent(instruction.expected_to_amount, realized_to_amount)
            .to_string()
            .parse()
            .unwrap_or(0.0);
        return Err(SlippageError::Exceeded {
            realized_percent,
            max_percent: instruction
                .max_slippage_percent
                .to_string()
                .parse()
                .unwrap_or(0.0),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn instruction() -> SwapInstruction {
        SwapInstruction {
            from_symbol: "USDC".to_string(),
            from_mint: "a".to_string(),
            to_symbol: "SOL".to_string(),
            to_mint: "b".to_string(),
            from_amount: dec!(100),
            expected_to_amount: dec!(1),
            minimum_to_amount: dec!(0.99),
            max_slippage_percent: dec!(1),
        }
    }

    #[test]
    fn quote_within_bound_passes() {
        assert!(check_quote(&instruction(), dec!(1.0)).is_ok());
    }

    #[test]
    fn quote_worse_than_bound_fails() {
        assert!(check_quote(&instruction(), dec!(0.9)).is_err());
    }

    #[test]
    fn fill_at_exact_minimum_passes() {
        assert!(check_fill(&instruction(), dec!(0.99)).is_ok());
    }

    #[test]
    fn fill_below_minimum_fails() {
        assert!(check_fill(&instruction(), dec!(0.98)).is_err());
    }
}
