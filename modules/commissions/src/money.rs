//! Monetary rounding policy for commission computation
//!
//! All amounts in this service are i64 minor units (e.g. cents, pesewas).
//! This module is the only place the commission rounding rule lives; every
//! event source records commissions through [`calculate_final_commission`]
//! rather than computing them inline.

/// Smallest commission worth recording, in minor units. Anything that rounds
/// below this is treated as zero and never stored as a positive amount.
pub const MIN_COMMISSION_MINOR: i64 = 1;

/// Basis points per whole percent.
const BP_PER_PERCENT: f64 = 100.0;

/// Divisor taking (minor units x basis points) back to minor units.
const BP_DIVISOR: i64 = 10_000;

/// Compute the final commission for a sale, in minor units.
///
/// The rate is given in percent (e.g. `10.0` for 10%) and is applied with
/// half-up rounding at the minor-unit boundary. The multiplication happens in
/// integer arithmetic (rate converted to basis points first), so repeated
/// application to the same inputs always yields the same output and binary
/// floating-point drift cannot creep in: a raw result of 1.5 minor units
/// rounds to 2, never truncates to 1.
///
/// Commissions that round below [`MIN_COMMISSION_MINOR`] are returned as 0.
/// Non-positive prices or rates also yield 0.
pub fn calculate_final_commission(price_minor: i64, rate_percent: f64) -> i64 {
    if price_minor <= 0 || !rate_percent.is_finite() || rate_percent <= 0.0 {
        return 0;
    }

    // Rates finer than one basis point are not representable on the platform.
    let rate_bp = (rate_percent * BP_PER_PERCENT).round() as i64;
    if rate_bp <= 0 {
        return 0;
    }

    let raw = price_minor * rate_bp;
    let commission = (raw + BP_DIVISOR / 2) / BP_DIVISOR; // half-up

    if commission < MIN_COMMISSION_MINOR {
        0
    } else {
        commission
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_up_rounding() {
        // 0.15 at 10% = 0.015 -> rounds up to 0.02, not down to 0.01
        assert_eq!(calculate_final_commission(15, 10.0), 2);
    }

    #[test]
    fn test_exact_result_unchanged() {
        // 10.00 at 5% = 0.50 exactly
        assert_eq!(calculate_final_commission(1000, 5.0), 50);
    }

    #[test]
    fn test_half_down_case() {
        // 0.14 at 10% = 0.014 -> 0.01
        assert_eq!(calculate_final_commission(14, 10.0), 1);
    }

    #[test]
    fn test_below_threshold_is_zero() {
        // 0.04 at 10% = 0.004 -> below one minor unit -> exactly 0
        assert_eq!(calculate_final_commission(4, 10.0), 0);
    }

    #[test]
    fn test_stable_under_repeated_application() {
        let first = calculate_final_commission(12_345, 7.5);
        let second = calculate_final_commission(12_345, 7.5);
        assert_eq!(first, second);
    }

    #[test]
    fn test_fractional_rate() {
        // 10.00 at 2.5% = 0.25
        assert_eq!(calculate_final_commission(1000, 2.5), 25);
    }

    #[test]
    fn test_zero_price_and_zero_rate() {
        assert_eq!(calculate_final_commission(0, 10.0), 0);
        assert_eq!(calculate_final_commission(1000, 0.0), 0);
    }

    #[test]
    fn test_negative_inputs_yield_zero() {
        assert_eq!(calculate_final_commission(-500, 10.0), 0);
        assert_eq!(calculate_final_commission(500, -10.0), 0);
    }

    #[test]
    fn test_non_finite_rate_yields_zero() {
        assert_eq!(calculate_final_commission(500, f64::NAN), 0);
        assert_eq!(calculate_final_commission(500, f64::INFINITY), 0);
    }
}
