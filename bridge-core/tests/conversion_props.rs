//! Property tests for amount conversion

use bridge_core::conversion::{CONVERSION_RATE, SMALLEST_UNIT_FACTOR};
use bridge_core::{convert, normalize_amount};
use proptest::prelude::*;
use rust_decimal::Decimal;

proptest! {
    #[test]
    fn convert_never_panics_and_matches_wide_formula(amount in any::<u64>()) {
        let expected = amount as u128 * CONVERSION_RATE as u128 / SMALLEST_UNIT_FACTOR as u128;
        prop_assert_eq!(convert(amount).unwrap() as u128, expected);
    }

    #[test]
    fn convert_is_monotonic(a in any::<u64>(), b in any::<u64>()) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(convert(lo).unwrap() <= convert(hi).unwrap());
    }

    #[test]
    fn normalize_recovers_smallest_units(units in 0i64..i64::MAX) {
        // units * 10^-8 in display form
        let display = Decimal::new(units, 8);
        prop_assert_eq!(normalize_amount(display).unwrap(), units as u64);
    }

    #[test]
    fn normalize_drops_sub_unit_digits(units in 0i64..1_000_000_000_000, extra in 0i64..10) {
        // One digit beyond the 8-decimal precision
        let display = Decimal::new(units * 10 + extra, 9);
        prop_assert_eq!(normalize_amount(display).unwrap(), units as u64);
    }
}
