//! Rate inference — converts between the two legs of a currency trade.
//!
//! # Purpose
//! An order quotes `amount_buy` in its from-currency, `amount_sell` in its
//! to-currency, and a single `rate`. Whether that rate is a multiplier or a
//! divisor depends on which leg is the *base* currency, inferred from the
//! relative magnitude of each currency's table rate:
//!
//! 1. A currency is **unit-like** when its table rate is ≤ 1
//!    (fallback when no rate is on file: the literal code `USDT`).
//! 2. Both unit-like → the from-leg is base. Neither unit-like and both
//!    rates on file → the leg with the *smaller* rate is base (ties go to
//!    the from-leg). Otherwise the from-leg is base by default.
//! 3. Exactly one unit-like leg → that leg is base.
//! 4. From-leg base: `sell = buy × rate`; to-leg base: `sell = buy ÷ rate`.
//!
//! [`invert`] is the algebraic inverse of [`convert`]; for every `rate > 0`
//! the pair round-trips within floating tolerance.
//!
//! # Determinism
//! Pure functions over plain values — no IO, no time, no randomness. The
//! caller supplies the table rates (looked up once per request).

// ---------------------------------------------------------------------------
// Base leg
// ---------------------------------------------------------------------------

/// Which leg of the trade acts as the base (multiplier) currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseLeg {
    From,
    To,
}

/// Table rates for the two legs of a trade, `None` when the currency has no
/// rate on file.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LegRates {
    pub from_rate: Option<f64>,
    pub to_rate: Option<f64>,
}

fn is_unit_like(code: &str, table_rate: Option<f64>) -> bool {
    match table_rate {
        Some(r) => r <= 1.0,
        None => code == "USDT",
    }
}

/// Infer the base leg for a `from_ccy → to_ccy` trade.
pub fn infer_base(from_ccy: &str, to_ccy: &str, rates: LegRates) -> BaseLeg {
    let from_unit = is_unit_like(from_ccy, rates.from_rate);
    let to_unit = is_unit_like(to_ccy, rates.to_rate);

    match (from_unit, to_unit) {
        (true, false) => BaseLeg::From,
        (false, true) => BaseLeg::To,
        (true, true) => BaseLeg::From,
        (false, false) => match (rates.from_rate, rates.to_rate) {
            // Smaller table rate wins; ties resolve to the from-leg.
            (Some(f), Some(t)) if f <= t => BaseLeg::From,
            (Some(_), Some(_)) => BaseLeg::To,
            _ => BaseLeg::From,
        },
    }
}

// ---------------------------------------------------------------------------
// Conversion pair
// ---------------------------------------------------------------------------

/// Buy-leg amount → sell-leg amount under the given order rate.
pub fn convert(amount_buy: f64, rate: f64, base: BaseLeg) -> f64 {
    match base {
        BaseLeg::From => amount_buy * rate,
        BaseLeg::To => amount_buy / rate,
    }
}

/// Sell-leg amount → buy-leg amount; exact algebraic inverse of [`convert`].
pub fn invert(amount_sell: f64, rate: f64, base: BaseLeg) -> f64 {
    match base {
        BaseLeg::From => amount_sell / rate,
        BaseLeg::To => amount_sell * rate,
    }
}

/// Convenience: infer the base then convert in one call.
pub fn convert_legs(
    amount_buy: f64,
    rate: f64,
    from_ccy: &str,
    to_ccy: &str,
    rates: LegRates,
) -> f64 {
    convert(amount_buy, rate, infer_base(from_ccy, to_ccy, rates))
}

/// Convenience: infer the base then invert in one call.
pub fn invert_legs(
    amount_sell: f64,
    rate: f64,
    from_ccy: &str,
    to_ccy: &str,
    rates: LegRates,
) -> f64 {
    invert(amount_sell, rate, infer_base(from_ccy, to_ccy, rates))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn rates(from: Option<f64>, to: Option<f64>) -> LegRates {
        LegRates {
            from_rate: from,
            to_rate: to,
        }
    }

    // --- Base inference ---

    #[test]
    fn one_unit_like_side_is_base() {
        // USD (1.0) vs PKR (278): USD side is base either way round.
        assert_eq!(
            infer_base("USD", "PKR", rates(Some(1.0), Some(278.0))),
            BaseLeg::From
        );
        assert_eq!(
            infer_base("PKR", "USD", rates(Some(278.0), Some(1.0))),
            BaseLeg::To
        );
    }

    #[test]
    fn both_unit_like_defaults_to_from_leg() {
        assert_eq!(
            infer_base("USD", "EUR", rates(Some(1.0), Some(0.9))),
            BaseLeg::From
        );
    }

    #[test]
    fn neither_unit_like_smaller_rate_is_base() {
        // AED (3.67) vs PKR (278): AED is the smaller-magnitude leg.
        assert_eq!(
            infer_base("AED", "PKR", rates(Some(3.67), Some(278.0))),
            BaseLeg::From
        );
        assert_eq!(
            infer_base("PKR", "AED", rates(Some(278.0), Some(3.67))),
            BaseLeg::To
        );
    }

    #[test]
    fn neither_unit_like_equal_rates_default_from() {
        assert_eq!(
            infer_base("AED", "SAR", rates(Some(3.75), Some(3.75))),
            BaseLeg::From
        );
    }

    #[test]
    fn missing_rates_default_to_from_leg() {
        assert_eq!(infer_base("AAA", "BBB", rates(None, None)), BaseLeg::From);
        assert_eq!(
            infer_base("AAA", "PKR", rates(None, Some(278.0))),
            BaseLeg::From
        );
    }

    #[test]
    fn usdt_literal_is_unit_like_without_table_rate() {
        assert_eq!(
            infer_base("PKR", "USDT", rates(Some(278.0), None)),
            BaseLeg::To
        );
        assert_eq!(
            infer_base("USDT", "PKR", rates(None, Some(278.0))),
            BaseLeg::From
        );
    }

    #[test]
    fn table_rate_overrides_usdt_fallback() {
        // A USDT row with rate on file > 1 is NOT unit-like.
        assert_eq!(
            infer_base("USDT", "USD", rates(Some(278.0), Some(1.0))),
            BaseLeg::To
        );
    }

    // --- Conversion direction ---

    #[test]
    fn from_base_multiplies() {
        assert_eq!(convert(100.0, 0.9, BaseLeg::From), 90.0);
        assert_eq!(invert(90.0, 0.9, BaseLeg::From), 100.0);
    }

    #[test]
    fn to_base_divides() {
        assert_eq!(convert(278_000.0, 278.0, BaseLeg::To), 1000.0);
        assert_eq!(invert(1000.0, 278.0, BaseLeg::To), 278_000.0);
    }

    #[test]
    fn convert_legs_matches_manual_composition() {
        let r = rates(Some(1.0), Some(278.0));
        assert_eq!(
            convert_legs(100.0, 278.5, "USD", "PKR", r),
            convert(100.0, 278.5, BaseLeg::From)
        );
    }

    // --- Round-trip property (§ invert ∘ convert = id) ---

    #[test]
    fn invert_convert_round_trips_within_tolerance() {
        let amounts = [0.01, 1.0, 99.99, 1234.56, 1_000_000.0];
        let order_rates = [0.0001, 0.9, 1.0, 3.6725, 278.35, 10_000.0];
        for base in [BaseLeg::From, BaseLeg::To] {
            for &x in &amounts {
                for &r in &order_rates {
                    let back = invert(convert(x, r, base), r, base);
                    assert!(
                        (back - x).abs() < 1e-9 * x.max(1.0),
                        "round trip failed: x={x} r={r} base={base:?} back={back}"
                    );
                }
            }
        }
    }
}
