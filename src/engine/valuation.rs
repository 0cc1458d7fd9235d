//! Current value of a position in its quote asset.

use crate::domain::{Decimal, Figure, PoolReserves, PositionEntry, PositionType, TokenAmount};

/// Display precision for token quantities and values.
const VALUE_DP: u32 = 6;

/// Point-in-time holdings of one position.
#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    /// Wallet's share of the pool, in percent (LP only).
    pub pool_share_pct: Figure<f64>,
    /// Underlying quote asset (token A) attributable to the wallet.
    pub token_a_amount: Figure<Decimal>,
    /// Underlying token B attributable to the wallet.
    pub token_b_amount: Figure<Decimal>,
    /// Value in quote-asset units.
    pub current_value: Figure<Decimal>,
    /// Value lost to impermanent loss versus holding, in quote-asset units.
    pub il_value: Figure<Decimal>,
}

impl Valuation {
    fn lending(current_value: Option<Decimal>) -> Self {
        Self {
            pool_share_pct: Figure::NotApplicable,
            token_a_amount: Figure::NotApplicable,
            token_b_amount: Figure::NotApplicable,
            current_value: Figure::from_option(current_value),
            il_value: Figure::NotApplicable,
        }
    }
}

/// Value a stored position.
///
/// `reserves` is used for LP rows, `exchange_rate` (underlying per receipt
/// token) for supply rows, and `il_pct` to size the LP loss figure.
pub fn value_position(
    entry: &PositionEntry,
    reserves: Option<&PoolReserves>,
    exchange_rate: Option<f64>,
    il_pct: Option<f64>,
) -> Valuation {
    match entry.position_type {
        PositionType::Lp => value_lp(entry.last_known_amount, reserves, il_pct),
        PositionType::Supply => Valuation::lending(value_supply(
            entry.last_known_amount,
            entry.token_decimals,
            exchange_rate,
        )),
        // a borrow row holds the debt itself in underlying units
        PositionType::Borrow => Valuation::lending(
            Decimal::from_raw_units(entry.last_known_amount.raw(), entry.token_decimals)
                .map(|d| d.round_dp(VALUE_DP)),
        ),
    }
}

/// LP share of a constant-product pool.
///
/// Both sides of such a pool hold equal value, so the position is worth
/// twice its token A share.
pub fn value_lp(
    lp_amount: TokenAmount,
    reserves: Option<&PoolReserves>,
    il_pct: Option<f64>,
) -> Valuation {
    let share = reserves.and_then(|r| pool_share(lp_amount, r));
    let token_a = match (reserves, share) {
        (Some(r), Some(s)) => Decimal::from_raw_units(r.reserve_a, r.decimals_a)
            .and_then(|a| a.checked_mul(s)),
        _ => None,
    };
    let token_b = match (reserves, share) {
        (Some(r), Some(s)) => Decimal::from_raw_units(r.reserve_b, r.decimals_b)
            .and_then(|b| b.checked_mul(s)),
        _ => None,
    };
    let current_value = token_a
        .zip(Decimal::from_raw_units(2, 0))
        .and_then(|(a, two)| a.checked_mul(two));
    let il_value = current_value.zip(il_pct).and_then(|(v, il)| il_loss_value(v, il));

    Valuation {
        pool_share_pct: Figure::from_option(
            share
                .and_then(|s| s.to_f64())
                .map(|s| s * 100.0),
        ),
        token_a_amount: Figure::from_option(token_a.map(|d| d.round_dp(VALUE_DP))),
        token_b_amount: Figure::from_option(token_b.map(|d| d.round_dp(VALUE_DP))),
        current_value: Figure::from_option(current_value.map(|d| d.round_dp(VALUE_DP))),
        il_value: Figure::from_option(il_value.map(|d| d.round_dp(VALUE_DP))),
    }
}

/// `lp_amount / total_supply`, when the supply is known and nonzero.
fn pool_share(lp_amount: TokenAmount, reserves: &PoolReserves) -> Option<Decimal> {
    let total = reserves.total_supply.filter(|t| *t > 0)?;
    let held = Decimal::from_raw_units(lp_amount.raw(), 0)?;
    held.checked_div(Decimal::from_raw_units(total, 0)?)
}

/// `value − value / (1 + il)`: negative when the position lags holding.
fn il_loss_value(current_value: Decimal, il_pct: f64) -> Option<Decimal> {
    let factor = Decimal::from_f64(1.0 + il_pct / 100.0)?;
    if !factor.is_positive() {
        return None;
    }
    let held_value = current_value.checked_div(factor)?;
    Some(current_value - held_value)
}

/// Receipt tokens converted to underlying at the market's exchange rate.
pub fn value_supply(amount: TokenAmount, decimals: u32, exchange_rate: Option<f64>) -> Option<Decimal> {
    let rate = Decimal::from_f64(exchange_rate.filter(|r| r.is_finite() && *r > 0.0)?)?;
    Decimal::from_raw_units(amount.raw(), decimals)?
        .checked_mul(rate)
        .map(|d| d.round_dp(VALUE_DP))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_lp_share_and_amounts() {
        // 10% of a pool holding 2000 A and 500 B
        let reserves = PoolReserves::new(2_000_000_000, 500)
            .with_decimals(6, 0)
            .with_total_supply(10_000);
        let v = value_lp(TokenAmount::new(1_000), Some(&reserves), Some(0.0));

        assert_eq!(v.pool_share_pct.get(), Some(10.0));
        assert_eq!(v.token_a_amount.get(), Some(dec("200")));
        assert_eq!(v.token_b_amount.get(), Some(dec("50")));
        assert_eq!(v.current_value.get(), Some(dec("400")));
        assert_eq!(v.il_value.get(), Some(dec("0")));
    }

    #[test]
    fn test_lp_il_value_is_negative_loss() {
        let reserves = PoolReserves::new(1_000, 1_000).with_total_supply(1_000);
        let v = value_lp(TokenAmount::new(1_000), Some(&reserves), Some(-20.0));
        // worth 2000 now, 2500 had it been held
        assert_eq!(v.current_value.get(), Some(dec("2000")));
        assert_eq!(v.il_value.get(), Some(dec("-500")));
    }

    #[test]
    fn test_lp_without_supply_is_unavailable() {
        let reserves = PoolReserves::new(1_000, 1_000);
        let v = value_lp(TokenAmount::new(10), Some(&reserves), Some(0.0));
        assert_eq!(v.pool_share_pct, Figure::Unavailable);
        assert_eq!(v.current_value, Figure::Unavailable);

        let v = value_lp(TokenAmount::new(10), None, None);
        assert_eq!(v.token_a_amount, Figure::Unavailable);
    }

    #[test]
    fn test_supply_uses_exchange_rate() {
        // 1000 qTokens (6 dp) at 0.02 underlying each
        let value = value_supply(TokenAmount::new(1_000_000_000), 6, Some(0.02));
        assert_eq!(value, Some(dec("20")));
        assert_eq!(value_supply(TokenAmount::new(1), 6, None), None);
        assert_eq!(value_supply(TokenAmount::new(1), 6, Some(-1.0)), None);
    }
}
