//! Deterministic trade arithmetic. The models only pick tiers; every number
//! that reaches a decision is computed here.

use quorum_models::{MarketParams, RiskPolicy, TradeAction};
use rust_decimal::Decimal;

const PRICE_DP: u32 = 8;
const QUANTITY_DP: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSize {
    pub margin_usd: Decimal,
    pub contract_value_usd: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Levels {
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

/// `equity * fraction`, clamped to the policy's investment bounds.
pub fn margin_for(equity: Decimal, fraction: Decimal, policy: &RiskPolicy) -> Decimal {
    (equity * fraction).clamp(policy.min_investment_usd, policy.max_investment_usd)
}

/// Notional and quantity for a margin commitment.
///
/// Fees come off the margin first. Futures multiply by leverage and count
/// quantity in contracts of `contract_multiplier` base units.
pub fn size_position(
    margin_usd: Decimal,
    leverage: Option<u32>,
    price: Decimal,
    params: &MarketParams,
) -> PositionSize {
    let effective_margin = margin_usd * (Decimal::ONE - params.fee_rate);
    let contract_value_usd = match leverage {
        Some(leverage) => effective_margin * Decimal::from(leverage),
        None => effective_margin,
    };
    let unit_value = price * params.contract_multiplier;
    let quantity = if unit_value.is_zero() {
        Decimal::ZERO
    } else {
        (contract_value_usd / unit_value).round_dp(QUANTITY_DP)
    };
    PositionSize {
        margin_usd,
        contract_value_usd,
        quantity,
    }
}

/// Stop distance as a fraction of entry.
pub fn stop_distance(volatility_band: Decimal, width_multiplier: Decimal) -> Decimal {
    (volatility_band * width_multiplier).round_dp(6)
}

/// Stop and target around `entry`. `None` for hold.
pub fn levels(
    action: TradeAction,
    entry: Decimal,
    stop_distance_pct: Decimal,
    risk_reward: Decimal,
) -> Option<Levels> {
    let stop_move = entry * stop_distance_pct;
    let target_move = stop_move * risk_reward;
    let (stop_loss, take_profit) = if action.is_long_side() {
        (entry - stop_move, entry + target_move)
    } else if action.is_short_side() {
        (entry + stop_move, entry - target_move)
    } else {
        return None;
    };
    Some(Levels {
        stop_loss: stop_loss.round_dp(PRICE_DP),
        take_profit: take_profit.max(Decimal::ZERO).round_dp(PRICE_DP),
    })
}

/// Adverse move, as a fraction of entry, that wipes out the margin.
pub fn liquidation_distance(leverage: u32) -> Option<Decimal> {
    (leverage > 0).then(|| Decimal::ONE / Decimal::from(leverage))
}

/// Widest stop allowed: a share of the liquidation distance for futures,
/// a flat cap for spot.
pub fn max_stop_distance(policy: &RiskPolicy, leverage: Option<u32>) -> Decimal {
    match leverage.and_then(liquidation_distance) {
        Some(liquidation) => (liquidation * policy.liquidation_buffer).round_dp(6),
        None => policy.max_spot_stop_distance_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn futures() -> MarketParams {
        MarketParams {
            fee_rate: dec!(0.0006),
            max_leverage: 20,
            contract_multiplier: dec!(1),
        }
    }

    #[test]
    fn ten_x_on_one_hundred_margin() {
        let size = size_position(dec!(100), Some(10), dec!(50000), &futures());
        assert_eq!(size.contract_value_usd, dec!(999.4));
        assert_eq!(size.quantity, dec!(0.019988));
        assert_eq!(size.margin_usd, dec!(100));
    }

    #[test]
    fn spot_has_no_leverage_multiplier() {
        let spot = MarketParams {
            fee_rate: dec!(0.001),
            max_leverage: 1,
            contract_multiplier: dec!(1),
        };
        let size = size_position(dec!(200), None, dec!(2000), &spot);
        assert_eq!(size.contract_value_usd, dec!(199.8));
        assert_eq!(size.quantity, dec!(0.0999));
    }

    #[test]
    fn contract_multiplier_scales_quantity() {
        let mut params = futures();
        params.contract_multiplier = dec!(0.01);
        let size = size_position(dec!(100), Some(10), dec!(50000), &params);
        assert_eq!(size.quantity, dec!(1.9988));
    }

    #[test]
    fn margin_is_clamped_to_policy() {
        let policy = RiskPolicy::default();
        assert_eq!(margin_for(dec!(1000), dec!(0.1), &policy), dec!(100));
        assert_eq!(margin_for(dec!(1000), dec!(0.001), &policy), policy.min_investment_usd);
        assert_eq!(margin_for(dec!(100000), dec!(0.2), &policy), policy.max_investment_usd);
    }

    #[test]
    fn long_and_short_levels_mirror() {
        let long = levels(TradeAction::Long, dec!(100), dec!(0.02), dec!(2)).unwrap();
        assert_eq!(long.stop_loss, dec!(98));
        assert_eq!(long.take_profit, dec!(104));

        let short = levels(TradeAction::Sell, dec!(100), dec!(0.02), dec!(2)).unwrap();
        assert_eq!(short.stop_loss, dec!(102));
        assert_eq!(short.take_profit, dec!(96));

        assert!(levels(TradeAction::Hold, dec!(100), dec!(0.02), dec!(2)).is_none());
    }

    #[test]
    fn stop_distance_from_band_and_width() {
        assert_eq!(stop_distance(dec!(0.025), dec!(1.5)), dec!(0.0375));
        assert_eq!(liquidation_distance(10), Some(dec!(0.1)));
        assert_eq!(liquidation_distance(0), None);
    }

    #[test]
    fn stop_cap_shrinks_with_leverage() {
        let policy = RiskPolicy::default();
        assert_eq!(max_stop_distance(&policy, Some(5)), dec!(0.16));
        assert_eq!(max_stop_distance(&policy, Some(10)), dec!(0.08));
        assert_eq!(max_stop_distance(&policy, None), policy.max_spot_stop_distance_pct);
    }
}
