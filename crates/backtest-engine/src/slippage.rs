use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Everything a [`SlippageModel`] needs to turn a reference price into an
/// actual fill price (§4.2). Fields a given model doesn't use are simply
/// ignored by it — callers pass whatever market context they have.
#[derive(Debug, Clone, Copy, Default)]
pub struct FillContext {
    pub order_shares: Decimal,
    pub reference_price: Decimal,
    pub is_buy: bool,
    pub avg_volume: Option<f64>,
    pub volatility: Option<f64>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

impl FillContext {
    pub fn order_notional(&self) -> Decimal {
        self.reference_price * self.order_shares
    }
}

/// A single capability: turn a reference price into an actual fill price
/// given the order direction and whatever market context is available.
pub trait SlippageModel: Send + Sync {
    fn actual_price(&self, ctx: &FillContext) -> Decimal;
}

fn sign(is_buy: bool) -> f64 {
    if is_buy {
        1.0
    } else {
        -1.0
    }
}

fn apply_fraction(reference: Decimal, fraction: f64) -> Decimal {
    let base = reference.to_f64().unwrap_or(0.0);
    Decimal::from_f64(base * (1.0 + fraction)).unwrap_or(reference)
}

/// Model 1: `ref * (1 ± pct)`.
#[derive(Debug, Clone, Copy)]
pub struct FixedSlippage {
    pub pct: f64,
}

impl SlippageModel for FixedSlippage {
    fn actual_price(&self, ctx: &FillContext) -> Decimal {
        apply_fraction(ctx.reference_price, sign(ctx.is_buy) * self.pct)
    }
}

/// Model 2: `slip = base + k * sqrt(order / avg_volume)`, clipped to
/// `max_slip`, sign from direction.
#[derive(Debug, Clone, Copy)]
pub struct VolumeBasedSlippage {
    pub base: f64,
    pub k: f64,
    pub max_slip: f64,
}

impl SlippageModel for VolumeBasedSlippage {
    fn actual_price(&self, ctx: &FillContext) -> Decimal {
        let order = ctx.order_shares.to_f64().unwrap_or(0.0);
        let adv = ctx.avg_volume.unwrap_or(0.0);
        let participation = if adv > 0.0 { (order / adv).max(0.0) } else { 0.0 };
        let slip = (self.base + self.k * participation.sqrt()).min(self.max_slip);
        apply_fraction(ctx.reference_price, sign(ctx.is_buy) * slip)
    }
}

/// Model 3: square-root market impact, `slip = volatility_weight *
/// volatility * participation_rate^alpha * urgency_factor`, clipped to
/// `max_slip`.
#[derive(Debug, Clone, Copy)]
pub struct MarketImpactSlippage {
    pub volatility_weight: f64,
    pub alpha: f64,
    pub urgency_factor: f64,
    pub max_slip: f64,
}

impl SlippageModel for MarketImpactSlippage {
    fn actual_price(&self, ctx: &FillContext) -> Decimal {
        let order = ctx.order_shares.to_f64().unwrap_or(0.0);
        let adv = ctx.avg_volume.unwrap_or(0.0);
        let participation = if adv > 0.0 { (order / adv).max(0.0) } else { 0.0 };
        let volatility = ctx.volatility.unwrap_or(0.0);
        let slip = (self.volatility_weight * volatility * participation.powf(self.alpha) * self.urgency_factor)
            .min(self.max_slip);
        apply_fraction(ctx.reference_price, sign(ctx.is_buy) * slip)
    }
}

/// Model 4: if bid/ask are available, buy executes at ask, sell at bid;
/// otherwise `half_spread = base_spread/2 + volatility_factor *
/// volatility`, applied symmetrically like [`FixedSlippage`].
#[derive(Debug, Clone, Copy)]
pub struct BidAskSpreadSlippage {
    pub base_spread: f64,
    pub volatility_factor: f64,
}

impl SlippageModel for BidAskSpreadSlippage {
    fn actual_price(&self, ctx: &FillContext) -> Decimal {
        match (ctx.bid, ctx.ask) {
            (Some(bid), Some(ask)) => {
                if ctx.is_buy {
                    ask
                } else {
                    bid
                }
            }
            _ => {
                let volatility = ctx.volatility.unwrap_or(0.0);
                let half_spread = self.base_spread / 2.0 + self.volatility_factor * volatility;
                apply_fraction(ctx.reference_price, sign(ctx.is_buy) * half_spread)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ctx(is_buy: bool) -> FillContext {
        FillContext {
            order_shares: dec!(1000),
            reference_price: dec!(100),
            is_buy,
            avg_volume: Some(100_000.0),
            volatility: Some(0.02),
            bid: None,
            ask: None,
        }
    }

    #[test]
    fn fixed_slippage_applies_signed_pct() {
        let model = FixedSlippage { pct: 0.001 };
        let buy = model.actual_price(&ctx(true));
        let sell = model.actual_price(&ctx(false));
        assert!(buy > dec!(100));
        assert!(sell < dec!(100));
    }

    #[test]
    fn volume_based_slippage_clips_to_max() {
        let model = VolumeBasedSlippage {
            base: 0.0,
            k: 10.0,
            max_slip: 0.01,
        };
        let mut c = ctx(true);
        c.order_shares = dec!(90000); // large participation forces the clip
        let filled = model.actual_price(&c);
        let expected_max = dec!(100) * dec!(1.01);
        assert_eq!(filled, expected_max);
    }

    #[test]
    fn bid_ask_prefers_quoted_side_when_available() {
        let model = BidAskSpreadSlippage {
            base_spread: 0.002,
            volatility_factor: 0.1,
        };
        let mut c = ctx(true);
        c.bid = Some(dec!(99.9));
        c.ask = Some(dec!(100.1));
        assert_eq!(model.actual_price(&c), dec!(100.1));
        c.is_buy = false;
        assert_eq!(model.actual_price(&c), dec!(99.9));
    }

    #[test]
    fn bid_ask_falls_back_to_half_spread_without_quotes() {
        let model = BidAskSpreadSlippage {
            base_spread: 0.002,
            volatility_factor: 0.1,
        };
        let filled = model.actual_price(&ctx(true));
        assert!(filled > dec!(100));
    }
}
