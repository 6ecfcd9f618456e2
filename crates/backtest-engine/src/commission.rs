use rust_decimal::Decimal;

/// Flat commission + stamp-tax schedule for A-share style trading (§4.2).
/// Both sides pay commission; only sells pay stamp tax — the zero-stamp-
/// on-buy invariant is fixed, not configurable.
#[derive(Debug, Clone, Copy)]
pub struct CommissionSchedule {
    pub commission_rate: Decimal,
    pub min_commission: Decimal,
    pub stamp_tax_rate: Decimal,
}

impl Default for CommissionSchedule {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::new(3, 4),    // 0.0003
            min_commission: Decimal::new(5, 0),     // 5.0
            stamp_tax_rate: Decimal::new(1, 3),      // 0.001
        }
    }
}

impl CommissionSchedule {
    /// `max(notional * commission_rate, min_commission)`, charged on both
    /// buy and sell.
    pub fn commission(&self, notional: Decimal) -> Decimal {
        (notional * self.commission_rate).max(self.min_commission)
    }

    /// Stamp tax: sell-side only, `notional * stamp_tax_rate`.
    pub fn stamp_tax(&self, notional: Decimal, is_sell: bool) -> Decimal {
        if is_sell {
            notional * self.stamp_tax_rate
        } else {
            Decimal::ZERO
        }
    }

    /// Total trading cost for one fill (commission + stamp tax).
    pub fn total_cost(&self, notional: Decimal, is_sell: bool) -> Decimal {
        self.commission(notional) + self.stamp_tax(notional, is_sell)
    }
}
