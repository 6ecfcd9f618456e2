use rust_decimal::Decimal;

/// Margin bookkeeping for the short book (§4.2, §4.4). Required margin is
/// reserved out of cash when a short is opened and released when it is
/// covered; the engine is responsible for actually moving cash, this type
/// only computes the amount.
#[derive(Debug, Clone, Copy)]
pub struct MarginSchedule {
    pub margin_ratio: Decimal,
}

impl Default for MarginSchedule {
    fn default() -> Self {
        Self {
            margin_ratio: Decimal::new(5, 1), // 0.50
        }
    }
}

impl MarginSchedule {
    /// `short_notional * margin_ratio`.
    pub fn required_margin(&self, short_notional: Decimal) -> Decimal {
        short_notional * self.margin_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_margin_ratio_is_fifty_percent() {
        let schedule = MarginSchedule::default();
        assert_eq!(schedule.required_margin(dec!(100000)), dec!(50000));
    }
}
