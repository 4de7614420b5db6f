//! Fill pricing, commissions, sizing and protective levels.
//!
//! Slippage always moves a fill against the trader: buys fill higher and
//! sells fill lower than the quoted price.

use crate::domain::position::Side;

/// Execution parameters shared by every fill in a simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionConfig {
    /// Fraction of notional, e.g. `0.001` for 10 bps.
    pub commission_rate: f64,
    pub slippage_percent: f64,
    /// Offset from entry in percent; `0` disables the level.
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            commission_rate: 0.001,
            slippage_percent: 0.0,
            stop_loss_percent: 0.0,
            take_profit_percent: 0.0,
        }
    }
}

/// A priced fill and the slippage cost it incurred.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub price: f64,
    pub commission: f64,
    pub slippage_cost: f64,
}

pub fn calculate_commission(price: f64, size: f64, rate: f64) -> f64 {
    price * size * rate
}

/// Long entry (buy): market × (1 + slippage%).
pub fn apply_slippage_long_entry(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 + slippage_pct / 100.0)
}

/// Short entry (sell short): market × (1 − slippage%).
pub fn apply_slippage_short_entry(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 - slippage_pct / 100.0)
}

/// Long exit (sell): market × (1 − slippage%).
pub fn apply_slippage_long_exit(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 - slippage_pct / 100.0)
}

/// Short exit (buy to cover): market × (1 + slippage%).
pub fn apply_slippage_short_exit(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 + slippage_pct / 100.0)
}

pub fn entry_price(side: Side, market_price: f64, slippage_pct: f64) -> f64 {
    match side {
        Side::Long => apply_slippage_long_entry(market_price, slippage_pct),
        Side::Short => apply_slippage_short_entry(market_price, slippage_pct),
    }
}

pub fn exit_price(side: Side, market_price: f64, slippage_pct: f64) -> f64 {
    match side {
        Side::Long => apply_slippage_long_exit(market_price, slippage_pct),
        Side::Short => apply_slippage_short_exit(market_price, slippage_pct),
    }
}

/// Units bought with `position_size_percent` of `equity` at `price`.
pub fn position_size(equity: f64, position_size_percent: f64, price: f64) -> f64 {
    if price <= 0.0 || equity <= 0.0 {
        return 0.0;
    }
    equity * position_size_percent / 100.0 / price
}

impl ExecutionConfig {
    pub fn entry_fill(&self, side: Side, market_price: f64, size: f64) -> Fill {
        let price = entry_price(side, market_price, self.slippage_percent);
        Fill {
            price,
            commission: calculate_commission(price, size, self.commission_rate),
            slippage_cost: (price - market_price).abs() * size,
        }
    }

    pub fn exit_fill(&self, side: Side, market_price: f64, size: f64) -> Fill {
        let price = exit_price(side, market_price, self.slippage_percent);
        Fill {
            price,
            commission: calculate_commission(price, size, self.commission_rate),
            slippage_cost: (price - market_price).abs() * size,
        }
    }

    /// Stop-loss and take-profit prices for an entry at `entry`.
    pub fn risk_levels(&self, side: Side, entry: f64) -> (Option<f64>, Option<f64>) {
        let offset = |pct: f64, sign: f64| {
            (pct > 0.0).then(|| entry * (1.0 + sign * pct / 100.0))
        };
        match side {
            Side::Long => (
                offset(self.stop_loss_percent, -1.0),
                offset(self.take_profit_percent, 1.0),
            ),
            Side::Short => (
                offset(self.stop_loss_percent, 1.0),
                offset(self.take_profit_percent, -1.0),
            ),
        }
    }
}
