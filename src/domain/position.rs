//! Open position tracking and stop-loss/take-profit checks.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::domain::ohlcv::Candle;
use crate::domain::rule::PositionSide;

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_rule_side(&self) -> PositionSide {
        match self {
            Side::Long => PositionSide::Long,
            Side::Short => PositionSide::Short,
        }
    }

    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Neutral,
    Long,
    Short,
}

impl From<Option<Side>> for PositionState {
    fn from(side: Option<Side>) -> Self {
        match side {
            None => PositionState::Neutral,
            Some(Side::Long) => PositionState::Long,
            Some(Side::Short) => PositionState::Short,
        }
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PositionState::Neutral => "NEUTRAL",
            PositionState::Long => "LONG",
            PositionState::Short => "SHORT",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub trade_id: u64,
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub size: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

/// Which protective level a bar breached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiskTrigger {
    StopLoss(f64),
    TakeProfit(f64),
}

impl Position {
    pub fn state(&self) -> PositionState {
        Some(self.side).into()
    }

    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }

    pub fn is_short(&self) -> bool {
        self.side == Side::Short
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.size * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) * self.size
    }

    /// Stop-loss hit within the bar's range (low for longs, high for shorts).
    pub fn should_stop_loss(&self, candle: &Candle) -> bool {
        match (self.stop_loss, self.side) {
            (None, _) => false,
            (Some(level), Side::Long) => candle.low <= level,
            (Some(level), Side::Short) => candle.high >= level,
        }
    }

    pub fn should_take_profit(&self, candle: &Candle) -> bool {
        match (self.take_profit, self.side) {
            (None, _) => false,
            (Some(level), Side::Long) => candle.high >= level,
            (Some(level), Side::Short) => candle.low <= level,
        }
    }

    /// The level breached on `candle`; stop-loss wins when both are hit.
    pub fn risk_trigger(&self, candle: &Candle) -> Option<RiskTrigger> {
        if self.should_stop_loss(candle) {
            self.stop_loss.map(RiskTrigger::StopLoss)
        } else if self.should_take_profit(candle) {
            self.take_profit.map(RiskTrigger::TakeProfit)
        } else {
            None
        }
    }
}
