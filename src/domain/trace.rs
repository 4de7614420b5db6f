//! Bar-by-bar simulation trace and its reconstruction from trades.
//!
//! The trace is a projection: [`replay`] rebuilds the position and equity
//! columns from the trade list and candles alone.

use chrono::{DateTime, Utc};

use crate::domain::decision::Action;
use crate::domain::ohlcv::Candle;
use crate::domain::position::{PositionState, Side};
use crate::domain::trade::Trade;

/// Position and P&L columns after a bar was processed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarState {
    pub timestamp: DateTime<Utc>,
    pub state: PositionState,
    /// Initial capital plus net P&L of trades closed so far.
    pub equity: f64,
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceRow {
    pub candle: Candle,
    /// Indicator values visible at this bar, sorted by name.
    pub indicators: Vec<(String, f64)>,
    /// `None` when no decision was requested (risk close on this bar).
    pub action: Option<Action>,
    pub reason: String,
    pub after: BarState,
}

pub fn unrealized_pnl(side: Side, entry_price: f64, size: f64, price: f64) -> f64 {
    side.sign() * (price - entry_price) * size
}

/// Rebuilds per-bar state from `trades`.
///
/// A trade counts as open at bar `t` when `entry_time <= t < exit_time`, and
/// its P&L is realized at the bar stamped `exit_time`.
pub fn replay(candles: &[Candle], trades: &[Trade], initial_capital: f64) -> Vec<BarState> {
    let mut ordered: Vec<&Trade> = trades.iter().collect();
    ordered.sort_by_key(|t| (t.entry_time, t.id));

    let mut next = 0;
    let mut equity = initial_capital;
    candles
        .iter()
        .map(|candle| {
            let t = candle.timestamp;
            while let Some(trade) = ordered.get(next) {
                match trade.exit_time {
                    Some(exit) if exit <= t => {
                        equity += trade.pnl;
                        next += 1;
                    }
                    _ => break,
                }
            }
            let open = ordered.get(next).filter(|trade| trade.open_at(t));
            BarState {
                timestamp: t,
                state: open.map(|trade| trade.position_type).into(),
                equity,
                unrealized_pnl: open
                    .map(|trade| {
                        unrealized_pnl(trade.position_type, trade.entry_price, trade.size, candle.close)
                    })
                    .unwrap_or(0.0),
            }
        })
        .collect()
}
