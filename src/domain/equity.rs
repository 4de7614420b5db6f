//! Realized equity curve and drawdown series.

use chrono::{DateTime, Utc};

use crate::domain::trade::Trade;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

pub fn equity_values(curve: &[EquityPoint]) -> Vec<f64> {
    curve.iter().map(|p| p.equity).collect()
}

/// Percent below the running peak at each point; 0 at new highs.
pub fn drawdown_curve(equity: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    equity
        .iter()
        .map(|&e| {
            peak = peak.max(e);
            if peak > 0.0 {
                ((peak - e) / peak * 100.0).max(0.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Rebuilds the realized equity curve from closed trades.
///
/// The first point is `initial_capital` at `start`; every closed trade adds a
/// point at its exit time, in exit order.
pub fn replay_equity(initial_capital: f64, start: DateTime<Utc>, trades: &[Trade]) -> Vec<EquityPoint> {
    let mut closed: Vec<&Trade> = trades.iter().filter(|t| t.is_closed()).collect();
    closed.sort_by_key(|t| (t.exit_time, t.id));

    let mut equity = initial_capital;
    let mut curve = Vec::with_capacity(closed.len() + 1);
    curve.push(EquityPoint {
        timestamp: start,
        equity,
    });
    for trade in closed {
        equity += trade.pnl;
        curve.push(EquityPoint {
            timestamp: trade.exit_time.unwrap_or(start),
            equity,
        });
    }
    curve
}
