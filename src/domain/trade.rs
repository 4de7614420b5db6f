//! Trade records: opened once, closed exactly once.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::domain::error::StratbenchError;
use crate::domain::position::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    SignalReversal,
    ExitSignal,
    EndOfData,
    Cancelled,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExitReason::StopLoss => "Stop Loss Hit",
            ExitReason::TakeProfit => "Take Profit Hit",
            ExitReason::SignalReversal => "Signal Reversal",
            ExitReason::ExitSignal => "Exit Signal",
            ExitReason::EndOfData => "End of Data",
            ExitReason::Cancelled => "Cancelled",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: u64,
    pub symbol: String,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
    pub position_type: Side,
    pub size: f64,
    /// Net of commission on both legs; zero while open.
    pub pnl: f64,
    pub pnl_pct: f64,
    pub commission: f64,
    /// Cost of adverse fills versus the quoted price, both legs.
    pub slippage: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub metadata: BTreeMap<String, String>,
}

/// Entry leg of a new trade.
#[derive(Debug, Clone)]
pub struct TradeEntry {
    pub id: u64,
    pub symbol: String,
    pub side: Side,
    pub time: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
    pub commission: f64,
    pub slippage: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

/// Exit leg applied by [`Trade::close`].
#[derive(Debug, Clone, Copy)]
pub struct TradeExit {
    pub time: DateTime<Utc>,
    pub price: f64,
    pub commission: f64,
    pub slippage: f64,
    pub reason: ExitReason,
}

impl Trade {
    pub fn open(entry: TradeEntry) -> Self {
        Self {
            id: entry.id,
            symbol: entry.symbol,
            entry_time: entry.time,
            entry_price: entry.price,
            exit_time: None,
            exit_price: None,
            position_type: entry.side,
            size: entry.size,
            pnl: 0.0,
            pnl_pct: 0.0,
            commission: entry.commission,
            slippage: entry.slippage,
            stop_loss: entry.stop_loss,
            take_profit: entry.take_profit,
            exit_reason: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.exit_time.is_some()
    }

    pub fn close(&mut self, exit: TradeExit) -> Result<(), StratbenchError> {
        if self.is_closed() {
            return Err(StratbenchError::TradeAlreadyClosed { id: self.id });
        }
        self.commission += exit.commission;
        self.slippage += exit.slippage;
        let gross = self.position_type.sign() * (exit.price - self.entry_price) * self.size;
        self.pnl = gross - self.commission;
        let notional = self.entry_price * self.size;
        self.pnl_pct = if notional > 0.0 {
            self.pnl / notional * 100.0
        } else {
            0.0
        };
        self.exit_time = Some(exit.time);
        self.exit_price = Some(exit.price);
        self.exit_reason = Some(exit.reason);
        Ok(())
    }

    /// Holding time in hours, once closed.
    pub fn duration_hours(&self) -> Option<f64> {
        self.exit_time
            .map(|exit| (exit - self.entry_time).num_seconds() as f64 / 3600.0)
    }

    /// Whether the trade was open after bar time `t` was processed.
    pub fn open_at(&self, t: DateTime<Utc>) -> bool {
        self.entry_time <= t && self.exit_time.is_none_or(|exit| t < exit)
    }
}
