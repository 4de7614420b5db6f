//! Historical market data port trait.

use chrono::NaiveDate;

use crate::domain::error::StratbenchError;
use crate::domain::ohlcv::{Candle, Timeframe};

pub trait DataPort {
    /// Candles for `symbol` whose timestamps fall within `start..=end` (UTC dates),
    /// in ascending time order.
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>, StratbenchError>;
}
