//! Bollinger Bands indicator.
//!
//! - Middle: SMA over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is the population standard deviation.
//! Warmup: first (period-1) bars are NaN.

use crate::domain::indicator::sma::calculate_sma;
use crate::domain::indicator::stddev::calculate_stddev;
use crate::domain::ohlcv::Candle;

#[derive(Debug, Clone)]
pub struct BollingerSeries {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn calculate_bollinger(candles: &[Candle], period: usize, mult: f64) -> BollingerSeries {
    let middle = calculate_sma(candles, period);
    let sd = calculate_stddev(candles, period);

    let upper = middle.iter().zip(&sd).map(|(m, s)| m + mult * s).collect();
    let lower = middle.iter().zip(&sd).map(|(m, s)| m - mult * s).collect();

    BollingerSeries {
        upper,
        middle,
        lower,
    }
}
