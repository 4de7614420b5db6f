//! Simple Moving Average indicator.
//!
//! SMA(n)[i] = sum(C[i-n+1..=i]) / n, maintained as a running sum.
//! Warmup: first (n-1) bars are NaN.

use crate::domain::ohlcv::Candle;

pub fn calculate_sma(candles: &[Candle], period: usize) -> Vec<f64> {
    let mut values = vec![f64::NAN; candles.len()];
    if period == 0 {
        return values;
    }

    let mut sum = 0.0;
    for (i, candle) in candles.iter().enumerate() {
        sum += candle.close;
        if i >= period {
            sum -= candles[i - period].close;
        }
        if i + 1 >= period {
            values[i] = sum / period as f64;
        }
    }
    values
}
