//! Standard Deviation indicator.
//!
//! Population standard deviation over n closing prices.
//! STDDEV(n)[i] = sqrt(sum((C[i-j] - SMA(n)[i])^2 for j in 0..n-1) / n)
//! Warmup: first (n-1) bars are NaN.

use crate::domain::ohlcv::Candle;

pub fn calculate_stddev(candles: &[Candle], period: usize) -> Vec<f64> {
    (0..candles.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                return f64::NAN;
            }
            let window = &candles[i + 1 - period..=i];
            let mean = window.iter().map(|c| c.close).sum::<f64>() / period as f64;
            let variance = window
                .iter()
                .map(|c| {
                    let diff = c.close - mean;
                    diff * diff
                })
                .sum::<f64>()
                / period as f64;
            variance.sqrt()
        })
        .collect()
}
