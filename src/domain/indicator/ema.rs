//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) bars are NaN.

use crate::domain::ohlcv::Candle;

pub fn calculate_ema(candles: &[Candle], period: usize) -> Vec<f64> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    ema_of(&closes, period)
}

/// EMA over an arbitrary series; leading NaN values are skipped before seeding.
pub fn ema_of(series: &[f64], period: usize) -> Vec<f64> {
    let mut values = vec![f64::NAN; series.len()];
    if period == 0 {
        return values;
    }

    let first = match series.iter().position(|v| !v.is_nan()) {
        Some(i) => i,
        None => return values,
    };

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (offset, &x) in series[first..].iter().enumerate() {
        let i = first + offset;
        if offset < period - 1 {
            sum += x;
        } else if offset == period - 1 {
            sum += x;
            ema = sum / period as f64;
            values[i] = ema;
        } else {
            ema = x * k + ema * (1.0 - k);
            values[i] = ema;
        }
    }
    values
}
