//! Average True Range with Wilder smoothing.
//!
//! Seed: mean of the first n true ranges (the first bar's TR is high - low).
//! Then ATR[i] = (ATR[i-1] * (n-1) + TR[i]) / n.

use crate::domain::ohlcv::Candle;

pub fn calculate_atr(candles: &[Candle], period: usize) -> Vec<f64> {
    let mut values = vec![f64::NAN; candles.len()];
    if period == 0 || candles.len() < period {
        return values;
    }

    let tr: Vec<f64> = candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                c.high - c.low
            } else {
                c.true_range(candles[i - 1].close)
            }
        })
        .collect();

    let mut atr = tr[..period].iter().sum::<f64>() / period as f64;
    values[period - 1] = atr;
    for i in period..candles.len() {
        atr = (atr * (period - 1) as f64 + tr[i]) / period as f64;
        values[i] = atr;
    }
    values
}
