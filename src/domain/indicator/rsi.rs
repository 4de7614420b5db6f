//! RSI (Relative Strength Index) indicator.
//!
//! Uses Wilder's smoothing for average gain/loss calculation:
//! - First average: simple mean of gains/losses over first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: first n bars are NaN.

use crate::domain::ohlcv::Candle;

pub fn calculate_rsi(candles: &[Candle], period: usize) -> Vec<f64> {
    let mut values = vec![f64::NAN; candles.len()];
    if period == 0 || candles.len() <= period {
        return values;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for i in 1..candles.len() {
        let change = candles[i].close - candles[i - 1].close;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        if i <= period {
            avg_gain += gain / period as f64;
            avg_loss += loss / period as f64;
            if i < period {
                continue;
            }
        } else {
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        }

        values[i] = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
        };
    }
    values
}
