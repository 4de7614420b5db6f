//! ROC (Rate of Change) indicator.
//!
//! ROC(n)[i] = ((C[i] - C[i-n]) / C[i-n]) * 100
//! If C[i-n] == 0: ROC = 0
//! Warmup: first n bars are NaN.

use crate::domain::ohlcv::Candle;

pub fn calculate_roc(candles: &[Candle], period: usize) -> Vec<f64> {
    (0..candles.len())
        .map(|i| {
            if period == 0 || i < period {
                return f64::NAN;
            }
            let prev_close = candles[i - period].close;
            if prev_close == 0.0 {
                0.0
            } else {
                (candles[i].close - prev_close) / prev_close * 100.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::candles_from_closes;

    #[test]
    fn roc_basic() {
        let candles = candles_from_closes(&[100.0, 105.0, 110.0]);
        let roc = calculate_roc(&candles, 2);
        assert!(roc[0].is_nan());
        assert!(roc[1].is_nan());
        assert!((roc[2] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn roc_zero_base() {
        let candles = candles_from_closes(&[0.0, 5.0]);
        let roc = calculate_roc(&candles, 1);
        assert_eq!(roc[1], 0.0);
    }
}
