//! Built-in indicator provider backed by the domain indicator functions.

use crate::domain::error::StratbenchError;
use crate::domain::indicator::atr::calculate_atr;
use crate::domain::indicator::bollinger::calculate_bollinger;
use crate::domain::indicator::macd::calculate_macd;
use crate::domain::indicator::roc::calculate_roc;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::stddev::calculate_stddev;
use crate::domain::indicator::{
    IndicatorConfig, IndicatorKind, IndicatorValues, calculate_ema, calculate_sma,
};
use crate::domain::ohlcv::Candle;
use crate::ports::indicator_port::IndicatorProvider;

#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinIndicators;

impl BuiltinIndicators {
    pub fn new() -> Self {
        Self
    }
}

/// Output series of one indicator, in the order of `IndicatorKind::output_suffixes`.
fn series_for(kind: &IndicatorKind, candles: &[Candle]) -> Vec<Vec<f64>> {
    match *kind {
        IndicatorKind::Sma(p) => vec![calculate_sma(candles, p)],
        IndicatorKind::Ema(p) => vec![calculate_ema(candles, p)],
        IndicatorKind::Rsi(p) => vec![calculate_rsi(candles, p)],
        IndicatorKind::Roc(p) => vec![calculate_roc(candles, p)],
        IndicatorKind::Atr(p) => vec![calculate_atr(candles, p)],
        IndicatorKind::Stddev(p) => vec![calculate_stddev(candles, p)],
        IndicatorKind::Macd { fast, slow, signal } => {
            let macd = calculate_macd(candles, fast, slow, signal);
            vec![macd.line, macd.signal, macd.histogram]
        }
        IndicatorKind::Bollinger {
            period,
            stddev_mult,
        } => {
            let bb = calculate_bollinger(candles, period, stddev_mult);
            vec![bb.upper, bb.middle, bb.lower]
        }
    }
}

fn check_params(config: &IndicatorConfig) -> Result<(), StratbenchError> {
    config.kind.validate().map_err(|reason| StratbenchError::Indicator {
        name: config.name.clone(),
        reason,
    })
}

impl IndicatorProvider for BuiltinIndicators {
    fn compute(
        &self,
        candles: &[Candle],
        configs: &[IndicatorConfig],
    ) -> Result<IndicatorValues, StratbenchError> {
        let mut values = IndicatorValues::new();
        for config in configs {
            check_params(config)?;
            let names = config.output_names();
            for (name, series) in names.into_iter().zip(series_for(&config.kind, candles)) {
                values.insert(name, series);
            }
        }
        Ok(values)
    }

    fn is_causal(&self) -> bool {
        true
    }
}
