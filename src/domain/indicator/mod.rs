//! Technical indicator configuration and aligned value series.
//!
//! - `IndicatorKind`: indicator identity + parameters
//! - `IndicatorConfig`: a named indicator instance in a strategy
//! - `IndicatorValues`: output series keyed by name, aligned with the candles
//! - `IndicatorView`: a read-only view bounded at the current bar
//!
//! Series are `f64` with `NaN` marking warm-up bars.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stddev;

use std::collections::HashMap;
use std::fmt;

pub use ema::calculate_ema;
pub use sma::calculate_sma;

/// Indicator output series keyed by output name.
pub type IndicatorValues = HashMap<String, Vec<f64>>;

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorKind {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Roc(usize),
    Atr(usize),
    Stddev(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult: f64,
    },
}

impl IndicatorKind {
    /// Suffixes appended to the configured name for each output series.
    pub fn output_suffixes(&self) -> &'static [&'static str] {
        match self {
            IndicatorKind::Macd { .. } => &["", "_signal", "_hist"],
            IndicatorKind::Bollinger { .. } => &["_upper", "_middle", "_lower"],
            _ => &[""],
        }
    }

    /// Rejects parameters no series can be computed from.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            IndicatorKind::Sma(0)
            | IndicatorKind::Ema(0)
            | IndicatorKind::Rsi(0)
            | IndicatorKind::Roc(0)
            | IndicatorKind::Atr(0)
            | IndicatorKind::Stddev(0) => Err("period must be at least 1".to_string()),
            IndicatorKind::Macd { fast, slow, signal } if fast == 0 || signal == 0 || fast >= slow => {
                Err(format!("invalid MACD periods {}/{}/{}", fast, slow, signal))
            }
            IndicatorKind::Bollinger {
                period,
                stddev_mult,
            } if period == 0 || !(stddev_mult > 0.0) => {
                Err(format!("invalid Bollinger parameters {}/{}", period, stddev_mult))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorKind::Sma(period) => write!(f, "SMA({})", period),
            IndicatorKind::Ema(period) => write!(f, "EMA({})", period),
            IndicatorKind::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorKind::Roc(period) => write!(f, "ROC({})", period),
            IndicatorKind::Atr(period) => write!(f, "ATR({})", period),
            IndicatorKind::Stddev(period) => write!(f, "STDDEV({})", period),
            IndicatorKind::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorKind::Bollinger {
                period,
                stddev_mult,
            } => write!(f, "BOLLINGER({},{})", period, stddev_mult),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub name: String,
    pub kind: IndicatorKind,
}

impl IndicatorConfig {
    pub fn new(name: impl Into<String>, kind: IndicatorKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn output_names(&self) -> Vec<String> {
        self.kind
            .output_suffixes()
            .iter()
            .map(|suffix| format!("{}{}", self.name, suffix))
            .collect()
    }
}

/// Indicator series visible up to (and including) bar `len - 1`.
///
/// Lookups past the bound return `None`, so a decision at bar `i` cannot read
/// values computed for later bars even when the backing series is longer.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorView<'a> {
    values: &'a IndicatorValues,
    len: usize,
}

impl<'a> IndicatorView<'a> {
    pub fn new(values: &'a IndicatorValues, len: usize) -> Self {
        Self { values, len }
    }

    pub fn full(values: &'a IndicatorValues) -> Self {
        let len = values.values().map(Vec::len).max().unwrap_or(0);
        Self { values, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Value of `name` at `index`; `None` if unknown, out of view, or NaN.
    pub fn get(&self, name: &str, index: usize) -> Option<f64> {
        if index >= self.len {
            return None;
        }
        let v = *self.values.get(name)?.get(index)?;
        if v.is_nan() { None } else { Some(v) }
    }

    /// Snapshot of every series at `index` (NaN where unavailable).
    pub fn snapshot(&self, index: usize) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = self
            .values
            .keys()
            .map(|name| (name.clone(), self.get(name, index).unwrap_or(f64::NAN)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_kind_display() {
        assert_eq!(IndicatorKind::Sma(20).to_string(), "SMA(20)");
        let macd = IndicatorKind::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        };
        assert_eq!(macd.to_string(), "MACD(12,26,9)");
        let boll = IndicatorKind::Bollinger {
            period: 20,
            stddev_mult: 2.0,
        };
        assert_eq!(boll.to_string(), "BOLLINGER(20,2)");
    }

    #[test]
    fn kind_parameters_validated() {
        assert!(IndicatorKind::Sma(1).validate().is_ok());
        assert!(IndicatorKind::Atr(0).validate().is_err());
        let flipped = IndicatorKind::Macd {
            fast: 26,
            slow: 12,
            signal: 9,
        };
        assert!(flipped.validate().unwrap_err().contains("MACD"));
        let flat = IndicatorKind::Bollinger {
            period: 20,
            stddev_mult: f64::NAN,
        };
        assert!(flat.validate().is_err());
    }

    #[test]
    fn output_names_for_multi_series_indicators() {
        let macd = IndicatorConfig::new(
            "macd",
            IndicatorKind::Macd {
                fast: 12,
                slow: 26,
                signal: 9,
            },
        );
        assert_eq!(macd.output_names(), vec!["macd", "macd_signal", "macd_hist"]);

        let bb = IndicatorConfig::new(
            "bb",
            IndicatorKind::Bollinger {
                period: 20,
                stddev_mult: 2.0,
            },
        );
        assert_eq!(bb.output_names(), vec!["bb_upper", "bb_middle", "bb_lower"]);

        let sma = IndicatorConfig::new("fast", IndicatorKind::Sma(5));
        assert_eq!(sma.output_names(), vec!["fast"]);
    }

    #[test]
    fn view_is_bounded() {
        let mut values = IndicatorValues::new();
        values.insert("x".into(), vec![1.0, 2.0, 3.0]);
        let view = IndicatorView::new(&values, 2);

        assert_eq!(view.get("x", 0), Some(1.0));
        assert_eq!(view.get("x", 1), Some(2.0));
        assert_eq!(view.get("x", 2), None);
        assert_eq!(view.get("missing", 0), None);
    }

    #[test]
    fn view_hides_nan() {
        let mut values = IndicatorValues::new();
        values.insert("x".into(), vec![f64::NAN, 2.0]);
        let view = IndicatorView::full(&values);

        assert_eq!(view.len(), 2);
        assert_eq!(view.get("x", 0), None);
        assert_eq!(view.get("x", 1), Some(2.0));
    }

    #[test]
    fn snapshot_sorted_by_name() {
        let mut values = IndicatorValues::new();
        values.insert("b".into(), vec![2.0]);
        values.insert("a".into(), vec![1.0]);
        let view = IndicatorView::full(&values);
        let snap = view.snapshot(0);
        assert_eq!(snap[0].0, "a");
        assert_eq!(snap[1].0, "b");
    }
}
