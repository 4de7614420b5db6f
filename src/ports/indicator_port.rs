//! Indicator computation port trait.

use crate::domain::error::StratbenchError;
use crate::domain::indicator::{IndicatorConfig, IndicatorValues};
use crate::domain::ohlcv::Candle;

pub trait IndicatorProvider: Send + Sync {
    /// Compute every output series of `configs`, each aligned with `candles`.
    fn compute(
        &self,
        candles: &[Candle],
        configs: &[IndicatorConfig],
    ) -> Result<IndicatorValues, StratbenchError>;

    /// Whether the value at bar `i` depends only on bars `0..=i`.
    ///
    /// A causal provider lets callers compute once over a full series and read
    /// it through a bounded view. Providers that do not opt in are recomputed
    /// per bar over the window ending there.
    fn is_causal(&self) -> bool {
        false
    }
}
