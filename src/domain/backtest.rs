//! Multi-symbol backtest runner.
//!
//! Symbols are fetched one after another through the data port and then
//! simulated in parallel. Each simulation is independent; the aggregate result
//! is built from the union of their trades afterwards.

use std::sync::atomic::AtomicBool;

use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::equity::{drawdown_curve, equity_values, replay_equity, EquityPoint};
use crate::domain::error::StratbenchError;
use crate::domain::execution::ExecutionConfig;
use crate::domain::metrics::Metrics;
use crate::domain::ohlcv::{Candle, Timeframe};
use crate::domain::simulator::{SimulationConfig, SimulationOutput, Simulator};
use crate::domain::strategy_engine::StrategyEngine;
use crate::domain::trace::TraceRow;
use crate::domain::trade::Trade;
use crate::ports::data_port::DataPort;

/// Symbol label carried by the aggregate result.
pub const AGGREGATE_SYMBOL: &str = "ALL";

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub position_size_percent: f64,
    /// Fraction of notional per fill.
    pub commission_rate: f64,
    pub slippage_percent: f64,
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
    pub enable_short_selling: bool,
    pub record_trace: bool,
}

impl BacktestConfig {
    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            initial_capital: self.initial_capital,
            position_size_percent: self.position_size_percent,
            enable_short_selling: self.enable_short_selling,
            execution: ExecutionConfig {
                commission_rate: self.commission_rate,
                slippage_percent: self.slippage_percent,
                stop_loss_percent: self.stop_loss_percent,
                take_profit_percent: self.take_profit_percent,
            },
            record_trace: self.record_trace,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub symbol: String,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    /// Percent below the running peak, aligned with `equity_curve`.
    pub drawdown_curve: Vec<f64>,
    pub metrics: Metrics,
    pub trace: Option<Vec<TraceRow>>,
    pub cancelled: bool,
}

impl BacktestResult {
    pub fn from_simulation(symbol: &str, output: SimulationOutput, initial_capital: f64) -> Self {
        let drawdown_curve = drawdown_curve(&equity_values(&output.equity_curve));
        let metrics = Metrics::compute(&output.trades, &output.equity_curve, initial_capital);
        Self {
            symbol: symbol.to_string(),
            trades: output.trades,
            equity_curve: output.equity_curve,
            drawdown_curve,
            metrics,
            trace: output.trace,
            cancelled: output.cancelled,
        }
    }
}

/// A symbol left out of the run and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    /// Per-symbol results in configuration order.
    pub results: Vec<BacktestResult>,
    pub skipped: Vec<SkippedSymbol>,
    pub aggregate: BacktestResult,
}

impl BacktestReport {
    pub fn cancelled(&self) -> bool {
        self.aggregate.cancelled
    }
}

/// Errors that mean "this symbol's series can't be simulated" rather than a
/// fault in the run itself.
fn is_data_error(err: &StratbenchError) -> bool {
    matches!(
        err,
        StratbenchError::DataSource { .. }
            | StratbenchError::NoData { .. }
            | StratbenchError::InsufficientData { .. }
            | StratbenchError::UnsortedData { .. }
            | StratbenchError::Io(_)
    )
}

/// Combines per-symbol results into one portfolio-level result.
///
/// The aggregate equity curve starts at `initial_capital` at the earliest bar
/// of any symbol and adds every closed trade's net P&L in exit order.
pub fn aggregate(results: &[BacktestResult], start: DateTime<Utc>, initial_capital: f64) -> BacktestResult {
    let trades: Vec<Trade> = results.iter().flat_map(|r| r.trades.iter().cloned()).collect();
    let equity_curve = replay_equity(initial_capital, start, &trades);
    let drawdown_curve = drawdown_curve(&equity_values(&equity_curve));
    let metrics = Metrics::compute(&trades, &equity_curve, initial_capital);
    BacktestResult {
        symbol: AGGREGATE_SYMBOL.to_string(),
        trades,
        equity_curve,
        drawdown_curve,
        metrics,
        trace: None,
        cancelled: results.iter().any(|r| r.cancelled),
    }
}

pub fn run_backtest(
    config: &BacktestConfig,
    engine: &StrategyEngine,
    data: &dyn DataPort,
    cancel: Option<&AtomicBool>,
) -> Result<BacktestReport, StratbenchError> {
    if config.symbols.is_empty() {
        return Err(StratbenchError::ConfigMissing {
            section: "backtest".to_string(),
            key: "symbols".to_string(),
        });
    }
    info!(
        strategy = engine.name(),
        symbols = config.symbols.len(),
        timeframe = %config.timeframe,
        start = %config.start_date,
        end = %config.end_date,
        "starting backtest"
    );

    let mut skipped = Vec::new();
    let mut loaded: Vec<(&str, Vec<Candle>)> = Vec::with_capacity(config.symbols.len());
    for symbol in &config.symbols {
        match data.fetch_ohlcv(symbol, config.timeframe, config.start_date, config.end_date) {
            Ok(candles) => loaded.push((symbol.as_str(), candles)),
            Err(e) if is_data_error(&e) => {
                warn!(symbol = %symbol, error = %e, "skipping symbol");
                skipped.push(SkippedSymbol {
                    symbol: symbol.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    let sim_config = config.simulation_config();
    let simulator = Simulator::new(engine, &sim_config);
    let outcomes: Vec<(&str, Option<DateTime<Utc>>, Result<SimulationOutput, StratbenchError>)> = loaded
        .par_iter()
        .map(|(symbol, candles)| {
            let first = candles.first().map(|c| c.timestamp);
            (*symbol, first, simulator.run(symbol, candles, cancel))
        })
        .collect();

    let mut results = Vec::with_capacity(outcomes.len());
    let mut start: Option<DateTime<Utc>> = None;
    for (symbol, first, outcome) in outcomes {
        match outcome {
            Ok(output) => {
                start = match (start, first) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                results.push(BacktestResult::from_simulation(symbol, output, config.initial_capital));
            }
            Err(e) if is_data_error(&e) => {
                warn!(symbol, error = %e, "skipping symbol");
                skipped.push(SkippedSymbol {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    let Some(start) = start else {
        return Err(StratbenchError::NoData {
            symbol: config.symbols.join(","),
        });
    };
    let aggregate = aggregate(&results, start, config.initial_capital);
    info!(
        simulated = results.len(),
        skipped = skipped.len(),
        trades = aggregate.trades.len(),
        final_capital = aggregate.metrics.final_capital,
        cancelled = aggregate.cancelled,
        "backtest finished"
    );

    Ok(BacktestReport {
        results,
        skipped,
        aggregate,
    })
}
