//! Bar-by-bar trade simulation for a single symbol.
//!
//! Per bar, in order:
//! 1. Stop-loss / take-profit check against the bar's range. A risk close
//!    skips decision-seeking for the rest of the bar.
//! 2. Decision from the strategy engine, seeing bars `..=i` only.
//! 3. Exit signal closes a position on the matching side.
//! 4. A target state different from the current one closes the position.
//! 5. A directional target opens a position when flat.
//! 6. The last bar force-closes whatever is still open.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use crate::domain::decision::{Action, Decision};
use crate::domain::equity::EquityPoint;
use crate::domain::error::StratbenchError;
use crate::domain::execution::{ExecutionConfig, entry_price, position_size};
use crate::domain::indicator::{IndicatorValues, IndicatorView};
use crate::domain::ohlcv::{Candle, first_unsorted_index};
use crate::domain::position::{Position, PositionState, RiskTrigger, Side};
use crate::domain::strategy_engine::StrategyEngine;
use crate::domain::trace::{BarState, TraceRow};
use crate::domain::trade::{ExitReason, Trade, TradeEntry, TradeExit};

/// Minimum number of bars a symbol needs to be simulated.
pub const MIN_BARS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub initial_capital: f64,
    pub position_size_percent: f64,
    pub enable_short_selling: bool,
    pub execution: ExecutionConfig,
    pub record_trace: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            position_size_percent: 10.0,
            enable_short_selling: false,
            execution: ExecutionConfig::default(),
            record_trace: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimulationOutput {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub trace: Option<Vec<TraceRow>>,
    pub cancelled: bool,
}

/// Checks that `candles` can be simulated.
pub fn validate_series(symbol: &str, candles: &[Candle]) -> Result<(), StratbenchError> {
    if candles.is_empty() {
        return Err(StratbenchError::NoData {
            symbol: symbol.to_string(),
        });
    }
    if candles.len() < MIN_BARS {
        return Err(StratbenchError::InsufficientData {
            symbol: symbol.to_string(),
            bars: candles.len(),
            minimum: MIN_BARS,
        });
    }
    if let Some(index) = first_unsorted_index(candles) {
        return Err(StratbenchError::UnsortedData {
            symbol: symbol.to_string(),
            index,
        });
    }
    Ok(())
}

pub struct Simulator<'a> {
    engine: &'a StrategyEngine,
    config: &'a SimulationConfig,
}

struct OpenTrade {
    position: Position,
    trade: Trade,
}

/// Mutable state of one symbol's run.
struct Book<'a> {
    symbol: &'a str,
    config: &'a SimulationConfig,
    equity: f64,
    open: Option<OpenTrade>,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    next_id: u64,
}

impl<'a> Book<'a> {
    fn new(symbol: &'a str, config: &'a SimulationConfig, start: DateTime<Utc>) -> Self {
        Self {
            symbol,
            config,
            equity: config.initial_capital,
            open: None,
            trades: Vec::new(),
            equity_curve: vec![EquityPoint {
                timestamp: start,
                equity: config.initial_capital,
            }],
            next_id: 1,
        }
    }

    fn side(&self) -> Option<Side> {
        self.open.as_ref().map(|o| o.position.side)
    }

    fn open_position(&mut self, side: Side, bar: &Candle, decision: &Decision) {
        let exec = &self.config.execution;
        let fill_price = entry_price(side, bar.close, exec.slippage_percent);
        let size = position_size(self.equity, self.config.position_size_percent, fill_price);
        if size <= 0.0 {
            tracing::debug!(symbol = self.symbol, equity = self.equity, "position size is zero, not opening");
            return;
        }
        let fill = exec.entry_fill(side, bar.close, size);
        let (stop_loss, take_profit) = exec.risk_levels(side, fill.price);
        let id = self.next_id;
        self.next_id += 1;

        let mut trade = Trade::open(TradeEntry {
            id,
            symbol: self.symbol.to_string(),
            side,
            time: bar.timestamp,
            price: fill.price,
            size,
            commission: fill.commission,
            slippage: fill.slippage_cost,
            stop_loss,
            take_profit,
        });
        trade.metadata.insert("entry_reason".into(), decision.reason.clone());
        trade
            .metadata
            .insert("confidence".into(), format!("{:.4}", decision.confidence));

        tracing::debug!(
            symbol = self.symbol,
            trade_id = id,
            side = %side,
            price = fill.price,
            size,
            "opened position"
        );
        self.open = Some(OpenTrade {
            position: Position {
                trade_id: id,
                side,
                entry_price: fill.price,
                entry_time: bar.timestamp,
                size,
                stop_loss,
                take_profit,
            },
            trade,
        });
    }

    /// Closes the open position at `market_price`; no-op when flat.
    fn close_position(
        &mut self,
        market_price: f64,
        time: DateTime<Utc>,
        reason: ExitReason,
    ) -> Result<(), StratbenchError> {
        let Some(OpenTrade { position, mut trade }) = self.open.take() else {
            return Ok(());
        };
        let fill = self
            .config
            .execution
            .exit_fill(position.side, market_price, position.size);
        trade.close(TradeExit {
            time,
            price: fill.price,
            commission: fill.commission,
            slippage: fill.slippage_cost,
            reason,
        })?;

        self.equity += trade.pnl;
        self.equity_curve.push(EquityPoint {
            timestamp: time,
            equity: self.equity,
        });
        tracing::debug!(
            symbol = self.symbol,
            trade_id = trade.id,
            price = fill.price,
            pnl = trade.pnl,
            reason = %reason,
            "closed position"
        );
        self.trades.push(trade);
        Ok(())
    }

    fn bar_state(&self, bar: &Candle) -> BarState {
        BarState {
            timestamp: bar.timestamp,
            state: self.side().into(),
            equity: self.equity,
            unrealized_pnl: self
                .open
                .as_ref()
                .map(|o| o.position.unrealized_pnl(bar.close))
                .unwrap_or(0.0),
        }
    }
}

/// Position the decision asks for; `None` keeps the current state.
fn target_state(decision: &Decision, shorting: bool) -> Option<PositionState> {
    match decision.action {
        Action::Buy => Some(PositionState::Long),
        Action::Sell if shorting => Some(PositionState::Short),
        Action::Sell => Some(PositionState::Neutral),
        Action::Hold => None,
    }
}

impl<'a> Simulator<'a> {
    pub fn new(engine: &'a StrategyEngine, config: &'a SimulationConfig) -> Self {
        Self { engine, config }
    }

    /// Simulates `candles` for `symbol`.
    ///
    /// Fails only on unusable input; per-bar engine errors become HOLD
    /// decisions. When `cancel` is raised the open position is closed at the
    /// current bar and the partial result is returned with `cancelled` set.
    pub fn run(
        &self,
        symbol: &str,
        candles: &[Candle],
        cancel: Option<&AtomicBool>,
    ) -> Result<SimulationOutput, StratbenchError> {
        validate_series(symbol, candles)?;

        // Causal providers are computed once and read through a view bounded
        // at the current bar.
        let cached: Option<Result<IndicatorValues, String>> = self.engine.is_causal().then(|| {
            self.engine
                .compute_indicators(candles)
                .map_err(|e| e.to_string())
        });
        if let Some(Err(reason)) = &cached {
            tracing::warn!(symbol, reason = %reason, "indicator computation failed, strategy will hold");
        }

        let mut book = Book::new(symbol, self.config, candles[0].timestamp);
        let mut trace = self.config.record_trace.then(|| Vec::with_capacity(candles.len()));
        let mut cancelled = false;
        let last = candles.len() - 1;

        for (i, bar) in candles.iter().enumerate() {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                book.close_position(bar.close, bar.timestamp, ExitReason::Cancelled)?;
                if let Some(rows) = trace.as_mut() {
                    rows.push(TraceRow {
                        candle: bar.clone(),
                        indicators: Vec::new(),
                        action: None,
                        reason: "cancelled".into(),
                        after: book.bar_state(bar),
                    });
                }
                tracing::info!(symbol, bar = i, "simulation cancelled");
                cancelled = true;
                break;
            }

            let mut decision = None;
            let mut snapshot = Vec::new();

            let risk = book.open.as_ref().and_then(|o| o.position.risk_trigger(bar));
            match risk {
                Some(RiskTrigger::StopLoss(level)) => {
                    book.close_position(level, bar.timestamp, ExitReason::StopLoss)?;
                }
                Some(RiskTrigger::TakeProfit(level)) => {
                    book.close_position(level, bar.timestamp, ExitReason::TakeProfit)?;
                }
                None => {
                    let (d, snap) = self.decide(candles, i, cached.as_ref());
                    decision = Some(d);
                    snapshot = snap;
                }
            }

            if let Some(d) = &decision {
                if let Some(side) = book.side() {
                    if d.exits(side.as_rule_side()) {
                        book.close_position(bar.close, bar.timestamp, ExitReason::ExitSignal)?;
                    }
                }

                let target = target_state(d, self.config.enable_short_selling);
                if let Some(target) = target {
                    let current: PositionState = book.side().into();
                    if current != PositionState::Neutral && current != target {
                        book.close_position(bar.close, bar.timestamp, ExitReason::SignalReversal)?;
                    }
                    let side = match target {
                        PositionState::Long => Some(Side::Long),
                        PositionState::Short => Some(Side::Short),
                        PositionState::Neutral => None,
                    };
                    if let Some(side) = side {
                        if book.side().is_none() && i != last {
                            book.open_position(side, bar, d);
                        }
                    }
                }
            }

            if i == last {
                book.close_position(bar.close, bar.timestamp, ExitReason::EndOfData)?;
            }

            if let Some(rows) = trace.as_mut() {
                let (action, reason) = match &decision {
                    Some(d) => (Some(d.action), d.reason.clone()),
                    None => (None, risk_reason(risk)),
                };
                rows.push(TraceRow {
                    candle: bar.clone(),
                    indicators: snapshot,
                    action,
                    reason,
                    after: book.bar_state(bar),
                });
            }
        }

        tracing::debug!(
            symbol,
            trades = book.trades.len(),
            final_equity = book.equity,
            "simulation finished"
        );
        Ok(SimulationOutput {
            trades: book.trades,
            equity_curve: book.equity_curve,
            trace,
            cancelled,
        })
    }

    /// Decision at bar `i` plus the indicator snapshot it saw.
    fn decide(
        &self,
        candles: &[Candle],
        i: usize,
        cached: Option<&Result<IndicatorValues, String>>,
    ) -> (Decision, Vec<(String, f64)>) {
        let bar_time = Some(candles[i].timestamp);
        match cached {
            Some(Ok(values)) => {
                let view = IndicatorView::new(values, i + 1);
                (self.engine.decide_at(candles, &view, i), view.snapshot(i))
            }
            Some(Err(reason)) => (Decision::hold(bar_time, reason.clone()), Vec::new()),
            None => {
                let window = &candles[..=i];
                match self.engine.compute_indicators(window) {
                    Ok(values) => {
                        let view = IndicatorView::full(&values);
                        (self.engine.decide_at(window, &view, i), view.snapshot(i))
                    }
                    Err(e) => {
                        tracing::warn!(bar = i, error = %e, "indicator computation failed");
                        (Decision::hold(bar_time, e.to_string()), Vec::new())
                    }
                }
            }
        }
    }
}

fn risk_reason(risk: Option<RiskTrigger>) -> String {
    match risk {
        Some(RiskTrigger::StopLoss(_)) => ExitReason::StopLoss.to_string(),
        Some(RiskTrigger::TakeProfit(_)) => ExitReason::TakeProfit.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::candles_from_closes;
    use crate::domain::indicator::IndicatorConfig;
    use crate::domain::rule::{Condition, Operand, Operator, PositionSide, PriceField, Rule, RuleKind};
    use crate::domain::strategy::StrategyConfig;
    use crate::domain::trace::replay;
    use crate::ports::indicator_port::IndicatorProvider;
    use std::sync::Arc;

    struct NoIndicators;

    impl IndicatorProvider for NoIndicators {
        fn compute(
            &self,
            _candles: &[Candle],
            _configs: &[IndicatorConfig],
        ) -> Result<IndicatorValues, StratbenchError> {
            Ok(IndicatorValues::new())
        }
    }

    fn close_cmp(op: Operator, v: f64) -> Condition {
        Condition::atomic(Operand::Price(PriceField::Close), op, Operand::Literal(v))
    }

    fn engine(rules: Vec<Rule>) -> StrategyEngine {
        let config = rules
            .into_iter()
            .fold(StrategyConfig::new("test"), StrategyConfig::with_rule);
        StrategyEngine::new(config, Arc::new(NoIndicators)).unwrap()
    }

    fn long_above(v: f64) -> Rule {
        Rule::new("long", RuleKind::Entry, close_cmp(Operator::Gt, v)).with_side(PositionSide::Long)
    }

    fn short_below(v: f64) -> Rule {
        Rule::new("short", RuleKind::Entry, close_cmp(Operator::Lt, v)).with_side(PositionSide::Short)
    }

    fn config() -> SimulationConfig {
        SimulationConfig {
            initial_capital: 1000.0,
            position_size_percent: 100.0,
            enable_short_selling: true,
            execution: ExecutionConfig {
                commission_rate: 0.0,
                ..Default::default()
            },
            record_trace: true,
        }
    }

    #[test]
    fn rejects_unusable_series() {
        let e = engine(vec![]);
        let cfg = config();
        let sim = Simulator::new(&e, &cfg);

        assert!(matches!(sim.run("X", &[], None), Err(StratbenchError::NoData { .. })));
        let one = candles_from_closes(&[1.0]);
        assert!(matches!(
            sim.run("X", &one, None),
            Err(StratbenchError::InsufficientData { bars: 1, .. })
        ));
        let mut two = candles_from_closes(&[1.0, 2.0]);
        two.swap(0, 1);
        assert!(matches!(
            sim.run("X", &two, None),
            Err(StratbenchError::UnsortedData { index: 1, .. })
        ));
    }

    #[test]
    fn long_then_end_of_data() {
        let e = engine(vec![long_above(100.0)]);
        let cfg = config();
        let candles = candles_from_closes(&[99.0, 101.0, 105.0, 110.0]);
        let out = Simulator::new(&e, &cfg).run("X", &candles, None).unwrap();

        assert_eq!(out.trades.len(), 1);
        let t = &out.trades[0];
        assert_eq!(t.entry_price, 101.0);
        assert_eq!(t.exit_price, Some(110.0));
        assert_eq!(t.exit_reason, Some(ExitReason::EndOfData));
        assert!((t.size - 1000.0 / 101.0).abs() < 1e-9);
        assert_eq!(out.equity_curve.len(), 2);
        assert_eq!(out.equity_curve[0].equity, 1000.0);
        assert!((out.equity_curve[1].equity - (1000.0 + t.pnl)).abs() < 1e-9);
        assert!(!out.cancelled);
    }

    #[test]
    fn reversal_closes_and_flips() {
        let e = engine(vec![long_above(100.0), short_below(100.0)]);
        let cfg = config();
        let candles = candles_from_closes(&[101.0, 102.0, 98.0, 97.0]);
        let out = Simulator::new(&e, &cfg).run("X", &candles, None).unwrap();

        assert_eq!(out.trades.len(), 2);
        assert_eq!(out.trades[0].position_type, Side::Long);
        assert_eq!(out.trades[0].exit_reason, Some(ExitReason::SignalReversal));
        assert_eq!(out.trades[0].exit_price, Some(98.0));
        assert_eq!(out.trades[1].position_type, Side::Short);
        assert_eq!(out.trades[1].entry_price, 98.0);
        assert_eq!(out.trades[1].exit_reason, Some(ExitReason::EndOfData));
    }

    #[test]
    fn sell_without_shorting_only_flattens() {
        let e = engine(vec![long_above(100.0), short_below(100.0)]);
        let cfg = SimulationConfig {
            enable_short_selling: false,
            ..config()
        };
        let candles = candles_from_closes(&[101.0, 98.0, 97.0, 96.0]);
        let out = Simulator::new(&e, &cfg).run("X", &candles, None).unwrap();

        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.trades[0].position_type, Side::Long);
        assert_eq!(out.trades[0].exit_reason, Some(ExitReason::SignalReversal));
    }

    #[test]
    fn stop_loss_precedes_hold() {
        let e = engine(vec![long_above(99.0)]);
        let cfg = SimulationConfig {
            execution: ExecutionConfig {
                commission_rate: 0.0,
                stop_loss_percent: 5.0,
                ..Default::default()
            },
            ..config()
        };
        let mut candles = candles_from_closes(&[100.0, 99.0, 99.0]);
        candles[1].low = 94.0;
        let out = Simulator::new(&e, &cfg).run("X", &candles, None).unwrap();

        assert_eq!(out.trades.len(), 1);
        let t = &out.trades[0];
        assert_eq!(t.exit_reason, Some(ExitReason::StopLoss));
        assert!((t.exit_price.unwrap() - 95.0).abs() < 1e-9);
        assert_eq!(t.exit_time, Some(candles[1].timestamp));
        let trace = out.trace.unwrap();
        assert_eq!(trace[1].action, None);
        assert_eq!(trace[1].reason, "Stop Loss Hit");
    }

    #[test]
    fn exit_rule_closes_matching_side_only() {
        let exit_long = Rule::new("take_it", RuleKind::Exit, close_cmp(Operator::Gt, 104.0))
            .with_side(PositionSide::Long);
        let e = engine(vec![long_above(100.0), exit_long]);
        let cfg = config();
        let candles = candles_from_closes(&[101.0, 103.0, 105.0, 106.0]);
        let out = Simulator::new(&e, &cfg).run("X", &candles, None).unwrap();

        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.trades[0].exit_reason, Some(ExitReason::ExitSignal));
        assert_eq!(out.trades[0].exit_price, Some(105.0));
    }

    #[test]
    fn equity_changes_only_on_close() {
        let e = engine(vec![long_above(100.0), short_below(100.0)]);
        let cfg = config();
        let candles = candles_from_closes(&[101.0, 102.0, 98.0, 97.0, 103.0, 104.0]);
        let out = Simulator::new(&e, &cfg).run("X", &candles, None).unwrap();

        assert_eq!(out.equity_curve.len(), out.trades.len() + 1);
        for (point, trade) in out.equity_curve.iter().skip(1).zip(&out.trades) {
            assert_eq!(Some(point.timestamp), trade.exit_time);
        }
    }

    #[test]
    fn trace_matches_replay() {
        let e = engine(vec![long_above(100.0), short_below(100.0)]);
        let cfg = SimulationConfig {
            execution: ExecutionConfig {
                commission_rate: 0.001,
                slippage_percent: 0.1,
                stop_loss_percent: 2.0,
                take_profit_percent: 3.0,
            },
            ..config()
        };
        let closes = [101.0, 103.0, 99.0, 96.0, 97.0, 102.0, 108.0, 104.0, 98.0, 95.0];
        let candles = candles_from_closes(&closes);
        let out = Simulator::new(&e, &cfg).run("X", &candles, None).unwrap();
        let trace = out.trace.unwrap();
        let replayed = replay(&candles, &out.trades, cfg.initial_capital);

        assert_eq!(trace.len(), replayed.len());
        for (row, state) in trace.iter().zip(&replayed) {
            assert_eq!(row.after.state, state.state, "at {}", state.timestamp);
            assert!((row.after.equity - state.equity).abs() < 1e-9);
            assert!((row.after.unrealized_pnl - state.unrealized_pnl).abs() < 1e-9);
        }
    }

    #[test]
    fn cancellation_closes_open_position() {
        let e = engine(vec![long_above(100.0)]);
        let cfg = config();
        let candles = candles_from_closes(&[101.0, 102.0, 103.0]);
        let flag = AtomicBool::new(true);
        let out = Simulator::new(&e, &cfg).run("X", &candles, Some(&flag)).unwrap();
        assert!(out.cancelled);
        assert!(out.trades.is_empty());
        assert_eq!(out.equity_curve.len(), 1);
    }

    #[test]
    fn no_position_opened_on_last_bar() {
        let e = engine(vec![long_above(100.0)]);
        let cfg = config();
        let candles = candles_from_closes(&[99.0, 101.0]);
        let out = Simulator::new(&e, &cfg).run("X", &candles, None).unwrap();
        assert!(out.trades.is_empty());
    }
}
