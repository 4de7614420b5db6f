#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use stratbench::adapters::builtin_indicators::BuiltinIndicators;
use stratbench::domain::backtest::BacktestConfig;
use stratbench::domain::error::StratbenchError;
use stratbench::domain::indicator::IndicatorConfig;
pub use stratbench::domain::ohlcv::{Candle, Timeframe};
use stratbench::domain::rule::{Condition, Operand, Operator, PositionSide, PriceField, Rule, RuleKind};
use stratbench::domain::strategy::StrategyConfig;
use stratbench::domain::strategy_engine::StrategyEngine;
use stratbench::ports::data_port::DataPort;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Candle>>,
    pub errors: HashMap<String, String>,
    pub requests: RefCell<Vec<String>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn with_candles(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.data.insert(symbol.to_string(), candles);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<Candle>, StratbenchError> {
        self.requests.borrow_mut().push(symbol.to_string());
        if let Some(reason) = self.errors.get(symbol) {
            return Err(StratbenchError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(symbol).cloned().unwrap_or_default())
    }
}

pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

pub fn make_candle(n: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        timestamp: day(n),
        open,
        high,
        low,
        close,
        volume: 1_000.0,
    }
}

/// Daily candles where every price field equals the close.
pub fn flat_candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_candle(i as i64, c, c, c, c))
        .collect()
}

pub fn close_vs(operator: Operator, value: f64) -> Condition {
    Condition::atomic(
        Operand::Price(PriceField::Close),
        operator,
        Operand::Literal(value),
    )
}

pub fn entry(name: &str, side: PositionSide, condition: Condition) -> Rule {
    Rule::new(name, RuleKind::Entry, condition).with_side(side)
}

pub fn exit(name: &str, side: PositionSide, condition: Condition) -> Rule {
    Rule::new(name, RuleKind::Exit, condition).with_side(side)
}

pub fn engine(rules: Vec<Rule>, indicators: Vec<IndicatorConfig>) -> StrategyEngine {
    let config = indicators
        .into_iter()
        .fold(StrategyConfig::new("test strategy"), StrategyConfig::with_indicator);
    let config = rules.into_iter().fold(config, StrategyConfig::with_rule);
    StrategyEngine::new(config, Arc::new(BuiltinIndicators::new())).unwrap()
}

pub fn backtest_config(symbols: &[&str]) -> BacktestConfig {
    BacktestConfig {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        timeframe: Timeframe::D1,
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        initial_capital: 1_000.0,
        position_size_percent: 100.0,
        commission_rate: 0.0,
        slippage_percent: 0.0,
        stop_loss_percent: 0.0,
        take_profit_percent: 0.0,
        enable_short_selling: false,
        record_trace: false,
    }
}
