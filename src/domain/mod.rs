//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod rule;
pub mod rule_parser;
pub mod rule_eval;
pub mod decision;
pub mod strategy;
pub mod strategy_engine;
pub mod position;
pub mod trade;
pub mod execution;
pub mod equity;
pub mod metrics;
pub mod trace;
pub mod simulator;
pub mod backtest;
pub mod config_validation;
pub mod error;
