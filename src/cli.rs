//! CLI definition and dispatch.

use chrono::SecondsFormat;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::adapters::builtin_indicators::BuiltinIndicators;
use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestReport, BacktestResult};
use crate::domain::config_validation::{
    parse_date, rule_sections, validate_backtest_config, validate_strategy_config,
    RULE_SECTION_PREFIX,
};
use crate::domain::error::StratbenchError;
use crate::domain::indicator::IndicatorConfig;
use crate::domain::ohlcv::Timeframe;
use crate::domain::rule::{Condition, PositionSide, Rule, RuleKind};
use crate::domain::rule_parser;
use crate::domain::strategy::StrategyConfig;
use crate::domain::strategy_engine::StrategyEngine;
use crate::ports::config_port::ConfigPort;

const DEFAULT_DATA_DIR: &str = "data";

#[derive(Parser, Debug)]
#[command(name = "stratbench", about = "Rule-based strategy backtester")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Strategy file; defaults to the strategy sections of --config
        #[arg(short, long)]
        strategy: Option<PathBuf>,
        /// Replaces the configured symbol list; repeatable
        #[arg(long = "symbol")]
        symbols: Vec<String>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Write the bar-by-bar trace as CSV
        #[arg(long)]
        trace: Option<PathBuf>,
    },
    /// Validate a strategy configuration
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `verbose`.
pub fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    init_logging(cli.verbose);
    let result = match cli.command {
        Command::Backtest {
            config,
            strategy,
            symbols,
            data_dir,
            trace,
        } => run_backtest(
            &config,
            strategy.as_deref(),
            symbols,
            data_dir,
            trace.as_deref(),
        ),
        Command::Validate { strategy } => run_validate(&strategy),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, StratbenchError> {
    validate_backtest_config(adapter)?;

    let timeframe = match adapter.get_string("backtest", "timeframe") {
        Some(s) => s.parse().map_err(|reason| StratbenchError::ConfigInvalid {
            section: "backtest".into(),
            key: "timeframe".into(),
            reason,
        })?,
        None => Timeframe::D1,
    };

    Ok(BacktestConfig {
        symbols: parse_symbols(&adapter.get_string("backtest", "symbols").unwrap_or_default()),
        timeframe,
        start_date: parse_date(adapter, "start_date")?,
        end_date: parse_date(adapter, "end_date")?,
        initial_capital: adapter.get_double("backtest", "initial_capital", 10_000.0),
        position_size_percent: adapter.get_double("backtest", "position_size_percent", 10.0),
        commission_rate: adapter.get_double("backtest", "commission_rate", 0.001),
        slippage_percent: adapter.get_double("backtest", "slippage_percent", 0.0),
        stop_loss_percent: adapter.get_double("backtest", "stop_loss_percent", 0.0),
        take_profit_percent: adapter.get_double("backtest", "take_profit_percent", 0.0),
        enable_short_selling: adapter.get_bool("backtest", "enable_short_selling", false),
        record_trace: adapter.get_bool("backtest", "record_trace", false),
    })
}

fn parse_condition(section: &str, text: &str) -> Result<Condition, StratbenchError> {
    rule_parser::parse(text).map_err(|e| {
        eprintln!(
            "error: failed to parse [{section}] condition:\n{}",
            e.display_with_context(text)
        );
        StratbenchError::from(e)
    })
}

fn parse_field<T: std::str::FromStr<Err = String>>(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, StratbenchError> {
    match adapter.get_string(section, key) {
        Some(s) => s.parse().map_err(|reason| StratbenchError::ConfigInvalid {
            section: section.into(),
            key: key.into(),
            reason,
        }),
        None => Ok(default),
    }
}

/// Builds a strategy from `[strategy]`, `[indicators]` and `[rule.<name>]`
/// sections. Rules are added in section-name order.
pub fn build_strategy_config(adapter: &dyn ConfigPort) -> Result<StrategyConfig, StratbenchError> {
    validate_strategy_config(adapter)?;

    let name = adapter.get_string("strategy", "name").unwrap_or_default();
    let mut strategy = StrategyConfig::new(name.trim());

    for key in adapter.keys("indicators") {
        let text = adapter.get_string("indicators", &key).unwrap_or_default();
        let kind = rule_parser::parse_indicator_kind(&text).map_err(|e| {
            eprintln!(
                "error: failed to parse indicator '{key}':\n{}",
                e.display_with_context(&text)
            );
            StratbenchError::from(e)
        })?;
        strategy = strategy.with_indicator(IndicatorConfig::new(key, kind));
    }

    for section in rule_sections(adapter) {
        let rule_name = &section[RULE_SECTION_PREFIX.len()..];
        let text = adapter.get_string(&section, "condition").unwrap_or_default();
        let condition = parse_condition(&section, &text)?;
        let kind = parse_field(adapter, &section, "kind", RuleKind::Entry)?;
        let side = parse_field(adapter, &section, "side", PositionSide::Both)?;

        let mut rule = Rule::new(rule_name, kind, condition)
            .with_weight(adapter.get_double(&section, "weight", 1.0))
            .with_side(side);
        if !adapter.get_bool(&section, "enabled", true) {
            rule = rule.disabled();
        }
        strategy = strategy.with_rule(rule);
    }

    strategy.validate()?;
    Ok(strategy)
}

fn run_backtest(
    config_path: &Path,
    strategy_path: Option<&Path>,
    symbols: Vec<String>,
    data_dir: Option<PathBuf>,
    trace_path: Option<&Path>,
) -> Result<(), StratbenchError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = FileConfigAdapter::from_file(config_path)?;
    let mut backtest = build_backtest_config(&config)?;
    if !symbols.is_empty() {
        backtest.symbols = parse_symbols(&symbols.join(","));
    }
    if trace_path.is_some() {
        backtest.record_trace = true;
    }

    let strategy = match strategy_path {
        Some(path) => {
            eprintln!("Loading strategy from {}", path.display());
            build_strategy_config(&FileConfigAdapter::from_file(path)?)?
        }
        None => build_strategy_config(&config)?,
    };
    eprintln!("Strategy: {}", strategy.name);

    let data_dir = data_dir
        .or_else(|| config.get_string("backtest", "data_dir").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let data = CsvAdapter::new(data_dir);
    let engine = StrategyEngine::new(strategy, Arc::new(BuiltinIndicators::new()))?;

    let report = backtest_engine::run_backtest(&backtest, &engine, &data, None)?;
    print_summary(&report);

    if let Some(path) = trace_path {
        write_trace(path, &report.results)?;
        eprintln!("\nTrace written to: {}", path.display());
    }
    Ok(())
}

fn print_summary(report: &BacktestReport) {
    let m = &report.aggregate.metrics;
    eprintln!("\n=== Aggregate Results ===");
    eprintln!("Initial Capital:  {:.2}", m.initial_capital);
    eprintln!("Final Capital:    {:.2}", m.final_capital);
    eprintln!("Total Return:     {:.2}%", m.total_return);
    eprintln!("Annual Return:    {:.2}%", m.annual_return);
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", m.sortino_ratio);
    eprintln!("Calmar Ratio:     {:.2}", m.calmar_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", m.max_drawdown);
    eprintln!("VaR 95 / CVaR 95: {:.4} / {:.4}", m.var_95, m.cvar_95);
    eprintln!("SQN:              {:.2}", m.sqn);
    eprintln!("Kelly:            {:.3}", m.kelly);
    eprintln!("Total Trades:     {}", m.total_trades);
    eprintln!("Win Rate:         {:.1}%", m.win_rate);
    eprintln!("Profit Factor:    {:.2}", m.profit_factor);

    if report.results.len() > 1 {
        eprintln!("\n=== Per-Symbol Summary ===");
        for result in &report.results {
            let m = &result.metrics;
            eprintln!(
                "  {:<10} trades: {:>4}  return: {:>8.2}%  win rate: {:>5.1}%  max dd: -{:.1}%",
                result.symbol, m.total_trades, m.total_return, m.win_rate, m.max_drawdown
            );
        }
    }
    if !report.skipped.is_empty() {
        eprintln!("\n=== Skipped Symbols ===");
        for skipped in &report.skipped {
            eprintln!("  {}: {}", skipped.symbol, skipped.reason);
        }
    }
    if report.cancelled() {
        eprintln!("\nRun was cancelled; results are partial.");
    }
}

/// Writes every recorded trace row, one line per symbol and bar.
pub fn write_trace(path: &Path, results: &[BacktestResult]) -> Result<(), StratbenchError> {
    let to_io = |e: csv::Error| StratbenchError::Io(std::io::Error::other(e));
    let mut writer = csv::Writer::from_path(path).map_err(to_io)?;
    writer
        .write_record([
            "symbol",
            "timestamp",
            "open",
            "high",
            "low",
            "close",
            "volume",
            "action",
            "reason",
            "position",
            "equity",
            "unrealized_pnl",
            "indicators",
        ])
        .map_err(to_io)?;

    for result in results {
        let Some(rows) = &result.trace else {
            continue;
        };
        for row in rows {
            let indicators = row
                .indicators
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(";");
            let c = &row.candle;
            writer
                .write_record([
                    result.symbol.clone(),
                    c.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                    c.open.to_string(),
                    c.high.to_string(),
                    c.low.to_string(),
                    c.close.to_string(),
                    c.volume.to_string(),
                    row.action.map(|a| a.to_string()).unwrap_or_default(),
                    row.reason.clone(),
                    row.after.state.to_string(),
                    row.after.equity.to_string(),
                    row.after.unrealized_pnl.to_string(),
                    indicators,
                ])
                .map_err(to_io)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn run_validate(strategy_path: &Path) -> Result<(), StratbenchError> {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let adapter = FileConfigAdapter::from_file(strategy_path)?;
    let strategy = build_strategy_config(&adapter)?;

    eprintln!("\nIndicators:");
    for indicator in &strategy.indicators {
        eprintln!("  {} = {}", indicator.name, indicator.kind);
    }
    for (title, rules) in [
        ("Entry rules", &strategy.entry_rules),
        ("Exit rules", &strategy.exit_rules),
        ("Filter rules", &strategy.filter_rules),
    ] {
        if rules.is_empty() {
            continue;
        }
        eprintln!("\n{title}:");
        for rule in rules {
            let state = if rule.enabled { "" } else { " (disabled)" };
            eprintln!(
                "  {} [{} w={}]{}: {}",
                rule.name, rule.side, rule.weight, state, rule.condition
            );
        }
    }

    eprintln!("\nStrategy configuration is valid.");
    Ok(())
}
