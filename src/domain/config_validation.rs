//! Configuration validation.
//!
//! Range checks on raw config values, run before any config is turned into
//! domain types.

use crate::domain::error::StratbenchError;
use crate::domain::ohlcv::Timeframe;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

/// Prefix of sections that each define one strategy rule.
pub const RULE_SECTION_PREFIX: &str = "rule.";

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), StratbenchError> {
    validate_symbols(config)?;
    validate_timeframe(config)?;
    validate_dates(config)?;
    validate_initial_capital(config)?;
    validate_position_size(config)?;
    validate_commission(config)?;
    validate_non_negative(config, "slippage_percent")?;
    validate_non_negative(config, "stop_loss_percent")?;
    validate_non_negative(config, "take_profit_percent")?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), StratbenchError> {
    match config.get_string("strategy", "name") {
        Some(s) if !s.trim().is_empty() => {}
        _ => {
            return Err(StratbenchError::ConfigMissing {
                section: "strategy".to_string(),
                key: "name".to_string(),
            });
        }
    }

    let rule_sections = rule_sections(config);
    if rule_sections.is_empty() {
        return Err(StratbenchError::ConfigMissing {
            section: format!("{RULE_SECTION_PREFIX}*"),
            key: "condition".to_string(),
        });
    }
    for section in &rule_sections {
        validate_rule_section(config, section)?;
    }
    Ok(())
}

/// Sections describing rules, in sorted order.
pub fn rule_sections(config: &dyn ConfigPort) -> Vec<String> {
    config
        .sections()
        .into_iter()
        .filter(|s| s.starts_with(RULE_SECTION_PREFIX))
        .collect()
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> StratbenchError {
    StratbenchError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_symbols(config: &dyn ConfigPort) -> Result<(), StratbenchError> {
    let symbols = config.get_string("backtest", "symbols").unwrap_or_default();
    if symbols.split(',').all(|s| s.trim().is_empty()) {
        return Err(StratbenchError::ConfigMissing {
            section: "backtest".to_string(),
            key: "symbols".to_string(),
        });
    }
    Ok(())
}

fn validate_timeframe(config: &dyn ConfigPort) -> Result<(), StratbenchError> {
    if let Some(value) = config.get_string("backtest", "timeframe") {
        value
            .parse::<Timeframe>()
            .map_err(|reason| invalid("backtest", "timeframe", reason))?;
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), StratbenchError> {
    let start_date = parse_date(config, "start_date")?;
    let end_date = parse_date(config, "end_date")?;
    if start_date > end_date {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must not be after end_date",
        ));
    }
    Ok(())
}

pub fn parse_date(config: &dyn ConfigPort, field: &str) -> Result<NaiveDate, StratbenchError> {
    match config.get_string("backtest", field) {
        None => Err(StratbenchError::ConfigMissing {
            section: "backtest".to_string(),
            key: field.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            invalid(
                "backtest",
                field,
                format!("invalid {field} format, expected YYYY-MM-DD"),
            )
        }),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), StratbenchError> {
    let value = config.get_double("backtest", "initial_capital", 10_000.0);
    if value <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_position_size(config: &dyn ConfigPort) -> Result<(), StratbenchError> {
    let value = config.get_double("backtest", "position_size_percent", 10.0);
    if value <= 0.0 || value > 100.0 {
        return Err(invalid(
            "backtest",
            "position_size_percent",
            "position_size_percent must be in (0, 100]",
        ));
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), StratbenchError> {
    let value = config.get_double("backtest", "commission_rate", 0.001);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "commission_rate",
            "commission_rate must be in [0, 1)",
        ));
    }
    Ok(())
}

fn validate_non_negative(config: &dyn ConfigPort, key: &str) -> Result<(), StratbenchError> {
    let value = config.get_double("backtest", key, 0.0);
    if value < 0.0 {
        return Err(invalid("backtest", key, format!("{key} must be non-negative")));
    }
    Ok(())
}

fn validate_rule_section(config: &dyn ConfigPort, section: &str) -> Result<(), StratbenchError> {
    if section.len() == RULE_SECTION_PREFIX.len() {
        return Err(invalid(section, "name", "rule section needs a name after 'rule.'"));
    }
    match config.get_string(section, "condition") {
        Some(s) if !s.trim().is_empty() => {}
        _ => {
            return Err(StratbenchError::ConfigMissing {
                section: section.to_string(),
                key: "condition".to_string(),
            });
        }
    }
    let weight = config.get_double(section, "weight", 1.0);
    if !(0.0..=1.0).contains(&weight) {
        return Err(invalid(section, "weight", "weight must be between 0 and 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const DATES: &str = "symbols = AAPL\nstart_date = 2020-01-01\nend_date = 2024-12-31\n";

    fn backtest(extra: &str) -> FileConfigAdapter {
        make_config(&format!("[backtest]\n{DATES}{extra}"))
    }

    fn invalid_key(err: StratbenchError) -> String {
        match err {
            StratbenchError::ConfigInvalid { key, .. } => key,
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn valid_backtest_config_passes() {
        let config = make_config(
            r#"
[backtest]
symbols = AAPL, MSFT
timeframe = 1h
start_date = 2020-01-01
end_date = 2024-12-31
initial_capital = 100000.0
position_size_percent = 25
commission_rate = 0.001
slippage_percent = 0.05
stop_loss_percent = 2
take_profit_percent = 4
"#,
        );
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_backtest_config(&backtest("")).is_ok());
    }

    #[test]
    fn out_of_range_values_name_the_key() {
        let cases = [
            ("initial_capital = 0\n", "initial_capital"),
            ("initial_capital = -100\n", "initial_capital"),
            ("position_size_percent = 0\n", "position_size_percent"),
            ("position_size_percent = 150\n", "position_size_percent"),
            ("commission_rate = -0.1\n", "commission_rate"),
            ("commission_rate = 1\n", "commission_rate"),
            ("slippage_percent = -0.01\n", "slippage_percent"),
            ("stop_loss_percent = -5\n", "stop_loss_percent"),
            ("take_profit_percent = -5\n", "take_profit_percent"),
            ("timeframe = 3d\n", "timeframe"),
        ];
        for (line, key) in cases {
            let err = validate_backtest_config(&backtest(line)).unwrap_err();
            assert_eq!(invalid_key(err), key, "case {line:?}");
        }
    }

    #[test]
    fn missing_symbols_fails() {
        let config =
            make_config("[backtest]\nsymbols = ,\nstart_date = 2020-01-01\nend_date = 2024-12-31\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, StratbenchError::ConfigMissing { key, .. } if key == "symbols"));
    }

    #[test]
    fn date_errors() {
        let config = make_config("[backtest]\nsymbols = A\nstart_date = 2020/01/01\nend_date = 2024-12-31\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(err), "start_date");

        let config = make_config("[backtest]\nsymbols = A\nstart_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, StratbenchError::ConfigMissing { key, .. } if key == "end_date"));

        let config = make_config("[backtest]\nsymbols = A\nstart_date = 2024-12-31\nend_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(err), "start_date");
    }

    #[test]
    fn single_day_range_is_allowed() {
        let config = make_config("[backtest]\nsymbols = A\nstart_date = 2024-01-02\nend_date = 2024-01-02\n");
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn valid_strategy_config_passes() {
        let config = make_config(
            r#"
[strategy]
name = Golden Cross

[indicators]
fast = SMA(20)
slow = SMA(50)

[rule.enter]
kind = entry
side = long
weight = 0.8
condition = CROSS_ABOVE(fast, slow)

[rule.leave]
kind = exit
condition = CROSS_BELOW(fast, slow)
"#,
        );
        assert!(validate_strategy_config(&config).is_ok());
        assert_eq!(rule_sections(&config), vec!["rule.enter", "rule.leave"]);
    }

    #[test]
    fn strategy_name_is_required() {
        let config = make_config("[rule.a]\ncondition = GT(close, 1)\n");
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(err, StratbenchError::ConfigMissing { key, .. } if key == "name"));
    }

    #[test]
    fn strategy_without_rules_fails() {
        let config = make_config("[strategy]\nname = empty\n");
        assert!(matches!(
            validate_strategy_config(&config),
            Err(StratbenchError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn rule_needs_condition() {
        let config = make_config("[strategy]\nname = s\n\n[rule.a]\nkind = entry\n");
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(
            matches!(err, StratbenchError::ConfigMissing { section, key } if section == "rule.a" && key == "condition")
        );
    }

    #[test]
    fn rule_weight_out_of_range_fails() {
        let config =
            make_config("[strategy]\nname = s\n\n[rule.a]\nweight = 1.5\ncondition = GT(close, 1)\n");
        let err = validate_strategy_config(&config).unwrap_err();
        assert_eq!(invalid_key(err), "weight");
    }
}
