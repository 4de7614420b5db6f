//! Domain error types.

/// A parse error with position information for rule parsing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for stratbench.
#[derive(Debug, thiserror::Error)]
pub enum StratbenchError {
    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    RuleParse(#[from] ParseError),

    #[error("invalid strategy: {reason}")]
    StrategyInvalid { reason: String },

    #[error("indicator '{name}' failed: {reason}")]
    Indicator { name: String, reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("data for {symbol} is not in ascending time order at bar {index}")]
    UnsortedData { symbol: String, index: usize },

    #[error("trade {id} is already closed")]
    TradeAlreadyClosed { id: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&StratbenchError> for std::process::ExitCode {
    fn from(err: &StratbenchError) -> Self {
        let code: u8 = match err {
            StratbenchError::Io(_) | StratbenchError::TradeAlreadyClosed { .. } => 1,
            StratbenchError::ConfigParse { .. }
            | StratbenchError::ConfigMissing { .. }
            | StratbenchError::ConfigInvalid { .. } => 2,
            StratbenchError::DataSource { .. } => 3,
            StratbenchError::RuleParse(_)
            | StratbenchError::StrategyInvalid { .. }
            | StratbenchError::Indicator { .. } => 4,
            StratbenchError::NoData { .. }
            | StratbenchError::InsufficientData { .. }
            | StratbenchError::UnsortedData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_context_points_at_position() {
        let err = ParseError {
            message: "expected ')'".into(),
            position: 4,
        };
        let rendered = err.display_with_context("GT(close");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "GT(close");
        assert_eq!(lines[1], "    ^");
        assert!(lines[2].contains("expected ')'"));
    }

    #[test]
    fn insufficient_data_message() {
        let err = StratbenchError::InsufficientData {
            symbol: "BTCUSDT".into(),
            bars: 1,
            minimum: 2,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data for BTCUSDT: have 1 bars, need 2"
        );
    }

    #[test]
    fn rule_parse_converts_from_parse_error() {
        let err: StratbenchError = ParseError {
            message: "boom".into(),
            position: 0,
        }
        .into();
        assert!(matches!(err, StratbenchError::RuleParse(_)));
    }
}
