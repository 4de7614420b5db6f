//! Strategy decisions emitted once per bar.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::domain::rule::PositionSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub timestamp: Option<DateTime<Utc>>,
    pub action: Action,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub reason: String,
    /// Set when an exit rule fired; carries that rule's side.
    pub exit_signal: Option<PositionSide>,
    pub metadata: BTreeMap<String, String>,
}

impl Decision {
    pub fn hold(timestamp: Option<DateTime<Utc>>, reason: impl Into<String>) -> Self {
        Self {
            timestamp,
            action: Action::Hold,
            confidence: 0.0,
            reason: reason.into(),
            exit_signal: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn exit(timestamp: Option<DateTime<Utc>>, rule: &str, side: PositionSide) -> Self {
        Self {
            exit_signal: Some(side),
            ..Self::hold(timestamp, rule)
        }
    }

    pub fn with_scores(mut self, long_score: f64, short_score: f64) -> Self {
        self.metadata
            .insert("long_score".into(), format!("{:.4}", long_score));
        self.metadata
            .insert("short_score".into(), format!("{:.4}", short_score));
        self
    }

    /// Whether the exit signal applies to a position held on `side`.
    pub fn exits(&self, side: PositionSide) -> bool {
        match (self.exit_signal, side) {
            (None, _) => false,
            (Some(PositionSide::Both), _) => true,
            (Some(signal), held) => signal == held,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_has_zero_confidence() {
        let d = Decision::hold(None, "no signal");
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.confidence, 0.0);
        assert!(d.exit_signal.is_none());
    }

    #[test]
    fn exit_matches_side() {
        let d = Decision::exit(None, "stop_out", PositionSide::Long);
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.reason, "stop_out");
        assert!(d.exits(PositionSide::Long));
        assert!(!d.exits(PositionSide::Short));

        let both = Decision::exit(None, "flat", PositionSide::Both);
        assert!(both.exits(PositionSide::Long));
        assert!(both.exits(PositionSide::Short));
    }

    #[test]
    fn scores_recorded_in_metadata() {
        let d = Decision::hold(None, "x").with_scores(0.5, 0.25);
        assert_eq!(d.metadata["long_score"], "0.5000");
        assert_eq!(d.metadata["short_score"], "0.2500");
    }
}
