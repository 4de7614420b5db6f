//! Rule-scoring decision engine.
//!
//! Turns a validated [`StrategyConfig`] and a causal candle window into one
//! [`Decision`] per bar. Exit rules are checked first, filter rules gate each
//! side, and enabled entry rules add their weight to a long or short score.

use std::sync::Arc;

use crate::domain::decision::{Action, Decision};
use crate::domain::error::StratbenchError;
use crate::domain::indicator::{IndicatorValues, IndicatorView};
use crate::domain::ohlcv::Candle;
use crate::domain::rule::Rule;
use crate::domain::rule_eval::evaluate;
use crate::domain::strategy::StrategyConfig;
use crate::ports::indicator_port::IndicatorProvider;

pub struct StrategyEngine {
    config: StrategyConfig,
    provider: Arc<dyn IndicatorProvider>,
}

impl std::fmt::Debug for StrategyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyEngine")
            .field("strategy", &self.config.name)
            .finish_non_exhaustive()
    }
}

impl StrategyEngine {
    /// Validates `config`; a malformed strategy never reaches the bar loop.
    pub fn new(
        config: StrategyConfig,
        provider: Arc<dyn IndicatorProvider>,
    ) -> Result<Self, StratbenchError> {
        config.validate()?;
        Ok(Self { config, provider })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_causal(&self) -> bool {
        self.provider.is_causal()
    }

    /// Indicator series for `candles`, aligned bar for bar.
    pub fn compute_indicators(&self, candles: &[Candle]) -> Result<IndicatorValues, StratbenchError> {
        self.provider.compute(candles, &self.config.indicators)
    }

    /// Decision for the last bar of `window`.
    ///
    /// Provider errors and empty windows produce a HOLD carrying the error text.
    pub fn run(&self, window: &[Candle]) -> Decision {
        let Some(last) = window.last() else {
            return Decision::hold(None, "empty window");
        };
        match self.compute_indicators(window) {
            Ok(values) => {
                let view = IndicatorView::new(&values, window.len());
                self.decide_at(window, &view, window.len() - 1)
            }
            Err(e) => {
                tracing::warn!(strategy = %self.config.name, error = %e, "indicator computation failed");
                Decision::hold(Some(last.timestamp), e.to_string())
            }
        }
    }

    /// Decision at bar `index` given precomputed series.
    ///
    /// Only candles `..=index` and indicator values visible through `view` are
    /// read, so callers may pass a longer backing series bounded at `index + 1`.
    pub fn decide_at(&self, candles: &[Candle], view: &IndicatorView<'_>, index: usize) -> Decision {
        let Some(bar) = candles.get(index) else {
            return Decision::hold(None, format!("bar {} out of range", index));
        };
        let timestamp = Some(bar.timestamp);
        let visible = &candles[..=index];
        let holds = |rule: &Rule| rule.enabled && evaluate(&rule.condition, visible, view, index);

        if let Some(rule) = self.config.exit_rules.iter().find(|&r| holds(r)) {
            return Decision::exit(timestamp, &rule.name, rule.side);
        }

        let long_allowed = self
            .config
            .filter_rules
            .iter()
            .filter(|r| r.enabled && r.side.covers_long())
            .all(|r| holds(r));
        let short_allowed = self
            .config
            .filter_rules
            .iter()
            .filter(|r| r.enabled && r.side.covers_short())
            .all(|r| holds(r));

        let mut long_score = 0.0;
        let mut short_score = 0.0;
        // Last matching entry rule names the decision, whichever side wins.
        let mut last_match = None;

        for rule in &self.config.entry_rules {
            let scores_long = long_allowed && rule.side.covers_long();
            let scores_short = short_allowed && rule.side.covers_short();
            if !(scores_long || scores_short) || !holds(rule) {
                continue;
            }
            if scores_long {
                long_score += rule.weight;
            }
            if scores_short {
                short_score += rule.weight;
            }
            last_match = Some(rule.name.as_str());
        }

        let (action, score) = if long_score > short_score && long_score > 0.0 {
            (Action::Buy, long_score)
        } else if short_score > long_score && short_score > 0.0 {
            (Action::Sell, short_score)
        } else {
            (Action::Hold, 0.0)
        };

        let mut decision = Decision::hold(timestamp, last_match.unwrap_or("no signal"))
            .with_scores(long_score, short_score);
        decision.action = action;
        decision.confidence = score.min(1.0);
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::candles_from_closes;
    use crate::domain::indicator::{IndicatorConfig, IndicatorKind};
    use crate::domain::rule::{Condition, Operand, Operator, PositionSide, PriceField, RuleKind};

    /// Serves fixed series regardless of the window, truncated to its length.
    struct FixedProvider {
        values: IndicatorValues,
        fail: bool,
    }

    impl IndicatorProvider for FixedProvider {
        fn compute(
            &self,
            candles: &[Candle],
            _configs: &[IndicatorConfig],
        ) -> Result<IndicatorValues, StratbenchError> {
            if self.fail {
                return Err(StratbenchError::Indicator {
                    name: "x".into(),
                    reason: "boom".into(),
                });
            }
            Ok(self
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v[..candles.len().min(v.len())].to_vec()))
                .collect())
        }
    }

    fn provider(pairs: &[(&str, Vec<f64>)]) -> Arc<dyn IndicatorProvider> {
        Arc::new(FixedProvider {
            values: pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            fail: false,
        })
    }

    fn close_cmp(op: Operator, v: f64) -> Condition {
        Condition::atomic(Operand::Price(PriceField::Close), op, Operand::Literal(v))
    }

    fn entry(name: &str, cond: Condition, side: PositionSide, weight: f64) -> Rule {
        Rule::new(name, RuleKind::Entry, cond)
            .with_side(side)
            .with_weight(weight)
    }

    fn engine(config: StrategyConfig) -> StrategyEngine {
        StrategyEngine::new(config, provider(&[])).unwrap()
    }

    #[test]
    fn buy_when_long_score_wins() {
        let e = engine(
            StrategyConfig::new("s")
                .with_rule(entry("up", close_cmp(Operator::Gt, 100.0), PositionSide::Long, 0.6))
                .with_rule(entry("down", close_cmp(Operator::Gt, 100.0), PositionSide::Short, 0.4)),
        );
        let d = e.run(&candles_from_closes(&[105.0]));
        assert_eq!(d.action, Action::Buy);
        assert!((d.confidence - 0.6).abs() < 1e-12);
        assert_eq!(d.reason, "down");
        assert_eq!(d.metadata["long_score"], "0.6000");
    }

    #[test]
    fn sell_when_short_score_wins() {
        let e = engine(
            StrategyConfig::new("s")
                .with_rule(entry("dn", close_cmp(Operator::Lt, 100.0), PositionSide::Short, 0.7)),
        );
        let d = e.run(&candles_from_closes(&[95.0]));
        assert_eq!(d.action, Action::Sell);
        assert_eq!(d.reason, "dn");
    }

    #[test]
    fn tie_holds() {
        let e = engine(
            StrategyConfig::new("s")
                .with_rule(entry("a", close_cmp(Operator::Gt, 0.0), PositionSide::Long, 0.5))
                .with_rule(entry("b", close_cmp(Operator::Gt, 0.0), PositionSide::Short, 0.5)),
        );
        let d = e.run(&candles_from_closes(&[10.0]));
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.reason, "b");
    }

    #[test]
    fn reason_is_last_matching_rule_even_on_losing_side() {
        let e = engine(
            StrategyConfig::new("s")
                .with_rule(entry("long_a", close_cmp(Operator::Gt, 0.0), PositionSide::Long, 0.9))
                .with_rule(entry("short_b", close_cmp(Operator::Gt, 0.0), PositionSide::Short, 0.1))
                .with_rule(entry("idle", close_cmp(Operator::Gt, 50.0), PositionSide::Long, 0.5)),
        );
        let d = e.run(&candles_from_closes(&[10.0]));
        assert_eq!(d.action, Action::Buy);
        assert!((d.confidence - 0.9).abs() < 1e-12);
        assert_eq!(d.reason, "short_b");
    }

    #[test]
    fn no_matching_rule_reports_no_signal() {
        let e = engine(
            StrategyConfig::new("s")
                .with_rule(entry("a", close_cmp(Operator::Gt, 50.0), PositionSide::Long, 0.5)),
        );
        assert_eq!(e.run(&candles_from_closes(&[10.0])).reason, "no signal");
    }

    #[test]
    fn both_side_rule_scores_both_and_holds() {
        let e = engine(
            StrategyConfig::new("s")
                .with_rule(entry("any", close_cmp(Operator::Gt, 0.0), PositionSide::Both, 1.0)),
        );
        assert_eq!(e.run(&candles_from_closes(&[10.0])).action, Action::Hold);
    }

    #[test]
    fn confidence_capped_at_one() {
        let e = engine(
            StrategyConfig::new("s")
                .with_rule(entry("a", close_cmp(Operator::Gt, 0.0), PositionSide::Long, 0.8))
                .with_rule(entry("b", close_cmp(Operator::Gt, 0.0), PositionSide::Long, 0.9)),
        );
        let d = e.run(&candles_from_closes(&[10.0]));
        assert_eq!(d.action, Action::Buy);
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.reason, "b");
    }

    #[test]
    fn disabled_rules_ignored() {
        let e = engine(
            StrategyConfig::new("s").with_rule(
                entry("a", close_cmp(Operator::Gt, 0.0), PositionSide::Long, 1.0).disabled(),
            ),
        );
        assert_eq!(e.run(&candles_from_closes(&[10.0])).action, Action::Hold);
    }

    #[test]
    fn exit_rule_takes_precedence() {
        let e = engine(
            StrategyConfig::new("s")
                .with_rule(entry("a", close_cmp(Operator::Gt, 0.0), PositionSide::Long, 1.0))
                .with_rule(
                    Rule::new("bail", RuleKind::Exit, close_cmp(Operator::Gt, 5.0))
                        .with_side(PositionSide::Long),
                ),
        );
        let d = e.run(&candles_from_closes(&[10.0]));
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.reason, "bail");
        assert_eq!(d.exit_signal, Some(PositionSide::Long));
    }

    #[test]
    fn filter_blocks_only_its_side() {
        let e = engine(
            StrategyConfig::new("s")
                .with_rule(entry("l", close_cmp(Operator::Gt, 0.0), PositionSide::Long, 0.9))
                .with_rule(entry("s", close_cmp(Operator::Gt, 0.0), PositionSide::Short, 0.3))
                .with_rule(
                    Rule::new("no_longs", RuleKind::Filter, close_cmp(Operator::Gt, 1000.0))
                        .with_side(PositionSide::Long),
                ),
        );
        let d = e.run(&candles_from_closes(&[10.0]));
        assert_eq!(d.action, Action::Sell);
        assert_eq!(d.reason, "s");
    }

    #[test]
    fn passing_filter_allows_entry() {
        let e = engine(
            StrategyConfig::new("s")
                .with_rule(entry("l", close_cmp(Operator::Gt, 0.0), PositionSide::Long, 0.9))
                .with_rule(Rule::new("ok", RuleKind::Filter, close_cmp(Operator::Gt, 1.0))),
        );
        assert_eq!(e.run(&candles_from_closes(&[10.0])).action, Action::Buy);
    }

    #[test]
    fn provider_error_becomes_hold() {
        let e = StrategyEngine::new(
            StrategyConfig::new("s"),
            Arc::new(FixedProvider {
                values: IndicatorValues::new(),
                fail: true,
            }),
        )
        .unwrap();
        let d = e.run(&candles_from_closes(&[1.0]));
        assert_eq!(d.action, Action::Hold);
        assert!(d.reason.contains("boom"));
    }

    #[test]
    fn empty_window_holds() {
        let e = engine(StrategyConfig::new("s"));
        let d = e.run(&[]);
        assert_eq!(d.action, Action::Hold);
        assert!(d.timestamp.is_none());
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let config = StrategyConfig::new("s").with_rule(entry(
            "x",
            Condition::atomic(Operand::indicator("ghost"), Operator::Gt, Operand::Literal(1.0)),
            PositionSide::Long,
            1.0,
        ));
        assert!(StrategyEngine::new(config, provider(&[])).is_err());
    }

    #[test]
    fn bad_indicator_parameters_fail_at_construction() {
        let config = StrategyConfig::new("s")
            .with_indicator(IndicatorConfig::new("x", IndicatorKind::Sma(0)));
        let err = StrategyEngine::new(config, provider(&[])).unwrap_err();
        assert!(matches!(err, StratbenchError::StrategyInvalid { .. }));
    }

    #[test]
    fn decide_at_respects_view_bound() {
        let config = StrategyConfig::new("s")
            .with_indicator(IndicatorConfig::new("sig", IndicatorKind::Sma(1)))
            .with_rule(entry(
                "sig_up",
                Condition::atomic(Operand::indicator("sig"), Operator::Gt, Operand::Literal(0.0)),
                PositionSide::Long,
                1.0,
            ));
        let e = StrategyEngine::new(config, provider(&[])).unwrap();
        let candles = candles_from_closes(&[1.0, 1.0, 1.0]);
        let mut values = IndicatorValues::new();
        values.insert("sig".into(), vec![-1.0, -1.0, 1.0]);

        // Bar 1 cannot see the positive value stored for bar 2.
        let view = IndicatorView::new(&values, 2);
        assert_eq!(e.decide_at(&candles, &view, 1).action, Action::Hold);

        let view = IndicatorView::new(&values, 3);
        assert_eq!(e.decide_at(&candles, &view, 2).action, Action::Buy);
    }
}
