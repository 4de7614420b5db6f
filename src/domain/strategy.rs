//! Strategy configuration: indicators plus entry, exit and filter rules.

use std::collections::BTreeSet;

use crate::domain::error::StratbenchError;
use crate::domain::indicator::IndicatorConfig;
use crate::domain::rule::{Rule, RuleKind};

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub name: String,
    pub indicators: Vec<IndicatorConfig>,
    pub entry_rules: Vec<Rule>,
    pub exit_rules: Vec<Rule>,
    pub filter_rules: Vec<Rule>,
}

impl StrategyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indicators: Vec::new(),
            entry_rules: Vec::new(),
            exit_rules: Vec::new(),
            filter_rules: Vec::new(),
        }
    }

    pub fn with_indicator(mut self, indicator: IndicatorConfig) -> Self {
        self.indicators.push(indicator);
        self
    }

    /// Adds a rule to the list matching its kind.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        match rule.kind {
            RuleKind::Entry => self.entry_rules.push(rule),
            RuleKind::Exit => self.exit_rules.push(rule),
            RuleKind::Filter => self.filter_rules.push(rule),
        }
        self
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.entry_rules
            .iter()
            .chain(&self.exit_rules)
            .chain(&self.filter_rules)
    }

    /// Every output series name the configured indicators produce.
    pub fn output_names(&self) -> BTreeSet<String> {
        self.indicators
            .iter()
            .flat_map(|ind| ind.output_names())
            .collect()
    }

    pub fn validate(&self) -> Result<(), StratbenchError> {
        let invalid = |reason: String| StratbenchError::StrategyInvalid { reason };

        if self.name.trim().is_empty() {
            return Err(invalid("strategy name is empty".into()));
        }

        let mut seen = BTreeSet::new();
        for ind in &self.indicators {
            if ind.name.is_empty() {
                return Err(invalid("indicator with empty name".into()));
            }
            if !seen.insert(ind.name.as_str()) {
                return Err(invalid(format!("duplicate indicator '{}'", ind.name)));
            }
            ind.kind
                .validate()
                .map_err(|e| invalid(format!("indicator '{}': {}", ind.name, e)))?;
        }

        let outputs = self.output_names();
        let mut rule_names = BTreeSet::new();
        for rule in self.rules() {
            if !rule_names.insert(rule.name.as_str()) {
                return Err(invalid(format!("duplicate rule '{}'", rule.name)));
            }
            if !(0.0..=1.0).contains(&rule.weight) {
                return Err(invalid(format!(
                    "rule '{}' weight {} outside [0, 1]",
                    rule.name, rule.weight
                )));
            }
            rule.condition
                .validate()
                .map_err(|e| invalid(format!("rule '{}': {}", rule.name, e)))?;
            if let Some(missing) = rule
                .condition
                .indicator_refs()
                .into_iter()
                .find(|r| !outputs.contains(r))
            {
                return Err(invalid(format!(
                    "rule '{}' references unknown indicator '{}'",
                    rule.name, missing
                )));
            }
        }

        if self.entry_rules.iter().all(|r| !r.enabled) {
            tracing::warn!(strategy = %self.name, "strategy has no enabled entry rules");
        }
        Ok(())
    }
}
