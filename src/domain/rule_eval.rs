//! Condition evaluation engine.
//!
//! Evaluates conditions against candles and indicator series at one bar index.
//!
//! # Evaluation Semantics
//!
//! - Comparisons evaluate at the given bar index
//! - `CROSS_ABOVE`/`CROSS_BELOW`: require `index >= 1`, compare the sign of
//!   `left - right` at `index - 1` and `index`
//! - `AND`: short-circuits on first `false`
//! - `OR`: short-circuits on first `true`
//! - Empty composites are `false`
//! - A missing or NaN operand makes the condition `false`

use crate::domain::indicator::IndicatorView;
use crate::domain::ohlcv::Candle;
use crate::domain::rule::{AtomicCondition, Combinator, Condition, Operand, Operator, PriceField};

const EPSILON: f64 = 1e-9;

pub fn evaluate(
    condition: &Condition,
    candles: &[Candle],
    indicators: &IndicatorView<'_>,
    index: usize,
) -> bool {
    match condition {
        Condition::Atomic(atom) => evaluate_atomic(atom, candles, indicators, index),
        Condition::Composite {
            combinator,
            conditions,
        } => {
            if conditions.is_empty() {
                return false;
            }
            match combinator {
                Combinator::And => conditions
                    .iter()
                    .all(|c| evaluate(c, candles, indicators, index)),
                Combinator::Or => conditions
                    .iter()
                    .any(|c| evaluate(c, candles, indicators, index)),
            }
        }
    }
}

fn evaluate_atomic(
    atom: &AtomicCondition,
    candles: &[Candle],
    indicators: &IndicatorView<'_>,
    index: usize,
) -> bool {
    let resolve = |operand: &Operand, at: usize| resolve_operand(operand, candles, indicators, at);

    match atom.operator {
        Operator::CrossAbove | Operator::CrossBelow => {
            if index == 0 {
                return false;
            }
            let diffs = (|| {
                let curr = resolve(&atom.left, index)? - resolve(&atom.right, index)?;
                let prev = resolve(&atom.left, index - 1)? - resolve(&atom.right, index - 1)?;
                Some((prev, curr))
            })();
            match (atom.operator, diffs) {
                (Operator::CrossAbove, Some((prev, curr))) => prev <= 0.0 && curr > 0.0,
                (Operator::CrossBelow, Some((prev, curr))) => prev >= 0.0 && curr < 0.0,
                _ => false,
            }
        }
        Operator::Between => {
            let (lower, upper) = match atom.right {
                Operand::Range { lower, upper } => (lower, upper),
                _ => return false,
            };
            match resolve(&atom.left, index) {
                Some(v) => v >= lower && v <= upper,
                None => false,
            }
        }
        op => {
            let (left, right) = match (resolve(&atom.left, index), resolve(&atom.right, index)) {
                (Some(l), Some(r)) => (l, r),
                _ => return false,
            };
            match op {
                Operator::Gt => left > right,
                Operator::Lt => left < right,
                Operator::Gte => left >= right,
                Operator::Lte => left <= right,
                Operator::Eq => (left - right).abs() < EPSILON,
                _ => false,
            }
        }
    }
}

fn resolve_operand(
    operand: &Operand,
    candles: &[Candle],
    indicators: &IndicatorView<'_>,
    index: usize,
) -> Option<f64> {
    let value = match operand {
        Operand::Price(field) => {
            let candle = candles.get(index)?;
            match field {
                PriceField::Open => candle.open,
                PriceField::High => candle.high,
                PriceField::Low => candle.low,
                PriceField::Close => candle.close,
                PriceField::Volume => candle.volume,
            }
        }
        Operand::Indicator { name, previous } => {
            let at = if *previous { index.checked_sub(1)? } else { index };
            indicators.get(name, at)?
        }
        Operand::Literal(v) => *v,
        Operand::Range { .. } => return None,
    };
    if value.is_nan() { None } else { Some(value) }
}
