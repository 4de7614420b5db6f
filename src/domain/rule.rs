//! Rule and condition data structures.
//!
//! - `Operand`: what can be compared (price fields, literals, indicator series)
//! - `Operator`: comparison applied between two operands
//! - `Condition`: atomic comparison or an AND/OR composite of conditions
//! - `Rule`: a named, weighted condition tagged with a kind and position side

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Price(PriceField),
    /// Indicator output series; `previous` reads the bar before the evaluated one.
    Indicator { name: String, previous: bool },
    Literal(f64),
    /// Inclusive bounds, only meaningful as the right side of `Between`.
    Range { lower: f64, upper: f64 },
}

impl Operand {
    pub fn indicator(name: impl Into<String>) -> Self {
        Operand::Indicator {
            name: name.into(),
            previous: false,
        }
    }

    pub fn previous(name: impl Into<String>) -> Self {
        Operand::Indicator {
            name: name.into(),
            previous: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    CrossAbove,
    CrossBelow,
    Between,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtomicCondition {
    pub left: Operand,
    pub operator: Operator,
    pub right: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Atomic(AtomicCondition),
    Composite {
        combinator: Combinator,
        conditions: Vec<Condition>,
    },
}

impl Condition {
    pub fn atomic(left: Operand, operator: Operator, right: Operand) -> Self {
        Condition::Atomic(AtomicCondition {
            left,
            operator,
            right,
        })
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Condition::Composite {
            combinator: Combinator::And,
            conditions,
        }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Condition::Composite {
            combinator: Combinator::Or,
            conditions,
        }
    }

    /// Structural check: `Between` takes a `Range` on the right and `Range`
    /// appears nowhere else.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Condition::Atomic(atom) => {
                if matches!(atom.left, Operand::Range { .. }) {
                    return Err("range operand is only allowed on the right of BETWEEN".into());
                }
                match (&atom.operator, &atom.right) {
                    (Operator::Between, Operand::Range { lower, upper }) => {
                        if lower > upper {
                            Err(format!("BETWEEN lower bound {} exceeds upper {}", lower, upper))
                        } else {
                            Ok(())
                        }
                    }
                    (Operator::Between, _) => Err("BETWEEN requires a range operand".into()),
                    (_, Operand::Range { .. }) => {
                        Err("range operand is only allowed on the right of BETWEEN".into())
                    }
                    _ => Ok(()),
                }
            }
            Condition::Composite { conditions, .. } => {
                conditions.iter().try_for_each(Condition::validate)
            }
        }
    }

    /// Names of all indicator series referenced by this condition.
    pub fn indicator_refs(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs(&self, out: &mut BTreeSet<String>) {
        match self {
            Condition::Atomic(atom) => {
                for operand in [&atom.left, &atom.right] {
                    if let Operand::Indicator { name, .. } = operand {
                        out.insert(name.clone());
                    }
                }
            }
            Condition::Composite { conditions, .. } => {
                for c in conditions {
                    c.collect_refs(out);
                }
            }
        }
    }
}

/// Which position direction a rule votes for (or applies to).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSide {
    Long,
    Short,
    Both,
}

impl PositionSide {
    pub fn covers_long(&self) -> bool {
        matches!(self, PositionSide::Long | PositionSide::Both)
    }

    pub fn covers_short(&self) -> bool {
        matches!(self, PositionSide::Short | PositionSide::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Entry,
    Exit,
    Filter,
}

impl FromStr for PositionSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" => Ok(PositionSide::Long),
            "short" => Ok(PositionSide::Short),
            "both" => Ok(PositionSide::Both),
            other => Err(format!("unknown side '{other}' (expected long, short, both)")),
        }
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "entry" => Ok(RuleKind::Entry),
            "exit" => Ok(RuleKind::Exit),
            "filter" => Ok(RuleKind::Filter),
            other => Err(format!("unknown rule kind '{other}' (expected entry, exit, filter)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub condition: Condition,
    pub weight: f64,
    pub enabled: bool,
    pub side: PositionSide,
    pub kind: RuleKind,
}

impl Rule {
    pub fn new(name: impl Into<String>, kind: RuleKind, condition: Condition) -> Self {
        Self {
            name: name.into(),
            condition,
            weight: 1.0,
            enabled: true,
            side: PositionSide::Both,
            kind,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_side(mut self, side: PositionSide) -> Self {
        self.side = side;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
            PriceField::Volume => "volume",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Price(field) => write!(f, "{}", field),
            Operand::Indicator {
                name,
                previous: false,
            } => write!(f, "{}", name),
            Operand::Indicator {
                name,
                previous: true,
            } => write!(f, "PREV({})", name),
            Operand::Literal(v) => write!(f, "{}", v),
            Operand::Range { lower, upper } => write!(f, "{}, {}", lower, upper),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Gt => "GT",
            Operator::Lt => "LT",
            Operator::Gte => "GTE",
            Operator::Lte => "LTE",
            Operator::Eq => "EQ",
            Operator::CrossAbove => "CROSS_ABOVE",
            Operator::CrossBelow => "CROSS_BELOW",
            Operator::Between => "BETWEEN",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Atomic(atom) => {
                write!(f, "{}({}, {})", atom.operator, atom.left, atom.right)
            }
            Condition::Composite {
                combinator,
                conditions,
            } => {
                let name = match combinator {
                    Combinator::And => "AND",
                    Combinator::Or => "OR",
                };
                write!(f, "{}(", name)?;
                for (i, c) in conditions.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
            PositionSide::Both => "BOTH",
        };
        f.write_str(s)
    }
}
