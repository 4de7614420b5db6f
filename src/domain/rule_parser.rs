//! Rule condition and indicator DSL parser.
//!
//! Recursive descent over two small grammars:
//!
//! ```text
//! condition := CMP '(' operand ',' operand ')'
//!            | 'BETWEEN' '(' operand ',' number ',' number ')'
//!            | ('AND' | 'OR') '(' condition (',' condition)* ')'
//! CMP       := 'GT' | 'LT' | 'GTE' | 'LTE' | 'EQ' | 'CROSS_ABOVE' | 'CROSS_BELOW'
//! operand   := number | price | 'PREV' '(' ident ')' | ident
//! price     := 'open' | 'high' | 'low' | 'close' | 'volume'
//!
//! indicator := ('SMA' | 'EMA' | 'RSI' | 'ROC' | 'ATR' | 'STDDEV') '(' int ')'
//!            | 'MACD' '(' int ',' int ',' int ')'
//!            | 'BOLLINGER' '(' int ',' number ')'
//! ```
//!
//! Keywords are case-sensitive. Identifiers are normalized to lowercase so
//! they match indicator names read from INI keys.

use crate::domain::error::ParseError;
use crate::domain::indicator::IndicatorKind;
use crate::domain::rule::{Condition, Operand, Operator, PriceField};

const COMPARISONS: &[(&str, Operator)] = &[
    ("CROSS_ABOVE", Operator::CrossAbove),
    ("CROSS_BELOW", Operator::CrossBelow),
    ("GTE", Operator::Gte),
    ("LTE", Operator::Lte),
    ("GT", Operator::Gt),
    ("LT", Operator::Lt),
    ("EQ", Operator::Eq),
];

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{}', found '{}'", expected, ch))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn peek_word(&self) -> String {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            self.pos = start;
            return Err(self.error(format!("expected number, found '{}'", self.peek_word())));
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    fn parse_integer(&mut self) -> Result<usize, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.pos == start {
            return Err(self.error(format!("expected integer, found '{}'", self.peek_word())));
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<usize>().map_err(|_| ParseError {
            message: format!("invalid integer: {}", num_str),
            position: start,
        })
    }

    fn parse_period(&mut self) -> Result<usize, ParseError> {
        let start = self.pos;
        let period = self.parse_integer()?;
        if period == 0 {
            return Err(ParseError {
                message: "period must be at least 1".to_string(),
                position: start,
            });
        }
        Ok(period)
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => {
                let word = self.peek_word();
                self.pos += word.len();
                Ok(word.to_lowercase())
            }
            _ => Err(self.error(format!("expected identifier, found '{}'", self.peek_word()))),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        self.skip_whitespace();

        if self
            .peek()
            .is_some_and(|ch| ch.is_ascii_digit() || ch == '-' || ch == '.')
        {
            return Ok(Operand::Literal(self.parse_number()?));
        }

        if self.consume_keyword("PREV") {
            self.expect_char('(')?;
            let name = self.parse_identifier()?;
            self.expect_char(')')?;
            return Ok(Operand::previous(name));
        }

        let word = self.peek_word();
        let field = match word.as_str() {
            "open" => Some(PriceField::Open),
            "high" => Some(PriceField::High),
            "low" => Some(PriceField::Low),
            "close" => Some(PriceField::Close),
            "volume" => Some(PriceField::Volume),
            _ => None,
        };
        if let Some(field) = field {
            self.pos += word.len();
            return Ok(Operand::Price(field));
        }

        let name = self
            .parse_identifier()
            .map_err(|e| self.error(e.message.replace("identifier", "operand")))?;
        Ok(Operand::indicator(name))
    }

    fn parse_comparison(&mut self, operator: Operator) -> Result<Condition, ParseError> {
        self.expect_char('(')?;
        let left = self.parse_operand()?;
        self.expect_char(',')?;
        let right = self.parse_operand()?;
        self.expect_char(')')?;
        Ok(Condition::atomic(left, operator, right))
    }

    fn parse_between(&mut self) -> Result<Condition, ParseError> {
        self.expect_char('(')?;
        let operand = self.parse_operand()?;
        self.expect_char(',')?;
        let lower = self.parse_number()?;
        self.expect_char(',')?;
        let upper_pos = self.pos;
        let upper = self.parse_number()?;
        self.expect_char(')')?;

        if lower > upper {
            return Err(ParseError {
                message: format!("BETWEEN lower bound {} exceeds upper {}", lower, upper),
                position: upper_pos,
            });
        }
        Ok(Condition::atomic(
            operand,
            Operator::Between,
            Operand::Range { lower, upper },
        ))
    }

    fn parse_list(&mut self) -> Result<Vec<Condition>, ParseError> {
        self.expect_char('(')?;
        let mut conditions = vec![self.parse_condition()?];
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                return Ok(conditions);
            }
            self.expect_char(',')?;
            conditions.push(self.parse_condition()?);
        }
    }

    fn parse_condition(&mut self) -> Result<Condition, ParseError> {
        self.skip_whitespace();

        for (keyword, operator) in COMPARISONS {
            if self.consume_keyword(keyword) {
                return self.parse_comparison(*operator);
            }
        }
        if self.consume_keyword("BETWEEN") {
            return self.parse_between();
        }
        if self.consume_keyword("AND") {
            return Ok(Condition::all(self.parse_list()?));
        }
        if self.consume_keyword("OR") {
            return Ok(Condition::any(self.parse_list()?));
        }

        Err(self.error(format!("expected condition, found '{}'", self.peek_word())))
    }

    fn parse_indicator_kind(&mut self) -> Result<IndicatorKind, ParseError> {
        self.skip_whitespace();

        let single: &[(&str, fn(usize) -> IndicatorKind)] = &[
            ("SMA", IndicatorKind::Sma),
            ("EMA", IndicatorKind::Ema),
            ("RSI", IndicatorKind::Rsi),
            ("ROC", IndicatorKind::Roc),
            ("ATR", IndicatorKind::Atr),
            ("STDDEV", IndicatorKind::Stddev),
        ];
        for (keyword, build) in single {
            if self.consume_keyword(keyword) {
                self.expect_char('(')?;
                let period = self.parse_period()?;
                self.expect_char(')')?;
                return Ok(build(period));
            }
        }

        if self.consume_keyword("MACD") {
            self.expect_char('(')?;
            let fast = self.parse_period()?;
            self.expect_char(',')?;
            let slow_pos = self.pos;
            let slow = self.parse_period()?;
            self.expect_char(',')?;
            let signal = self.parse_period()?;
            self.expect_char(')')?;
            if fast >= slow {
                return Err(ParseError {
                    message: format!("MACD fast period {} must be below slow {}", fast, slow),
                    position: slow_pos,
                });
            }
            return Ok(IndicatorKind::Macd { fast, slow, signal });
        }

        if self.consume_keyword("BOLLINGER") {
            self.expect_char('(')?;
            let period = self.parse_period()?;
            self.expect_char(',')?;
            let mult_pos = self.pos;
            let stddev_mult = self.parse_number()?;
            self.expect_char(')')?;
            if stddev_mult <= 0.0 {
                return Err(ParseError {
                    message: "BOLLINGER multiplier must be positive".to_string(),
                    position: mult_pos,
                });
            }
            return Ok(IndicatorKind::Bollinger {
                period,
                stddev_mult,
            });
        }

        Err(self.error(format!("expected indicator, found '{}'", self.peek_word())))
    }

    fn finish(&mut self, what: &str) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected input after {}: '{}'",
                what,
                self.remaining()
            )));
        }
        Ok(())
    }
}

/// Parse a rule condition such as `AND(GT(close, sma), LT(rsi, 70))`.
pub fn parse(input: &str) -> Result<Condition, ParseError> {
    let mut parser = Parser::new(input);
    let condition = parser.parse_condition()?;
    parser.finish("condition")?;
    Ok(condition)
}

/// Parse an indicator definition such as `MACD(12,26,9)`.
pub fn parse_indicator_kind(input: &str) -> Result<IndicatorKind, ParseError> {
    let mut parser = Parser::new(input);
    let kind = parser.parse_indicator_kind()?;
    parser.finish("indicator")?;
    Ok(kind)
}
