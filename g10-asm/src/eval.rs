//! Expression evaluation over preprocessor tokens.
//!
//! Three value kinds flow through here: 64-bit integers, 32.32 fixed-point
//! numbers, and strings. Identifiers are substituted from the macro table
//! before parsing, exactly as text substitution would splice them, then the
//! expression is parsed by precedence climbing.

use std::fmt::Write as _;

use crate::diag::{AsmError, AsmErrorKind, SourceLoc};
use crate::macros::MacroTable;
use crate::token::{OpKind, Token, TokenKind};

/// Hard cap on macro substitution sweeps; a self-referential macro would
/// otherwise expand forever.
const MAX_EXPANSION_SWEEPS: usize = 64;

/// A value produced by the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit signed integer.
    Int(i64),
    /// 32.32 fixed-point number in a 64-bit word.
    Fixed(u64),
    /// String.
    Str(String),
}

impl Value {
    /// Build the fixed-point representation of `number`.
    pub fn fixed_from_f64(number: f64) -> Self {
        let magnitude = (number.abs() * 4_294_967_296.0) as u64;
        if number < 0.0 {
            Value::Fixed(magnitude.wrapping_neg())
        } else {
            Value::Fixed(magnitude)
        }
    }

    /// Coerce to integer: fixed-point keeps its integer part, strings do
    /// not coerce.
    pub fn to_int(&self) -> Result<i64, AsmErrorKind> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Fixed(v) => Ok((*v as i64) >> 32),
            Value::Str(_) => Err(AsmErrorKind::TypeMismatch(
                "expected a number, found a string".into(),
            )),
        }
    }

    /// Truthiness for conditional directives.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Int(v) => *v != 0,
            Value::Fixed(v) => *v != 0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    /// Textual rendering. Strings keep their quotes when `quoted`.
    pub fn render(&self, quoted: bool) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Fixed(v) => {
                let number = (*v as i64) as f64 / 4_294_967_296.0;
                let mut out = String::new();
                let _ = write!(out, "{number}");
                out
            }
            Value::Str(s) if quoted => format!("\"{s}\""),
            Value::Str(s) => s.clone(),
        }
    }
}

/// Evaluate `tokens` as one expression against `macros`.
pub fn evaluate(
    tokens: &[Token],
    macros: &MacroTable,
) -> Result<Value, AsmError> {
    let expanded = expand_macros(tokens, macros)?;
    let mut parser = Parser {
        tokens: &expanded,
        pos: 0,
    };
    let value = parser.expression(0)?;
    match parser.peek() {
        None => Ok(value),
        Some(tok) => Err(AsmErrorKind::UnexpectedToken {
            expected: "end of expression",
            found: format!("'{}'", tok.lexeme),
        }
        .at(tok.loc.clone())),
    }
}

/// Splice macro replacements into the token stream, sweep after sweep,
/// until no known identifier remains.
fn expand_macros(
    tokens: &[Token],
    macros: &MacroTable,
) -> Result<Vec<Token>, AsmError> {
    let mut current: Vec<Token> = tokens.to_vec();
    for _ in 0..MAX_EXPANSION_SWEEPS {
        let mut expanded = Vec::with_capacity(current.len());
        let mut changed = false;
        for tok in &current {
            if tok.kind == TokenKind::Ident {
                if let Some(macro_) = macros.lookup(&tok.lexeme) {
                    expanded.extend(macro_.replacement.iter().cloned());
                    changed = true;
                    continue;
                }
            }
            expanded.push(tok.clone());
        }
        if !changed {
            return Ok(expanded);
        }
        current = expanded;
    }
    let loc = tokens.first().map(|t| t.loc.clone()).unwrap_or_default();
    Err(AsmErrorKind::InfiniteLoop(MAX_EXPANSION_SWEEPS).at(loc))
}

/// Binding power of a binary operator; higher binds tighter. Mirrors the
/// documented precedence tower.
fn binding_power(op: OpKind) -> Option<u8> {
    use OpKind::*;
    let power = match op {
        StarStar => 100,
        Star | Slash | Percent => 90,
        Plus | Minus => 80,
        Shl | Shr => 70,
        Lt | Le | Gt | Ge => 60,
        EqEq | Ne => 50,
        Amp => 40,
        Caret => 35,
        Pipe => 30,
        AndAnd => 20,
        OrOr => 10,
        _ => return None,
    };
    Some(power)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn end_loc(&self) -> SourceLoc {
        self.tokens
            .last()
            .map(|t| t.loc.clone())
            .unwrap_or_default()
    }

    fn expression(&mut self, min_power: u8) -> Result<Value, AsmError> {
        let mut lhs = self.unary()?;

        while let Some(tok) = self.peek() {
            let TokenKind::Op(op) = tok.kind else { break };
            let Some(power) = binding_power(op) else { break };
            if power < min_power {
                break;
            }
            let loc = tok.loc.clone();
            self.pos += 1;

            // `**` is right-associative; everything else climbs left.
            let next_min = if op == OpKind::StarStar {
                power
            } else {
                power + 1
            };
            let rhs = self.expression(next_min)?;
            lhs = apply_binary(op, lhs, rhs, &loc)?;
        }

        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Value, AsmError> {
        let Some(tok) = self.peek() else {
            return Err(AsmErrorKind::UnexpectedToken {
                expected: "an expression",
                found: "end of input".into(),
            }
            .at(self.end_loc()));
        };

        if let TokenKind::Op(op) = tok.kind {
            let loc = tok.loc.clone();
            match op {
                OpKind::Plus => {
                    self.pos += 1;
                    let value = self.unary()?;
                    let int = value.to_int().map_err(|k| k.at(loc))?;
                    return Ok(Value::Int(int));
                }
                OpKind::Minus => {
                    self.pos += 1;
                    let value = self.unary()?;
                    let int = value.to_int().map_err(|k| k.at(loc))?;
                    return Ok(Value::Int(int.wrapping_neg()));
                }
                OpKind::Tilde => {
                    self.pos += 1;
                    let value = self.unary()?;
                    let int = value.to_int().map_err(|k| k.at(loc))?;
                    return Ok(Value::Int(!int));
                }
                OpKind::Bang => {
                    self.pos += 1;
                    let value = self.unary()?;
                    return Ok(Value::Int(i64::from(!value.truthy())));
                }
                _ => {}
            }
        }

        self.primary()
    }

    fn primary(&mut self) -> Result<Value, AsmError> {
        let Some(tok) = self.bump() else {
            return Err(AsmErrorKind::UnexpectedToken {
                expected: "an expression",
                found: "end of input".into(),
            }
            .at(self.end_loc()));
        };

        match &tok.kind {
            TokenKind::Int(v) => Ok(Value::Int(*v)),
            TokenKind::Number(n) => Ok(Value::fixed_from_f64(*n)),
            TokenKind::Char(c) => Ok(Value::Int(i64::from(*c))),
            TokenKind::Str => Ok(Value::Str(tok.lexeme.clone())),
            TokenKind::Ident => Err(AsmErrorKind::UndefinedIdentifier(
                tok.lexeme.clone(),
            )
            .at(tok.loc.clone())),
            TokenKind::LParen => {
                let value = self.expression(0)?;
                match self.bump() {
                    Some(close) if close.kind == TokenKind::RParen => Ok(value),
                    Some(other) => Err(AsmErrorKind::UnexpectedToken {
                        expected: "')'",
                        found: format!("'{}'", other.lexeme),
                    }
                    .at(other.loc.clone())),
                    None => Err(AsmErrorKind::UnexpectedToken {
                        expected: "')'",
                        found: "end of input".into(),
                    }
                    .at(self.end_loc())),
                }
            }
            _ => Err(AsmErrorKind::UnexpectedToken {
                expected: "an expression",
                found: format!("'{}'", tok.lexeme),
            }
            .at(tok.loc.clone())),
        }
    }
}

fn apply_binary(
    op: OpKind,
    lhs: Value,
    rhs: Value,
    loc: &SourceLoc,
) -> Result<Value, AsmError> {
    use OpKind::*;

    // Two strings support concatenation and lexicographic comparison;
    // every other combination coerces to integer.
    if let (Value::Str(a), Value::Str(b)) = (&lhs, &rhs) {
        match op {
            Plus => return Ok(Value::Str(format!("{a}{b}"))),
            Lt => return Ok(Value::Int(i64::from(a < b))),
            Le => return Ok(Value::Int(i64::from(a <= b))),
            Gt => return Ok(Value::Int(i64::from(a > b))),
            Ge => return Ok(Value::Int(i64::from(a >= b))),
            EqEq => return Ok(Value::Int(i64::from(a == b))),
            Ne => return Ok(Value::Int(i64::from(a != b))),
            _ => {}
        }
    }

    let a = lhs.to_int().map_err(|k| k.at(loc.clone()))?;
    let b = rhs.to_int().map_err(|k| k.at(loc.clone()))?;

    let result = match op {
        Plus => a.wrapping_add(b),
        Minus => a.wrapping_sub(b),
        Star => a.wrapping_mul(b),
        Slash => {
            if b == 0 {
                return Err(AsmErrorKind::DivideByZero.at(loc.clone()));
            }
            a.wrapping_div(b)
        }
        Percent => {
            if b == 0 {
                return Err(AsmErrorKind::DivideByZero.at(loc.clone()));
            }
            a.wrapping_rem(b)
        }
        StarStar => {
            if b < 0 {
                return Err(AsmErrorKind::NegativeExponent.at(loc.clone()));
            }
            let mut result: i64 = 1;
            let mut base = a;
            let mut exp = b;
            while exp > 0 {
                if exp & 1 == 1 {
                    result = result.wrapping_mul(base);
                }
                base = base.wrapping_mul(base);
                exp >>= 1;
            }
            result
        }
        Shl | Shr => {
            if !(0..=63).contains(&b) {
                return Err(AsmErrorKind::ShiftOutOfRange(b).at(loc.clone()));
            }
            if op == Shl {
                a.wrapping_shl(b as u32)
            } else {
                a.wrapping_shr(b as u32)
            }
        }
        Lt => i64::from(a < b),
        Le => i64::from(a <= b),
        Gt => i64::from(a > b),
        Ge => i64::from(a >= b),
        EqEq => i64::from(a == b),
        Ne => i64::from(a != b),
        Amp => a & b,
        Caret => a ^ b,
        Pipe => a | b,
        AndAnd => i64::from(a != 0 && b != 0),
        OrOr => i64::from(a != 0 || b != 0),
        _ => {
            return Err(AsmErrorKind::UnexpectedToken {
                expected: "a binary operator",
                found: format!("{op:?}"),
            }
            .at(loc.clone()))
        }
    };
    Ok(Value::Int(result))
}
