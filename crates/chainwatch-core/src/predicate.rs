//! Predicate compiler and evaluator for rule `where` expressions.
//!
//! Supported forms:
//!
//! ```text
//! value >= 1_000_000 * 1e6
//! amount >= microAlgos(1e6)
//! sender in a,b,c
//! memo contains alert
//! status == ok
//! ```
//!
//! Operators: `==`, `!=`, `>=`, `<=`, `>`, `<`, `in`, `contains`.
//! Compilation is total on this grammar; an unknown operator fails at
//! compile time, never at eval time. A missing field evaluates to `false`.

use std::collections::BTreeSet;

use alloy_primitives::U256;

use crate::error::WatchError;
use crate::event::{Args, Value};

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Comparator {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Lt => "<",
        }
    }
}

/// A parsed numeric right-hand side.
///
/// `exact` is populated whenever the expression denotes a non-negative
/// integer, so comparisons against on-chain magnitudes beyond 2^53 run on
/// integers instead of doubles.
#[derive(Debug, Clone, Copy)]
pub struct Number {
    exact: Option<U256>,
    approx: f64,
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone)]
pub enum Rhs {
    Number(Number),
    Text(String),
}

/// A compiled predicate over an event's args map.
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare {
        field: String,
        op: Comparator,
        rhs: Rhs,
    },
    In {
        field: String,
        set: BTreeSet<String>,
    },
    Contains {
        field: String,
        needle: String,
    },
}

/// Compile a list of expressions. Empty / whitespace-only entries are dropped.
pub fn compile_predicates(exprs: &[String]) -> Result<Vec<Predicate>, WatchError> {
    let mut preds = Vec::new();
    for raw in exprs {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        preds.push(compile(raw)?);
    }
    Ok(preds)
}

/// Short-circuit AND over compiled predicates.
pub fn all_predicates(preds: &[Predicate], args: &Args) -> Result<bool, WatchError> {
    for p in preds {
        if !p.eval(args)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn compile(expr: &str) -> Result<Predicate, WatchError> {
    // Infix keywords take priority over the operator scan.
    if let Some((field, list)) = expr.split_once(" in ") {
        let set: BTreeSet<String> = list
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        return Ok(Predicate::In {
            field: field.trim().to_string(),
            set,
        });
    }

    if let Some((field, needle)) = expr.split_once(" contains ") {
        return Ok(Predicate::Contains {
            field: field.trim().to_string(),
            needle: needle.trim().to_string(),
        });
    }

    // Longest-match first: >= and <= before > and <.
    const OPS: [Comparator; 6] = [
        Comparator::Eq,
        Comparator::Ne,
        Comparator::Ge,
        Comparator::Le,
        Comparator::Gt,
        Comparator::Lt,
    ];
    let op = OPS
        .into_iter()
        .find(|op| expr.contains(op.symbol()))
        .ok_or_else(|| WatchError::Compile(format!("unsupported expression: {expr}")))?;

    let (field, rhs_raw) = expr
        .split_once(op.symbol())
        .ok_or_else(|| WatchError::Compile(format!("invalid expression: {expr}")))?;
    let field = field.trim().to_string();
    let rhs_raw = rhs_raw.trim();

    let rhs = match parse_number_expr(rhs_raw) {
        Some(num) => Rhs::Number(num),
        None => Rhs::Text(rhs_raw.to_string()),
    };

    Ok(Predicate::Compare { field, op, rhs })
}

impl Predicate {
    /// Evaluate against an args map. Missing fields are `false`, never errors.
    pub fn eval(&self, args: &Args) -> Result<bool, WatchError> {
        let hit = match self {
            Predicate::In { field, set } => args
                .get(field)
                .is_some_and(|v| set.contains(&v.to_string())),
            Predicate::Contains { field, needle } => args
                .get(field)
                .is_some_and(|v| v.to_string().contains(needle.as_str())),
            Predicate::Compare { field, op, rhs } => {
                let Some(val) = args.get(field) else {
                    return Ok(false);
                };
                match rhs {
                    Rhs::Number(num) => compare_numeric(val, *op, num),
                    // String path: only equality operators are meaningful.
                    Rhs::Text(text) => match op {
                        Comparator::Eq => val.to_string() == *text,
                        Comparator::Ne => val.to_string() != *text,
                        _ => false,
                    },
                }
            }
        };
        Ok(hit)
    }
}

fn compare_numeric(val: &Value, op: Comparator, rhs: &Number) -> bool {
    // Integer path whenever both sides are exact integers.
    if let (Some(lhs), Some(rhs)) = (val.as_u256(), rhs.exact) {
        return match op {
            Comparator::Eq => lhs == rhs,
            Comparator::Ne => lhs != rhs,
            Comparator::Gt => lhs > rhs,
            Comparator::Lt => lhs < rhs,
            Comparator::Ge => lhs >= rhs,
            Comparator::Le => lhs <= rhs,
        };
    }

    let Some(lhs) = val.as_f64() else {
        return false;
    };
    match op {
        Comparator::Eq => lhs == rhs.approx,
        Comparator::Ne => lhs != rhs.approx,
        Comparator::Gt => lhs > rhs.approx,
        Comparator::Lt => lhs < rhs.approx,
        Comparator::Ge => lhs >= rhs.approx,
        Comparator::Le => lhs <= rhs.approx,
    }
}

// ─── Numeric expression parsing ──────────────────────────────────────────────

/// Parse a numeric RHS expression: plain numbers with underscore separators
/// and e-notation, `wei(..)` / `microAlgos(..)` helpers (pass-through, both
/// already denote the base unit), and a single `*` product.
fn parse_number_expr(s: &str) -> Option<Number> {
    let s = s.trim().replace('_', "");

    if s.contains('*') {
        let mut parts = s.split('*');
        let (a, b) = (parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        let a = parse_number_expr(a)?;
        let b = parse_number_expr(b)?;
        return Some(Number {
            exact: a
                .exact
                .zip(b.exact)
                .and_then(|(x, y)| x.checked_mul(y)),
            approx: a.approx * b.approx,
        });
    }

    for helper in ["wei(", "microAlgos("] {
        if let Some(rest) = s.strip_prefix(helper) {
            let inner = rest.strip_suffix(')')?;
            return parse_number_expr(inner);
        }
    }

    parse_simple_number(&s)
}

/// Parse a single numeric literal, computing an exact `U256` when the
/// literal denotes a non-negative integer (including via e-notation, e.g.
/// `1e30` or `1.5e3`).
fn parse_simple_number(s: &str) -> Option<Number> {
    let approx: f64 = s.parse().ok()?;

    let exact = (|| {
        let (mantissa, exp) = match s.split_once(['e', 'E']) {
            Some((m, e)) => (m, e.parse::<i64>().ok()?),
            None => (s, 0),
        };
        if mantissa.starts_with('-') {
            return None;
        }
        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        let shift = exp.checked_sub(frac_part.len() as i64)?;
        if shift < 0 {
            return None;
        }
        let digits = format!("{int_part}{frac_part}");
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let base = U256::from_str_radix(&digits, 10).ok()?;
        let scale = U256::from(10u64).checked_pow(U256::from(shift as u64))?;
        base.checked_mul(scale)
    })();

    Some(Number { exact, approx })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
