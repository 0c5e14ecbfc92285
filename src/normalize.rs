//! Value normalization shared by the exported-sheet side and the source side.
//!
//! Every value that takes part in a comparison goes through
//! [`normalize_value`] exactly once on each side. Currency symbols, thousands
//! separators and percent signs are stripped, `K`/`M`/`B` suffixes are
//! expanded, and the result is either an integer, a decimal rounded to two
//! places, or the trimmed original text.

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Serialize, Serializer};

use crate::data::Value;

const STRIPPED_SYMBOLS: &[char] = &[',', '$', '₹', '%', '£', '€'];
const NULL_TOKENS: &[&str] = &["nan", "null", "none"];

/// Canonical comparable form of a cell or source value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Integer(i64),
    Decimal(Decimal),
    Text(String),
}

impl Scalar {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Scalar::Text(_))
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Scalar::Integer(i) => Some(Decimal::from(*i)),
            Scalar::Decimal(d) => Some(*d),
            Scalar::Text(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Decimal(d) => d.to_f64(),
            Scalar::Text(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Integer(i) => write!(f, "{i}"),
            Scalar::Decimal(d) => write!(f, "{d}"),
            Scalar::Text(s) => write!(f, "{s}"),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Scalar::Integer(i) => serializer.serialize_i64(*i),
            Scalar::Decimal(d) => match d.to_f64() {
                Some(f) => serializer.serialize_f64(f),
                None => serializer.serialize_str(&d.to_string()),
            },
            Scalar::Text(s) => serializer.serialize_str(s),
        }
    }
}

pub fn normalize_value(raw: &Value) -> Scalar {
    match raw {
        Value::Null => Scalar::Integer(0),
        Value::Integer(i) => Scalar::Integer(*i),
        Value::Float(f) if !f.is_finite() => Scalar::Integer(0),
        Value::Float(f) => match Decimal::from_f64(*f) {
            Some(d) => finish_number(d),
            None => oversized(*f),
        },
        Value::String(s) => normalize_text(s),
        other => Scalar::Text(other.as_display()),
    }
}

/// Normalizes free text as it would appear in an exported cell.
pub fn normalize_text(raw: &str) -> Scalar {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || NULL_TOKENS
            .iter()
            .any(|token| trimmed.eq_ignore_ascii_case(token))
    {
        return Scalar::Integer(0);
    }
    match parse_numeric(trimmed) {
        Some(number) => finish_number(number),
        None => match strip_symbols(trimmed).parse::<f64>() {
            Ok(f) if f.is_finite() => oversized(f),
            _ => Scalar::Text(trimmed.to_string()),
        },
    }
}

/// Numbers outside the `Decimal` range compare by their shortest `f64`
/// rendering on both sides.
fn oversized(value: f64) -> Scalar {
    Scalar::Text(value.to_string())
}

fn strip_symbols(text: &str) -> String {
    text.chars()
        .filter(|c| !STRIPPED_SYMBOLS.contains(c) && !c.is_whitespace())
        .collect()
}

/// Source-side string cleaning applied by the result formatter before a value
/// is stored under its flat key. Final typing happens on read.
pub fn clean_source_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ',' | '£'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Numeric equality after both sides are rounded to two decimal places;
/// text compares verbatim.
pub fn values_match(left: &Scalar, right: &Scalar) -> bool {
    match (left.as_decimal(), right.as_decimal()) {
        (Some(l), Some(r)) => l.round_dp(2) == r.round_dp(2),
        (None, None) => left == right,
        _ => false,
    }
}

fn parse_numeric(text: &str) -> Option<Decimal> {
    let mut body = strip_symbols(text);
    if body.is_empty() {
        return None;
    }

    let mut negative = false;
    if body.starts_with('(') && body.ends_with(')') && body.len() > 2 {
        negative = true;
        body = body[1..body.len() - 1].to_string();
    }

    let multiplier = match body.chars().last() {
        Some('K' | 'k') => Some(Decimal::from(1_000)),
        Some('M' | 'm') => Some(Decimal::from(1_000_000)),
        Some('B' | 'b') => Some(Decimal::from(1_000_000_000)),
        _ => None,
    };
    if multiplier.is_some() {
        body.pop();
    }
    if body.is_empty() {
        return None;
    }

    let parsed = Decimal::from_str(&body)
        .or_else(|_| Decimal::from_scientific(&body))
        .ok()?;
    let scaled = match multiplier {
        Some(factor) => parsed.checked_mul(factor)?,
        None => parsed,
    };
    Some(if negative { -scaled } else { scaled })
}

fn finish_number(value: Decimal) -> Scalar {
    let rounded = value.round_dp(2);
    if rounded.fract().is_zero()
        && let Some(integer) = rounded.to_i64()
    {
        return Scalar::Integer(integer);
    }
    Scalar::Decimal(rounded.normalize())
}
