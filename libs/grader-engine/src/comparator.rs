/// Value Comparator - Type-Tolerant Equality
///
/// Decides whether a returned value matches the expected one.
/// Integers compare exactly; once either side is fractional or written in
/// scientific form, numbers compare within `EPSILON`. A string that parses
/// fully as a finite number compares numerically against numbers and other
/// numeric strings. Arrays are order-sensitive, objects are key-order-insensitive.
use serde_json::{Number, Value};

pub const EPSILON: f64 = 1e-9;

/// A numeric reading of a JSON number or numeric string
#[derive(Debug, Clone, Copy, PartialEq)]
enum Numeric {
    Integer(i128),
    Float(f64),
}

impl Numeric {
    fn from_number(n: &Number) -> Option<Self> {
        if let Some(i) = n.as_i64() {
            return Some(Numeric::Integer(i128::from(i)));
        }
        if let Some(u) = n.as_u64() {
            return Some(Numeric::Integer(i128::from(u)));
        }
        n.as_f64().filter(|f| f.is_finite()).map(Numeric::Float)
    }

    /// The whole string, untrimmed, as a finite decimal or scientific number
    fn parse(s: &str) -> Option<Self> {
        let looks_numeric = !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
        if !looks_numeric {
            return None;
        }

        let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(i) = s.parse::<i128>() {
                return Some(Numeric::Integer(i));
            }
        }

        s.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Numeric::Float)
    }

    fn as_f64(self) -> f64 {
        match self {
            Numeric::Integer(i) => i as f64,
            Numeric::Float(f) => f,
        }
    }

    fn matches(self, other: Numeric) -> bool {
        match (self, other) {
            (Numeric::Integer(a), Numeric::Integer(b)) => a == b,
            _ => (self.as_f64() - other.as_f64()).abs() < EPSILON,
        }
    }
}

pub fn equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,

        (Value::Number(a), Value::Number(b)) => {
            numbers_match(Numeric::from_number(a), Numeric::from_number(b))
        }

        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            numbers_match(Numeric::from_number(n), Numeric::parse(s))
        }

        (Value::String(a), Value::String(b)) => {
            match (Numeric::parse(a), Numeric::parse(b)) {
                (Some(x), Some(y)) => x.matches(y),
                _ => a == b,
            }
        }

        (Value::Bool(a), Value::Bool(b)) => a == b,

        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equal(x, y))
        }

        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).map_or(false, |y| equal(x, y)))
        }

        _ => false,
    }
}

fn numbers_match(a: Option<Numeric>, b: Option<Numeric>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.matches(b),
        _ => false,
    }
}
