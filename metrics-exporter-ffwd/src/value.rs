use std::{fmt, ops::Add};

use serde::{Deserialize, Serialize};

/// A metric value.
///
/// Values are either signed integers or floating-point numbers, and are serialized as a bare JSON number. Adding two
/// integers yields an integer, while adding anything to a floating-point value yields a floating-point value.
///
/// Only signed 64-bit integers are representable: converting a `u64` or `usize` above `i64::MAX` clamps it to
/// `i64::MAX`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// An integer value.
    Integer(i64),

    /// A floating-point value.
    Float(f64),
}

impl Value {
    /// Returns the value as a floating-point number.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Value::Integer(v) => v as f64,
            Value::Float(v) => v,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Integer(0)
    }
}

impl Add for Value {
    type Output = Value;

    fn add(self, rhs: Value) -> Value {
        match (self, rhs) {
            // Integer overflow pins at the bounds rather than wrapping around into nonsense.
            (Value::Integer(a), Value::Integer(b)) => Value::Integer(a.saturating_add(b)),
            (a, b) => Value::Float(a.as_f64() + b.as_f64()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from_lossless {
    ($variant:ident, $target:ty, $($ty:ty),+) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(<$target>::from(v))
                }
            }
        )+
    };
}

impl_from_lossless!(Integer, i64, i8, i16, i32, i64, u8, u16, u32);
impl_from_lossless!(Float, f64, f32, f64);

/// Values above `i64::MAX` are clamped to `i64::MAX`.
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

/// Values above `i64::MAX` are clamped to `i64::MAX`.
impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::Value;

    #[test]
    fn integer_addition_stays_integral() {
        assert_eq!(Value::Integer(2) + Value::Integer(3), Value::Integer(5));
        assert_eq!(Value::Integer(i64::MAX) + Value::Integer(1), Value::Integer(i64::MAX));
    }

    #[test]
    fn float_operand_promotes() {
        assert_eq!(Value::Integer(1) + Value::Float(0.5), Value::Float(1.5));
        assert_eq!(Value::Float(0.25) + Value::Integer(2), Value::Float(2.25));
    }

    #[test]
    fn serializes_as_bare_number() {
        assert_eq!(serde_json::to_string(&Value::Integer(22)).unwrap(), "22");
        assert_eq!(serde_json::to_string(&Value::Float(1_000_000_000.0)).unwrap(), "1000000000.0");

        let parsed: Value = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, Value::Integer(7));
        let parsed: Value = serde_json::from_str("7.5").unwrap();
        assert_eq!(parsed, Value::Float(7.5));
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::from(3u32), Value::Integer(3));
        assert_eq!(Value::from(u64::MAX), Value::Integer(i64::MAX));
        assert_eq!(Value::from(42usize), Value::Integer(42));
        assert_eq!(Value::from(1.5f32), Value::Float(1.5));
    }
}
