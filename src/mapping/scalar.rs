//! Leaf destinations: booleans, numbers, text, dynamic values and temporals.

use super::{mismatch, Mapped, Shape};
use crate::core::{Result, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

fn text_of(raw: &Value) -> Option<&str> {
    match raw {
        Value::Text(s) => Some(s),
        Value::Bytes(b) => std::str::from_utf8(b).ok(),
        _ => None,
    }
}

impl Mapped for bool {
    const SHAPE: Shape = Shape::Scalar;

    fn zero() -> Self {
        false
    }

    fn coerce(raw: Value) -> Result<Self> {
        match &raw {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Float(f) => Ok(*f != 0.0),
            _ => match text_of(&raw).map(|s| s.trim().to_ascii_lowercase()).as_deref() {
                Some("true" | "t" | "1" | "yes") => Ok(true),
                Some("false" | "f" | "0" | "no") => Ok(false),
                _ => Err(mismatch::<bool>(&raw)),
            },
        }
    }
}

/// Integer coercion through `i64`, rejecting overflow and fractional floats.
fn to_i64(raw: &Value) -> Option<i64> {
    match raw {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(*b as i64),
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 => {
            if *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                Some(*f as i64)
            } else {
                None
            }
        }
        Value::Timestamp(t) => Some(t.timestamp()),
        _ => text_of(raw).and_then(|s| s.trim().parse().ok()),
    }
}

macro_rules! impl_integer {
    ($($ty:ty => $is_byte:expr),* $(,)?) => {
        $(
            impl Mapped for $ty {
                const SHAPE: Shape = Shape::Scalar;
                const IS_BYTE: bool = $is_byte;

                fn zero() -> Self {
                    0
                }

                fn coerce(raw: Value) -> Result<Self> {
                    // Text is parsed at full width so u64 values above i64::MAX survive.
                    if let Some(n) = text_of(&raw).and_then(|s| s.trim().parse::<$ty>().ok()) {
                        return Ok(n);
                    }
                    to_i64(&raw)
                        .and_then(|i| <$ty>::try_from(i).ok())
                        .ok_or_else(|| mismatch::<$ty>(&raw))
                }
            }
        )*
    };
}

impl_integer!(
    i8 => false,
    i16 => false,
    i32 => false,
    i64 => false,
    isize => false,
    u8 => true,
    u16 => false,
    u32 => false,
    u64 => false,
    usize => false,
);

fn to_f64(raw: &Value) -> Option<f64> {
    match raw {
        Value::Float(f) => Some(*f),
        Value::Int(i) => Some(*i as f64),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => text_of(raw).and_then(|s| s.trim().parse().ok()),
    }
}

impl Mapped for f64 {
    const SHAPE: Shape = Shape::Scalar;

    fn zero() -> Self {
        0.0
    }

    fn coerce(raw: Value) -> Result<Self> {
        to_f64(&raw).ok_or_else(|| mismatch::<f64>(&raw))
    }
}

impl Mapped for f32 {
    const SHAPE: Shape = Shape::Scalar;

    fn zero() -> Self {
        0.0
    }

    fn coerce(raw: Value) -> Result<Self> {
        to_f64(&raw)
            .map(|f| f as f32)
            .ok_or_else(|| mismatch::<f32>(&raw))
    }
}

impl Mapped for String {
    const SHAPE: Shape = Shape::Scalar;

    fn zero() -> Self {
        String::new()
    }

    fn coerce(raw: Value) -> Result<Self> {
        match raw {
            Value::Text(s) => Ok(s),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Timestamp(t) => Ok(t.to_rfc3339()),
            Value::Bytes(b) => String::from_utf8(b)
                .map_err(|e| mismatch::<String>(&Value::Bytes(e.into_bytes()))),
            Value::Null => Ok(String::new()),
            structured => Ok(structured.to_json().to_string()),
        }
    }
}

impl Mapped for Value {
    const SHAPE: Shape = Shape::Scalar;

    fn zero() -> Self {
        Value::Null
    }

    fn coerce(raw: Value) -> Result<Self> {
        Ok(raw)
    }
}

impl Mapped for serde_json::Value {
    const SHAPE: Shape = Shape::Scalar;

    fn zero() -> Self {
        serde_json::Value::Null
    }

    fn coerce(raw: Value) -> Result<Self> {
        Ok(raw.to_json())
    }
}

/// A value that holds nothing; mapping into it discards the input.
impl Mapped for () {
    const SHAPE: Shape = Shape::Null;

    fn zero() -> Self {}

    fn coerce(_raw: Value) -> Result<Self> {
        Ok(())
    }

    fn assign_row(&mut self, _columns: &[String], _values: Vec<Value>) -> Result<super::Flow> {
        Ok(super::Flow::Stop)
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]` and bare dates, read as UTC.
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn to_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::Timestamp(t) => Some(*t),
        Value::Int(secs) => Utc.timestamp_opt(*secs, 0).single(),
        _ => text_of(raw).and_then(parse_timestamp),
    }
}

impl Mapped for DateTime<Utc> {
    const SHAPE: Shape = Shape::Temporal;

    fn zero() -> Self {
        DateTime::<Utc>::default()
    }

    fn coerce(raw: Value) -> Result<Self> {
        to_timestamp(&raw).ok_or_else(|| mismatch::<Self>(&raw))
    }
}

impl Mapped for NaiveDateTime {
    const SHAPE: Shape = Shape::Temporal;

    fn zero() -> Self {
        NaiveDateTime::default()
    }

    fn coerce(raw: Value) -> Result<Self> {
        to_timestamp(&raw)
            .map(|t| t.naive_utc())
            .ok_or_else(|| mismatch::<Self>(&raw))
    }
}

impl Mapped for NaiveDate {
    const SHAPE: Shape = Shape::Temporal;

    fn zero() -> Self {
        NaiveDate::default()
    }

    fn coerce(raw: Value) -> Result<Self> {
        to_timestamp(&raw)
            .map(|t| t.date_naive())
            .ok_or_else(|| mismatch::<Self>(&raw))
    }
}
