/// Result Mapping Module
///
/// Converts column-named tabular output into caller-supplied typed
/// destinations. Every destination type declares a [`Shape`] through the
/// [`Mapped`] trait, computed at compile time, and the engine dispatches on
/// that shape together with the structural kind of each raw [`Value`]:
///
/// | destination shape | row assignment |
/// |---|---|
/// | `Sequence` (`Vec<T>`) | one fresh element per row, appended; keeps reading |
/// | `ByteBlob` / `Temporal` / `Scalar` | first column of the first row |
/// | `Record` (see [`record!`](crate::record)) | columns matched to fields by alias or name |
/// | `Associative` (`HashMap`/`BTreeMap`) | one entry per column |
///
/// Raw values that are themselves maps, records or lists recurse through
/// [`get_value`], so nested results (for example a graph query returning a
/// property map per row) land in equally nested destinations.
///
/// Columns with no matching field and fields with no matching column are
/// skipped. A leaf value that cannot be coerced into its destination type is
/// an error.
mod containers;
mod record;
mod scalar;

pub use record::{assign_record, FieldDef, IntoValue, Record};

use crate::core::{DataError, Result, Value, ValueKind};
use crate::resultset::QueryResult;
use std::any::Any;

/// Structural classification of a destination type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Record,
    Associative,
    Sequence,
    ByteBlob,
    Temporal,
    Null,
}

/// Whether the row loop should keep feeding rows into the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// A type the mapper can materialise.
pub trait Mapped: Sized + 'static {
    const SHAPE: Shape;

    /// Marks `u8`, so that `Vec<u8>` is a byte blob rather than a sequence.
    const IS_BYTE: bool = false;

    /// The value a destination holds before anything is assigned, and the
    /// result of mapping a null.
    fn zero() -> Self;

    /// Direct, possibly lossy, conversion of a raw value.
    fn coerce(raw: Value) -> Result<Self>;

    /// Assigns one row. The default takes the first column.
    fn assign_row(&mut self, _columns: &[String], values: Vec<Value>) -> Result<Flow> {
        if let Some(first) = values.into_iter().next() {
            *self = get_value(first)?;
        }
        Ok(Flow::Stop)
    }

    /// Builds the destination from the elements of a raw list.
    fn from_elements(items: Vec<Value>) -> Result<Self> {
        Self::coerce(Value::List(items))
    }
}

/// Recursively converts one raw value into `T`.
pub fn get_value<T: Mapped>(raw: Value) -> Result<T> {
    let raw = match assignable::<T>(raw) {
        Ok(value) => return Ok(value),
        Err(raw) => raw,
    };

    match (raw, T::SHAPE) {
        (Value::Null, _) => Ok(T::zero()),
        (raw @ (Value::Map(_) | Value::Record(_)), Shape::Record | Shape::Associative) => {
            let (columns, values) = raw.into_pairs().unwrap_or_default();
            let mut dst = T::zero();
            dst.assign_row(&columns, values)?;
            Ok(dst)
        }
        (Value::List(items), Shape::Sequence) => T::from_elements(items),
        (raw, _) => T::coerce(raw),
    }
}

/// Converts one element of a raw list. A leaf element headed for a record or
/// map element is presented as a single-column row under an empty column name.
pub(crate) fn get_element<T: Mapped>(item: Value) -> Result<T> {
    match (item.kind(), T::SHAPE) {
        (ValueKind::Leaf, Shape::Record | Shape::Associative) => {
            let mut dst = T::zero();
            dst.assign_row(&[String::new()], vec![item])?;
            Ok(dst)
        }
        _ => get_value(item),
    }
}

/// Materialises `result` into `dst` and returns how many rows were consumed.
///
/// A sequence destination receives every row. Any other destination is
/// filled from the first row only.
pub fn scan_rows<T, R>(dst: &mut T, result: &mut R) -> Result<u64>
where
    T: Mapped,
    R: QueryResult + ?Sized,
{
    let columns = result.columns()?;
    let mut buf = vec![Value::Null; columns.len()];
    let mut count = 0;
    while result.next() {
        result.scan(&mut buf)?;
        let row = std::mem::replace(&mut buf, vec![Value::Null; columns.len()]);
        let flow = dst.assign_row(&columns, row)?;
        count += 1;
        if flow == Flow::Stop {
            break;
        }
    }
    Ok(count)
}

/// Returns `value` as a `T` when `S` and `T` are the same type.
fn assign_as<S: 'static, T: 'static>(value: S) -> std::result::Result<T, S> {
    let mut slot = Some(value);
    if let Some(target) = (&mut slot as &mut dyn Any).downcast_mut::<Option<T>>() {
        if let Some(value) = target.take() {
            return Ok(value);
        }
    }
    match slot {
        Some(value) => Err(value),
        None => unreachable!("slot is only emptied by a successful downcast"),
    }
}

/// Fast path: hands the raw value, or its payload, over unchanged when the
/// destination type is exactly that type.
fn assignable<T: Mapped>(raw: Value) -> std::result::Result<T, Value> {
    let raw = match assign_as::<Value, T>(raw) {
        Ok(value) => return Ok(value),
        Err(raw) => raw,
    };
    match raw {
        Value::Bool(v) => assign_as(v).map_err(Value::Bool),
        Value::Int(v) => assign_as(v).map_err(Value::Int),
        Value::Float(v) => assign_as(v).map_err(Value::Float),
        Value::Text(v) => assign_as(v).map_err(Value::Text),
        Value::Bytes(v) => assign_as(v).map_err(Value::Bytes),
        Value::Timestamp(v) => assign_as(v).map_err(Value::Timestamp),
        Value::List(v) => assign_as(v).map_err(Value::List),
        Value::Map(v) => assign_as(v).map_err(Value::Map),
        other => Err(other),
    }
}

pub(crate) fn mismatch<T>(raw: &Value) -> DataError {
    DataError::conversion(std::any::type_name::<T>(), raw)
}
