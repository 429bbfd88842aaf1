//! Sequence, optional and associative destinations.

use super::{get_element, get_value, mismatch, Flow, Mapped, Shape};
use crate::core::{Result, Value};
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

impl<T: Mapped> Mapped for Vec<T> {
    const SHAPE: Shape = if T::IS_BYTE {
        Shape::ByteBlob
    } else {
        Shape::Sequence
    };

    fn zero() -> Self {
        Vec::new()
    }

    fn coerce(raw: Value) -> Result<Self> {
        match raw {
            Value::Bytes(bytes) if T::IS_BYTE => bytes
                .into_iter()
                .map(|b| T::coerce(Value::Int(b as i64)))
                .collect(),
            Value::Text(text) if T::IS_BYTE => text
                .into_bytes()
                .into_iter()
                .map(|b| T::coerce(Value::Int(b as i64)))
                .collect(),
            Value::List(items) => items.into_iter().map(get_value).collect(),
            other => Err(mismatch::<Self>(&other)),
        }
    }

    fn assign_row(&mut self, columns: &[String], values: Vec<Value>) -> Result<Flow> {
        if T::IS_BYTE {
            if let Some(first) = values.into_iter().next() {
                *self = get_value(first)?;
            }
            return Ok(Flow::Stop);
        }
        let mut element = T::zero();
        element.assign_row(columns, values)?;
        self.push(element);
        Ok(Flow::Continue)
    }

    fn from_elements(items: Vec<Value>) -> Result<Self> {
        items.into_iter().map(get_element).collect()
    }
}

/// `None` maps from null. Any other input lazily creates the inner value.
impl<T: Mapped> Mapped for Option<T> {
    const SHAPE: Shape = T::SHAPE;

    fn zero() -> Self {
        None
    }

    fn coerce(raw: Value) -> Result<Self> {
        T::coerce(raw).map(Some)
    }

    fn assign_row(&mut self, columns: &[String], values: Vec<Value>) -> Result<Flow> {
        self.get_or_insert_with(T::zero).assign_row(columns, values)
    }

    fn from_elements(items: Vec<Value>) -> Result<Self> {
        T::from_elements(items).map(Some)
    }
}

impl<T: Mapped, S: BuildHasher + Default + 'static> Mapped for HashMap<String, T, S> {
    const SHAPE: Shape = Shape::Associative;

    fn zero() -> Self {
        HashMap::default()
    }

    fn coerce(raw: Value) -> Result<Self> {
        Err(mismatch::<Self>(&raw))
    }

    fn assign_row(&mut self, columns: &[String], values: Vec<Value>) -> Result<Flow> {
        for (column, value) in columns.iter().zip(values) {
            self.insert(column.clone(), get_value(value)?);
        }
        Ok(Flow::Stop)
    }
}

impl<T: Mapped> Mapped for BTreeMap<String, T> {
    const SHAPE: Shape = Shape::Associative;

    fn zero() -> Self {
        BTreeMap::new()
    }

    fn coerce(raw: Value) -> Result<Self> {
        Err(mismatch::<Self>(&raw))
    }

    fn assign_row(&mut self, columns: &[String], values: Vec<Value>) -> Result<Flow> {
        for (column, value) in columns.iter().zip(values) {
            self.insert(column.clone(), get_value(value)?);
        }
        Ok(Flow::Stop)
    }
}
