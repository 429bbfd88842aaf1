//! Record destinations and the reverse conversion back into [`Value`].

use crate::core::{Result, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};

/// Field metadata for a record type: the field name and an optional column
/// alias that replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub alias: Option<&'static str>,
}

impl FieldDef {
    pub const fn new(name: &'static str, alias: Option<&'static str>) -> Self {
        FieldDef { name, alias }
    }

    /// The column this field reads from.
    pub fn column(&self) -> &'static str {
        match self.alias {
            Some(alias) => alias,
            None => self.name,
        }
    }
}

/// A struct whose fields are assigned from named columns. Implemented by
/// [`record!`](crate::record).
pub trait Record {
    fn fields() -> &'static [FieldDef];

    /// Assigns `raw` to the field at `index` in [`Record::fields`].
    fn set_field(&mut self, index: usize, raw: Value) -> Result<()>;
}

/// Assigns each column to the first field that claims it. Columns no field
/// claims are skipped.
pub fn assign_record<T: Record>(dst: &mut T, columns: &[String], values: Vec<Value>) -> Result<()> {
    let fields = T::fields();
    for (column, value) in columns.iter().zip(values) {
        if let Some(index) = fields.iter().position(|f| f.column() == column) {
            dst.set_field(index, value)?;
        }
    }
    Ok(())
}

/// Conversion of a typed value into the dynamic [`Value`] representation.
pub trait IntoValue {
    #[doc(hidden)]
    const IS_BYTE: bool = false;

    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

macro_rules! impl_into_int {
    ($($ty:ty),*) => {
        $(
            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    Value::Int(self as i64)
                }
            }
        )*
    };
}

impl_into_int!(i8, i16, i32, i64, isize, u16, u32);

macro_rules! impl_into_wide_unsigned {
    ($($ty:ty),*) => {
        $(
            // Values above i64::MAX travel as decimal text.
            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    i64::try_from(self)
                        .map(Value::Int)
                        .unwrap_or_else(|_| Value::Text(self.to_string()))
                }
            }
        )*
    };
}

impl_into_wide_unsigned!(u64, usize);

impl IntoValue for u8 {
    const IS_BYTE: bool = true;

    fn into_value(self) -> Value {
        Value::Int(self as i64)
    }
}

impl IntoValue for f32 {
    fn into_value(self) -> Value {
        Value::Float(self as f64)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Text(self.to_string())
    }
}

impl IntoValue for DateTime<Utc> {
    fn into_value(self) -> Value {
        Value::Timestamp(self)
    }
}

impl IntoValue for NaiveDateTime {
    fn into_value(self) -> Value {
        Value::Timestamp(Utc.from_utc_datetime(&self))
    }
}

impl IntoValue for NaiveDate {
    fn into_value(self) -> Value {
        Value::Text(self.format("%Y-%m-%d").to_string())
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        self.map_or(Value::Null, IntoValue::into_value)
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        let items = self.into_iter().map(IntoValue::into_value);
        if T::IS_BYTE {
            Value::Bytes(
                items
                    .filter_map(|v| match v {
                        Value::Int(b) => u8::try_from(b).ok(),
                        _ => None,
                    })
                    .collect(),
            )
        } else {
            Value::List(items.collect())
        }
    }
}

impl<T: IntoValue, S> IntoValue for HashMap<String, T, S> {
    fn into_value(self) -> Value {
        Value::Map(self.into_iter().map(|(k, v)| (k, v.into_value())).collect())
    }
}

impl<T: IntoValue> IntoValue for BTreeMap<String, T> {
    fn into_value(self) -> Value {
        Value::Map(self.into_iter().map(|(k, v)| (k, v.into_value())).collect())
    }
}

/// Declares a struct as a record destination.
///
/// Each listed field is read from the column of the same name, or from the
/// column given after `as`. The struct must implement `Default`, and every
/// listed field type must implement [`Mapped`](crate::mapping::Mapped) and
/// [`IntoValue`].
///
/// ```
/// #[derive(Debug, Default)]
/// struct User {
///     id: i64,
///     name: String,
/// }
/// datarail::record!(User { id as "user_id", name });
///
/// let user: User = datarail::mapping::get_value(datarail::core::Value::Record(vec![
///     ("user_id".to_string(), 7.into()),
///     ("name".to_string(), "ann".into()),
/// ]))
/// .unwrap();
/// assert_eq!(user.id, 7);
/// ```
#[macro_export]
macro_rules! record {
    ($ty:ident { $($field:ident $(as $alias:literal)?),* $(,)? }) => {
        impl $crate::mapping::Record for $ty {
            fn fields() -> &'static [$crate::mapping::FieldDef] {
                const FIELDS: &[$crate::mapping::FieldDef] = &[
                    $($crate::mapping::FieldDef::new(
                        stringify!($field),
                        $crate::__record_alias!($($alias)?),
                    )),*
                ];
                FIELDS
            }

            #[allow(unused_assignments)]
            fn set_field(
                &mut self,
                index: usize,
                raw: $crate::core::Value,
            ) -> $crate::core::Result<()> {
                let mut position = 0usize;
                $(
                    if index == position {
                        self.$field = $crate::mapping::get_value(raw)?;
                        return Ok(());
                    }
                    position += 1;
                )*
                Ok(())
            }
        }

        impl $crate::mapping::Mapped for $ty {
            const SHAPE: $crate::mapping::Shape = $crate::mapping::Shape::Record;

            fn zero() -> Self {
                <$ty as ::std::default::Default>::default()
            }

            fn coerce(raw: $crate::core::Value) -> $crate::core::Result<Self> {
                Err($crate::core::DataError::Conversion {
                    target: stringify!($ty),
                    value: format!("{:?}", raw),
                })
            }

            fn assign_row(
                &mut self,
                columns: &[String],
                values: Vec<$crate::core::Value>,
            ) -> $crate::core::Result<$crate::mapping::Flow> {
                $crate::mapping::assign_record(self, columns, values)?;
                Ok($crate::mapping::Flow::Stop)
            }
        }

        impl $crate::mapping::IntoValue for $ty {
            fn into_value(self) -> $crate::core::Value {
                let fields = <$ty as $crate::mapping::Record>::fields();
                let mut values = Vec::new();
                $(
                    values.push($crate::mapping::IntoValue::into_value(self.$field));
                )*
                $crate::core::Value::Record(
                    fields
                        .iter()
                        .map(|f| f.column().to_string())
                        .zip(values)
                        .collect(),
                )
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_alias {
    () => {
        None
    };
    ($alias:literal) => {
        Some($alias)
    };
}
