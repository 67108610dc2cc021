//! Row operation.
//!
//! - [`Row`]
//! - [`Column`]
//! - [`FromRow`]
//! - [`Decode`]
//!
//! - [`Index`]
//! - [`DecodeError`]
use bytes::Bytes;
use std::{borrow::Cow, fmt, str::Utf8Error, string::FromUtf8Error, sync::Arc};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

use crate::{
    blob::BlobId,
    common::unit_error,
    firebird::describe::Descriptor,
    types::{DecFloat, Decimal},
    value::Value,
};

/// A fetched row, one decoded [`Value`] per column.
#[derive(Clone)]
pub struct Row {
    columns: Arc<[Descriptor]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[Descriptor]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Returns `true` if row contains no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Column descriptors, shared with the statement.
    pub fn columns(&self) -> &[Descriptor] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Get a column value without decoding.
    pub fn get_value<I: Index>(&self, idx: I) -> Result<&Value, DecodeError> {
        let nth = idx.position(&self.columns)?;
        Ok(&self.values[nth])
    }

    /// Try get and decode column.
    pub fn try_get<I: Index, R: Decode>(&self, idx: I) -> Result<R, DecodeError> {
        let nth = idx.position(&self.columns)?;
        R::decode(Column {
            columns: self.columns.clone(),
            index: nth,
            value: self.values[nth].clone(),
        })
    }

    /// Try decode type using [`FromRow`] implementation.
    pub fn decode<D: FromRow>(self) -> Result<D, DecodeError> {
        D::from_row(self)
    }
}

impl IntoIterator for Row {
    type Item = Column;

    type IntoIter = IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            columns: self.columns,
            values: self.values.into_iter(),
            index: 0,
        }
    }
}

/// [`IntoIterator`] implementation from [`Row`].
#[derive(Debug)]
pub struct IntoIter {
    columns: Arc<[Descriptor]>,
    values: std::vec::IntoIter<Value>,
    index: usize,
}

impl IntoIter {
    /// Same as [`Iterator::next`] but returns [`Result`] instead.
    pub fn try_next(&mut self) -> Result<Column, DecodeError> {
        self.next().ok_or(DecodeError::IndexOutOfBounds(self.index))
    }
}

impl Iterator for IntoIter {
    type Item = Column;

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.values.next()?;
        let index = self.index;
        self.index += 1;
        Some(Column { columns: self.columns.clone(), index, value })
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_map();
        for (desc, value) in self.columns.iter().zip(&self.values) {
            dbg.entry(&desc.name(), value);
        }
        dbg.finish()
    }
}

/// A single column of a row.
#[derive(Debug, Clone)]
pub struct Column {
    columns: Arc<[Descriptor]>,
    index: usize,
    value: Value,
}

impl Column {
    pub fn descriptor(&self) -> &Descriptor {
        &self.columns[self.index]
    }

    /// Returns column label.
    pub fn name(&self) -> &str {
        self.descriptor().name()
    }

    /// Return `true` if value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self.value, Value::Null)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Try decode type using [`Decode`] implementation.
    pub fn decode<D: Decode>(self) -> Result<D, DecodeError> {
        D::decode(self)
    }
}

/// Statement result with its rows affected.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RowResult {
    pub rows_affected: u64,
}

// ===== Traits =====

/// Type that can be constructed from a row.
pub trait FromRow: Sized {
    /// Construct self from row.
    fn from_row(row: Row) -> Result<Self, DecodeError>;
}

impl FromRow for Row {
    fn from_row(row: Row) -> Result<Self, DecodeError> {
        Ok(row)
    }
}

impl FromRow for () {
    fn from_row(_: Row) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! from_row_tuple {
    ($($t:ident $i:literal),*) => {
        impl<$($t),*> FromRow for ($($t),*,)
        where
            $($t: Decode),*
        {
            fn from_row(row: Row) -> Result<Self, DecodeError> {
                Ok((
                    $(row.try_get($i)?),*,
                ))
            }
        }
    };
}

from_row_tuple!(T0 0);
from_row_tuple!(T0 0, T1 1);
from_row_tuple!(T0 0, T1 1, T2 2);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5);

/// A type that can be constructed from [`Column`].
pub trait Decode: Sized {
    /// Try decode self from column.
    fn decode(column: Column) -> Result<Self, DecodeError>;
}

impl Decode for Column {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        Ok(column)
    }
}

impl Decode for Value {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        Ok(column.value)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        match column.is_null() {
            true => Ok(None),
            false => column.decode().map(Some),
        }
    }
}

impl Decode for () {
    fn decode(_: Column) -> Result<Self, DecodeError> {
        Ok(())
    }
}

fn mismatch(expect: &'static str, found: &Value) -> DecodeError {
    match found {
        Value::Null => DecodeError::Null,
        found => DecodeError::TypeMismatch { expect, found: found.type_name() },
    }
}

/// Decode by matching value variants, each arm may convert.
macro_rules! decode {
    ($ty:ty, $name:literal, |$v:ident| { $($pat:pat => $body:expr,)* }) => {
        impl Decode for $ty {
            fn decode(col: Column) -> Result<Self, DecodeError> {
                match col.value {
                    $($pat => $body,)*
                    ref $v => Err(mismatch($name, $v)),
                }
            }
        }
    };
}

fn out_of_range(ty: &'static str) -> DecodeError {
    DecodeError::OutOfRange(format!("value does not fit {ty}").into())
}

decode!(bool, "boolean", |v| {
    Value::Boolean(b) => Ok(b),
});

decode!(i16, "i16", |v| {
    Value::Integer(i) => i.try_into().map_err(|_| out_of_range("i16")),
});

decode!(i32, "i32", |v| {
    Value::Integer(i) => i.try_into().map_err(|_| out_of_range("i32")),
});

decode!(i64, "i64", |v| {
    Value::Integer(i) => Ok(i),
    Value::Int128(i) => i.try_into().map_err(|_| out_of_range("i64")),
});

decode!(i128, "i128", |v| {
    Value::Integer(i) => Ok(i.into()),
    Value::Int128(i) => Ok(i),
});

decode!(f32, "f32", |v| {
    Value::Float(f) => Ok(f),
});

decode!(f64, "f64", |v| {
    Value::Float(f) => Ok(f.into()),
    Value::Double(f) => Ok(f),
    Value::DecFloat(f) => Ok(f.to_f64()),
});

decode!(Decimal, "decimal", |v| {
    Value::Decimal(d) => Ok(d),
    Value::Integer(i) => Ok(Decimal::new(i.into(), 0)),
    Value::Int128(i) => Ok(Decimal::new(i, 0)),
    Value::DecFloat(DecFloat::Finite(d)) => Ok(d),
});

decode!(DecFloat, "decfloat", |v| {
    Value::DecFloat(d) => Ok(d),
    Value::Decimal(d) => Ok(DecFloat::Finite(d)),
});

decode!(String, "string", |v| {
    Value::Text(s) => Ok(s),
    Value::Bytes(b) => Ok(String::from_utf8(b.into())?),
});

decode!(Bytes, "bytes", |v| {
    Value::Bytes(b) => Ok(b),
    Value::Text(s) => Ok(s.into()),
});

decode!(Vec<u8>, "bytes", |v| {
    Value::Bytes(b) => Ok(b.into()),
    Value::Text(s) => Ok(s.into()),
});

decode!(Date, "date", |v| {
    Value::Date(d) => Ok(d),
});

decode!(Time, "time", |v| {
    Value::Time(t) => Ok(t),
    Value::TimeTz(t, _) => Ok(t),
});

decode!(PrimitiveDateTime, "timestamp", |v| {
    Value::Timestamp(t) => Ok(t),
});

decode!(OffsetDateTime, "timestamp with time zone", |v| {
    Value::TimestampTz(t) => Ok(t),
});

decode!(BlobId, "blob", |v| {
    Value::Blob(id) => Ok(id),
});

/// Type that can be used for indexing column.
pub trait Index: Sized + sealed::Sealed {
    /// Returns nth column.
    fn position(self, columns: &[Descriptor]) -> Result<usize, DecodeError>;
}

impl Index for usize {
    fn position(self, columns: &[Descriptor]) -> Result<usize, DecodeError> {
        match self < columns.len() {
            true => Ok(self),
            false => Err(DecodeError::IndexOutOfBounds(self)),
        }
    }
}

impl Index for &str {
    /// Match column label, case insensitive since unquoted identifiers are
    /// stored uppercase.
    fn position(self, columns: &[Descriptor]) -> Result<usize, DecodeError> {
        columns
            .iter()
            .position(|e| e.name().eq_ignore_ascii_case(self))
            .ok_or_else(|| DecodeError::ColumnNotFound(String::from(self).into()))
    }
}

mod sealed {
    pub trait Sealed { }
    impl Sealed for usize { }
    impl Sealed for &str { }
}

unit_error! {
    /// An error when try to [`fetch_one`][crate::query::Query::fetch_one] and not returns any row.
    pub struct RowNotFound("row not found");
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for DecodeError {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

/// An error when decoding row value.
pub enum DecodeError {
    /// Text is not valid utf8.
    Utf8(Utf8Error),
    /// Column requested not found.
    ColumnNotFound(Cow<'static,str>),
    /// Index requested is out of bounds.
    IndexOutOfBounds(usize),
    /// Requested type does not match the column type.
    TypeMismatch {
        expect: &'static str,
        found: &'static str,
    },
    /// Row is null.
    Null,
    /// Value cannot be represented by the requested type.
    OutOfRange(Cow<'static,str>),
    /// Time zone id missing from the zone table.
    UnknownTimeZone(u16),
    /// Wire value shorter than its type requires.
    Length {
        expect: usize,
        found: usize,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to decode value, ")?;
        match self {
            Self::Utf8(e) => write!(f, "{e}"),
            Self::ColumnNotFound(name) => write!(f, "column not found: {name:?}"),
            Self::IndexOutOfBounds(u) => write!(f, "index out of bounds: {u:?}"),
            Self::TypeMismatch { expect, found } => {
                write!(f, "data type missmatch, expected {expect} found {found}")
            },
            Self::Null => write!(f, "unexpected NULL value"),
            Self::OutOfRange(reason) => f.write_str(reason),
            Self::UnknownTimeZone(id) => write!(f, "unknown time zone id {id}"),
            Self::Length { expect, found } => {
                write!(f, "expected {expect} bytes found {found}")
            },
        }
    }
}

from!(<Utf8Error>e => Self::Utf8(e));
from!(<FromUtf8Error>e => Self::Utf8(e.utf8_error()));

impl std::error::Error for DecodeError { }

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
