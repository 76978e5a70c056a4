//! Type mapping between Rust values and PostgreSQL.
//!
//! `Value` is the host-side representation of a single SQL datum. It is used
//! both for bound parameters (constraint leaves, inserted/updated fields) and
//! for decoded result columns. Column types map to the nearest native type;
//! nothing is coerced lossily.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgHasArrayType, PgRow};
use sqlx::{Arguments, Column, Encode, Postgres, Row as SqlxRow, Type, TypeInfo};
use uuid::Uuid;

use crate::{RelsetError, Result};

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean (BOOLEAN)
    Bool(bool),
    /// Small integer (SMALLINT)
    SmallInt(i16),
    /// Integer (INTEGER)
    Int(i32),
    /// Big integer (BIGINT)
    BigInt(i64),
    /// Single-precision float (REAL)
    Float(f32),
    /// Double-precision float (DOUBLE PRECISION)
    Double(f64),
    /// Variable-length string (VARCHAR, TEXT)
    String(String),
    /// Binary data (BYTEA)
    Bytes(Vec<u8>),
    /// UUID (UUID)
    Uuid(Uuid),
    /// Date (DATE)
    Date(NaiveDate),
    /// Time (TIME)
    Time(NaiveTime),
    /// Timestamp without timezone (TIMESTAMP)
    Timestamp(NaiveDateTime),
    /// Timestamp with timezone (TIMESTAMPTZ)
    TimestampTz(DateTime<Utc>),
    /// JSON/JSONB (JSON, JSONB)
    Json(JsonValue),
    /// Array of values (ARRAY)
    Array(Vec<Value>),
    /// Decimal/Numeric (NUMERIC, DECIMAL)
    Decimal(Decimal),
}

impl Value {
    /// Returns the PostgreSQL type name for this value.
    pub fn pg_type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::SmallInt(_) => "SMALLINT",
            Value::Int(_) => "INTEGER",
            Value::BigInt(_) => "BIGINT",
            Value::Float(_) => "REAL",
            Value::Double(_) => "DOUBLE PRECISION",
            Value::String(_) => "TEXT",
            Value::Bytes(_) => "BYTEA",
            Value::Uuid(_) => "UUID",
            Value::Date(_) => "DATE",
            Value::Time(_) => "TIME",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::TimestampTz(_) => "TIMESTAMPTZ",
            Value::Json(_) => "JSONB",
            Value::Array(_) => "ARRAY",
            Value::Decimal(_) => "NUMERIC",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of any of the integer variants.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::SmallInt(_)
                | Value::Int(_)
                | Value::BigInt(_)
                | Value::Float(_)
                | Value::Double(_)
                | Value::Decimal(_)
        )
    }

    /// SQL type the value is bound as, written after its placeholder.
    /// Arrays follow the binding rules of `bind_to_arguments`: native when
    /// homogeneous, `jsonb` otherwise.
    pub fn sql_type(&self) -> String {
        match self {
            Value::Null | Value::String(_) => "text",
            Value::Bool(_) => "bool",
            Value::SmallInt(_) => "int2",
            Value::Int(_) => "int4",
            Value::BigInt(_) => "int8",
            Value::Float(_) => "float4",
            Value::Double(_) => "float8",
            Value::Bytes(_) => "bytea",
            Value::Uuid(_) => "uuid",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
            Value::Json(_) => "jsonb",
            Value::Decimal(_) => "numeric",
            Value::Array(values) => return array_sql_type(values),
        }
        .to_string()
    }

    /// Integers widened to `BigInt`, through arrays too: `Int(7)` and
    /// `BigInt(7)` denote the same number.
    pub(crate) fn widened(&self) -> Value {
        match self {
            Value::SmallInt(v) => Value::BigInt(i64::from(*v)),
            Value::Int(v) => Value::BigInt(i64::from(*v)),
            Value::Array(values) => Value::Array(values.iter().map(Value::widened).collect()),
            other => other.clone(),
        }
    }

    /// Deterministic textual key, used to order constraint nodes.
    pub(crate) fn canonical_key(&self) -> String {
        format!("{}:{:?}", self.pg_type_name(), self)
    }

    /// Bind this value to a sqlx argument list.
    ///
    /// # Errors
    ///
    /// Returns error if binding fails (e.g., type incompatibility).
    pub fn bind_to_arguments(&self, arguments: &mut PgArguments) -> Result<()> {
        match self {
            // Typed as TEXT; NULL literals are normally emitted inline instead
            Value::Null => add(arguments, Option::<String>::None, "NULL"),
            Value::Bool(v) => add(arguments, *v, "BOOL"),
            Value::SmallInt(v) => add(arguments, *v, "SMALLINT"),
            Value::Int(v) => add(arguments, *v, "INT"),
            Value::BigInt(v) => add(arguments, *v, "BIGINT"),
            Value::Float(v) => add(arguments, *v, "FLOAT"),
            Value::Double(v) => add(arguments, *v, "DOUBLE"),
            Value::String(v) => add(arguments, v.as_str(), "STRING"),
            Value::Bytes(v) => add(arguments, v.as_slice(), "BYTES"),
            Value::Uuid(v) => add(arguments, *v, "UUID"),
            Value::Date(v) => add(arguments, *v, "DATE"),
            Value::Time(v) => add(arguments, *v, "TIME"),
            Value::Timestamp(v) => add(arguments, *v, "TIMESTAMP"),
            Value::TimestampTz(v) => add(arguments, *v, "TIMESTAMPTZ"),
            Value::Json(v) => add(arguments, v.clone(), "JSON"),
            Value::Decimal(v) => add(arguments, *v, "DECIMAL"),
            Value::Array(values) => bind_array(values, arguments),
        }
    }
}

fn add<'q, T>(arguments: &mut PgArguments, value: T, label: &str) -> Result<()>
where
    T: Encode<'q, Postgres> + Type<Postgres> + 'q,
{
    arguments
        .add(value)
        .map_err(|e| RelsetError::Query(format!("Failed to bind {}: {}", label, e)))
}

/// Binds homogeneous arrays as native PostgreSQL arrays; anything else
/// (mixed element types, nested arrays) falls back to a JSON array.
fn bind_array(values: &[Value], arguments: &mut PgArguments) -> Result<()> {
    let element_type = values.iter().find(|v| !v.is_null());

    match element_type {
        None => add(arguments, vec![Option::<String>::None; values.len()], "NULL ARRAY"),
        Some(Value::Bool(_)) => bind_homogeneous(values, arguments, "BOOL[]", |v| match v {
            Value::Bool(b) => Some(Some(*b)),
            Value::Null => Some(None),
            _ => None,
        }),
        Some(Value::SmallInt(_)) => bind_homogeneous(values, arguments, "INT2[]", |v| match v {
            Value::SmallInt(i) => Some(Some(*i)),
            Value::Null => Some(None),
            _ => None,
        }),
        Some(Value::Int(_)) => bind_homogeneous(values, arguments, "INT4[]", |v| match v {
            Value::Int(i) => Some(Some(*i)),
            Value::Null => Some(None),
            _ => None,
        }),
        Some(Value::BigInt(_)) => bind_homogeneous(values, arguments, "INT8[]", |v| match v {
            Value::BigInt(i) => Some(Some(*i)),
            Value::Null => Some(None),
            _ => None,
        }),
        Some(Value::Double(_)) => bind_homogeneous(values, arguments, "FLOAT8[]", |v| match v {
            Value::Double(f) => Some(Some(*f)),
            Value::Null => Some(None),
            _ => None,
        }),
        Some(Value::String(_)) => bind_homogeneous(values, arguments, "TEXT[]", |v| match v {
            Value::String(s) => Some(Some(s.clone())),
            Value::Null => Some(None),
            _ => None,
        }),
        Some(Value::Uuid(_)) => bind_homogeneous(values, arguments, "UUID[]", |v| match v {
            Value::Uuid(u) => Some(Some(*u)),
            Value::Null => Some(None),
            _ => None,
        }),
        _ => bind_array_as_json(values, arguments),
    }
}

fn array_sql_type(values: &[Value]) -> String {
    let Some(first) = values.iter().find(|v| !v.is_null()) else {
        return "text[]".to_string();
    };
    let native = matches!(
        first,
        Value::Bool(_)
            | Value::SmallInt(_)
            | Value::Int(_)
            | Value::BigInt(_)
            | Value::Double(_)
            | Value::String(_)
            | Value::Uuid(_)
    );
    let homogeneous = values
        .iter()
        .all(|v| v.is_null() || std::mem::discriminant(v) == std::mem::discriminant(first));
    if native && homogeneous {
        format!("{}[]", first.sql_type())
    } else {
        "jsonb".to_string()
    }
}

/// `extract` returns `None` when an element does not belong to the array's
/// element type, in which case the whole array is sent as JSON.
fn bind_homogeneous<T>(
    values: &[Value],
    arguments: &mut PgArguments,
    label: &str,
    extract: impl Fn(&Value) -> Option<Option<T>>,
) -> Result<()>
where
    T: for<'q> Encode<'q, Postgres> + Type<Postgres> + PgHasArrayType + 'static,
{
    let elements: Option<Vec<Option<T>>> = values.iter().map(&extract).collect();
    match elements {
        Some(elements) => add(arguments, elements, label),
        None => bind_array_as_json(values, arguments),
    }
}

/// Helper function to bind array as JSON (fallback for heterogeneous/complex arrays).
fn bind_array_as_json(values: &[Value], arguments: &mut PgArguments) -> Result<()> {
    let json_array: Vec<JsonValue> = values.iter().map(value_to_json).collect();
    add(arguments, JsonValue::Array(json_array), "ARRAY as JSON")
}

/// Converts a value to its JSON representation.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(v) => JsonValue::Bool(*v),
        Value::SmallInt(v) => JsonValue::Number((*v).into()),
        Value::Int(v) => JsonValue::Number((*v).into()),
        Value::BigInt(v) => JsonValue::Number((*v).into()),
        Value::Float(v) => serde_json::Number::from_f64(f64::from(*v))
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Double(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::String(v) => JsonValue::String(v.clone()),
        Value::Bytes(v) => {
            // Encode bytes as hex string
            let hex_string = v.iter().map(|b| format!("{:02x}", b)).collect::<String>();
            JsonValue::String(hex_string)
        }
        Value::Uuid(v) => JsonValue::String(v.to_string()),
        Value::Date(v) => JsonValue::String(v.to_string()),
        Value::Time(v) => JsonValue::String(v.to_string()),
        Value::Timestamp(v) => JsonValue::String(v.to_string()),
        Value::TimestampTz(v) => JsonValue::String(v.to_rfc3339()),
        Value::Json(v) => v.clone(),
        Value::Array(values) => JsonValue::Array(values.iter().map(value_to_json).collect()),
        Value::Decimal(v) => JsonValue::String(v.to_string()),
    }
}

/// Builds a positional argument list from values, in order.
pub fn bind_all(params: &[Value]) -> Result<PgArguments> {
    let mut args = PgArguments::default();
    for param in params {
        param.bind_to_arguments(&mut args)?;
    }
    Ok(args)
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Float,
    f64 => Double,
    String => String,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    JsonValue => Json,
    Decimal => Decimal,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value
where
    T: NotBytes,
{
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

/// Marker keeping `Vec<u8>` mapped to BYTEA rather than to an array.
pub trait NotBytes {}
impl NotBytes for bool {}
impl NotBytes for i16 {}
impl NotBytes for i32 {}
impl NotBytes for i64 {}
impl NotBytes for f32 {}
impl NotBytes for f64 {}
impl NotBytes for Decimal {}
impl NotBytes for String {}
impl NotBytes for &str {}
impl NotBytes for Uuid {}
impl NotBytes for NaiveDate {}
impl NotBytes for NaiveDateTime {}
impl NotBytes for DateTime<Utc> {}
impl NotBytes for Value {}

/// Decodes every column of a result row, in result order.
///
/// # Errors
///
/// Returns error if column extraction or type conversion fails.
pub fn row_to_values(row: &PgRow) -> Result<Vec<(String, Value)>> {
    let mut columns = Vec::with_capacity(row.columns().len());

    for (idx, column) in row.columns().iter().enumerate() {
        let column_name = column.name().to_string();
        let type_name = column.type_info().name().to_string();
        let value = decode_column(row, idx, &column_name, &type_name)?;
        columns.push((column_name, value));
    }

    Ok(columns)
}

fn decode_column(row: &PgRow, idx: usize, column_name: &str, type_name: &str) -> Result<Value> {
    let value = match type_name {
        "BOOL" | "BOOLEAN" => scalar::<bool>(row, idx, column_name, "BOOL", Value::Bool)?,
        "INT2" | "SMALLINT" => scalar::<i16>(row, idx, column_name, "SMALLINT", Value::SmallInt)?,
        "INT4" | "INTEGER" | "INT" => scalar::<i32>(row, idx, column_name, "INT", Value::Int)?,
        "INT8" | "BIGINT" => scalar::<i64>(row, idx, column_name, "BIGINT", Value::BigInt)?,
        "FLOAT4" | "REAL" => scalar::<f32>(row, idx, column_name, "FLOAT", Value::Float)?,
        "FLOAT8" | "DOUBLE PRECISION" => {
            scalar::<f64>(row, idx, column_name, "DOUBLE", Value::Double)?
        }
        "VARCHAR" | "TEXT" | "CHAR" | "BPCHAR" | "NAME" => {
            scalar::<String>(row, idx, column_name, "STRING", Value::String)?
        }
        "BYTEA" => scalar::<Vec<u8>>(row, idx, column_name, "BYTES", Value::Bytes)?,
        "UUID" => scalar::<Uuid>(row, idx, column_name, "UUID", Value::Uuid)?,
        "DATE" => scalar::<NaiveDate>(row, idx, column_name, "DATE", Value::Date)?,
        "TIME" => scalar::<NaiveTime>(row, idx, column_name, "TIME", Value::Time)?,
        "TIMESTAMP" => scalar::<NaiveDateTime>(row, idx, column_name, "TIMESTAMP", Value::Timestamp)?,
        "TIMESTAMPTZ" => {
            scalar::<DateTime<Utc>>(row, idx, column_name, "TIMESTAMPTZ", Value::TimestampTz)?
        }
        "JSON" | "JSONB" => scalar::<JsonValue>(row, idx, column_name, "JSON", Value::Json)?,
        "NUMERIC" => scalar::<Decimal>(row, idx, column_name, "NUMERIC", Value::Decimal)?,
        "_BOOL" => extract_array::<bool>(row, idx, column_name, Value::Bool)?,
        "_INT2" => extract_array::<i16>(row, idx, column_name, Value::SmallInt)?,
        "_INT4" => extract_array::<i32>(row, idx, column_name, Value::Int)?,
        "_INT8" => extract_array::<i64>(row, idx, column_name, Value::BigInt)?,
        "_FLOAT4" => extract_array::<f32>(row, idx, column_name, Value::Float)?,
        "_FLOAT8" => extract_array::<f64>(row, idx, column_name, Value::Double)?,
        "_TEXT" | "_VARCHAR" => extract_array::<String>(row, idx, column_name, Value::String)?,
        "_UUID" => extract_array::<Uuid>(row, idx, column_name, Value::Uuid)?,

        // Enums, domains and other user types arrive in text form
        unknown => {
            tracing::debug!(
                column = column_name,
                pg_type = unknown,
                "Unmapped PostgreSQL type, decoding as text"
            );
            match row.try_get_unchecked::<Option<String>, _>(idx) {
                Ok(Some(v)) => Value::String(v),
                Ok(None) => Value::Null,
                Err(e) => {
                    return Err(RelsetError::Deserialization(format!(
                        "Failed to extract type '{}' from column '{}': {}",
                        unknown, column_name, e
                    )))
                }
            }
        }
    };
    Ok(value)
}

fn scalar<T>(
    row: &PgRow,
    idx: usize,
    column_name: &str,
    label: &str,
    convert: impl Fn(T) -> Value,
) -> Result<Value>
where
    T: for<'a> sqlx::Decode<'a, Postgres> + Type<Postgres>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(v)) => Ok(convert(v)),
        Ok(None) => Ok(Value::Null),
        Err(e) => Err(RelsetError::Deserialization(format!(
            "Failed to extract {} from column '{}': {}",
            label, column_name, e
        ))),
    }
}

fn extract_array<T>(
    row: &PgRow,
    idx: usize,
    column_name: &str,
    convert: impl Fn(T) -> Value,
) -> Result<Value>
where
    T: for<'a> sqlx::Decode<'a, Postgres> + Type<Postgres> + PgHasArrayType,
{
    match row.try_get::<Option<Vec<Option<T>>>, _>(idx) {
        Ok(Some(vec)) => Ok(Value::Array(
            vec.into_iter()
                .map(|v| v.map_or(Value::Null, &convert))
                .collect(),
        )),
        Ok(None) => Ok(Value::Null),
        Err(e) => Err(RelsetError::Deserialization(format!(
            "Failed to extract array from column '{}': {}",
            column_name, e
        ))),
    }
}
