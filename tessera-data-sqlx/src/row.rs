//! Conversion between Tessera values and SQLite arguments and rows.

use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use tessera_data::{DataError, Record, Value};

use crate::error::SqlxErrorExt;

/// Prepare `sql` with `binds` attached in placeholder order.
pub(crate) fn bind_all<'q>(
    sql: &'q str,
    binds: &'q [Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    binds.iter().fold(sqlx::query(sql), |query, value| match value {
        Value::Null => query.bind(None::<i64>),
        Value::Bool(b) => query.bind(*b),
        Value::I64(i) => query.bind(*i),
        Value::F64(f) => query.bind(*f),
        Value::String(s) => query.bind(s.as_str()),
    })
}

/// Read every column of `row` into a record, keyed by column name.
pub(crate) fn decode_row(row: &SqliteRow) -> Result<Record, DataError> {
    let mut record = Record::new();
    for column in row.columns() {
        record.insert(column.name(), decode_value(row, column.ordinal())?);
    }
    Ok(record)
}

fn decode_value(row: &SqliteRow, index: usize) -> Result<Value, DataError> {
    let raw = row.try_get_raw(index).map_err(SqlxErrorExt::into_data_error)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    // SQLite reports the storage class of the value, not the declared type.
    let storage = raw.type_info().name().to_ascii_uppercase();
    let value = match storage.as_str() {
        "INTEGER" => row.try_get_unchecked::<i64, _>(index).map(Value::I64),
        "BOOLEAN" => row.try_get_unchecked::<bool, _>(index).map(Value::Bool),
        "REAL" => row.try_get_unchecked::<f64, _>(index).map(Value::F64),
        "TEXT" => row.try_get_unchecked::<String, _>(index).map(Value::String),
        other => {
            return Err(DataError::Unsupported(format!(
                "column `{}` holds an unsupported SQLite value of type {other}",
                row.columns()[index].name()
            )))
        }
    };
    value.map_err(SqlxErrorExt::into_data_error)
}
