//! Conversions between [`SqlParam`]/JSON and PostgreSQL wire types.
//!
//! Parameters are converted to the type the server inferred for each `$n`
//! when the statement was prepared, so `:id_0` bound as an integer can target
//! an `int4`, `int8` or `text` column alike.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use postgres_types::{ToSql, Type};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{BackendError, StorageError, StorageResult};
use crate::query::{BoundParams, SqlParam};
use crate::types::Row;

/// A boxed parameter ready for `query`/`execute`.
pub type PgParam = Box<dyn ToSql + Sync + Send>;

fn mismatch(param: &SqlParam, ty: &Type) -> StorageError {
    StorageError::Backend(BackendError::SerializationError {
        message: format!("cannot bind '{}' as {}", param, ty.name()),
    })
}

fn as_i64(param: &SqlParam, ty: &Type) -> StorageResult<i64> {
    match param {
        SqlParam::Integer(i) => Ok(*i),
        SqlParam::Bool(b) => Ok(i64::from(*b)),
        SqlParam::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
        SqlParam::Text(s) => s.trim().parse().map_err(|_| mismatch(param, ty)),
        _ => Err(mismatch(param, ty)),
    }
}

fn as_f64(param: &SqlParam, ty: &Type) -> StorageResult<f64> {
    match param {
        SqlParam::Float(f) => Ok(*f),
        SqlParam::Integer(i) => Ok(*i as f64),
        SqlParam::Text(s) => s.trim().parse().map_err(|_| mismatch(param, ty)),
        _ => Err(mismatch(param, ty)),
    }
}

fn as_bool(param: &SqlParam, ty: &Type) -> StorageResult<bool> {
    match param {
        SqlParam::Bool(b) => Ok(*b),
        SqlParam::Integer(0) => Ok(false),
        SqlParam::Integer(1) => Ok(true),
        SqlParam::Text(s) => match s.as_str() {
            "t" | "true" | "1" => Ok(true),
            "f" | "false" | "0" => Ok(false),
            _ => Err(mismatch(param, ty)),
        },
        _ => Err(mismatch(param, ty)),
    }
}

fn as_timestamp(param: &SqlParam, ty: &Type) -> StorageResult<DateTime<Utc>> {
    match param {
        SqlParam::Timestamp(t) => Ok(*t),
        SqlParam::Text(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| mismatch(param, ty)),
        _ => Err(mismatch(param, ty)),
    }
}

fn null_of(ty: &Type) -> PgParam {
    match *ty {
        Type::BOOL => Box::new(Option::<bool>::None),
        Type::INT2 => Box::new(Option::<i16>::None),
        Type::INT4 => Box::new(Option::<i32>::None),
        Type::INT8 => Box::new(Option::<i64>::None),
        Type::FLOAT4 => Box::new(Option::<f32>::None),
        Type::FLOAT8 => Box::new(Option::<f64>::None),
        Type::NUMERIC => Box::new(Option::<Decimal>::None),
        Type::TIMESTAMPTZ => Box::new(Option::<DateTime<Utc>>::None),
        Type::TIMESTAMP => Box::new(Option::<NaiveDateTime>::None),
        Type::DATE => Box::new(Option::<NaiveDate>::None),
        Type::JSON | Type::JSONB => Box::new(Option::<Value>::None),
        Type::UUID => Box::new(Option::<Uuid>::None),
        _ => Box::new(Option::<String>::None),
    }
}

/// Converts one parameter to the server-side type `ty`.
pub fn to_pg_param(param: &SqlParam, ty: &Type) -> StorageResult<PgParam> {
    if matches!(param, SqlParam::Null) {
        return Ok(null_of(ty));
    }

    let boxed: PgParam = match *ty {
        Type::BOOL => Box::new(as_bool(param, ty)?),
        Type::INT2 => Box::new(
            i16::try_from(as_i64(param, ty)?).map_err(|_| mismatch(param, ty))?,
        ),
        Type::INT4 => Box::new(
            i32::try_from(as_i64(param, ty)?).map_err(|_| mismatch(param, ty))?,
        ),
        Type::INT8 => Box::new(as_i64(param, ty)?),
        Type::FLOAT4 => Box::new(as_f64(param, ty)? as f32),
        Type::FLOAT8 => Box::new(as_f64(param, ty)?),
        Type::NUMERIC => {
            let decimal = match param {
                SqlParam::Integer(i) => Decimal::from(*i),
                SqlParam::Float(f) => Decimal::try_from(*f).map_err(|_| mismatch(param, ty))?,
                SqlParam::Text(s) => Decimal::from_str(s.trim()).map_err(|_| mismatch(param, ty))?,
                _ => return Err(mismatch(param, ty)),
            };
            Box::new(decimal)
        }
        Type::TIMESTAMPTZ => Box::new(as_timestamp(param, ty)?),
        Type::TIMESTAMP => Box::new(as_timestamp(param, ty)?.naive_utc()),
        Type::DATE => match param {
            SqlParam::Timestamp(t) => Box::new(t.date_naive()),
            SqlParam::Text(s) => Box::new(
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| mismatch(param, ty))?,
            ),
            _ => return Err(mismatch(param, ty)),
        },
        Type::JSON | Type::JSONB => match param {
            SqlParam::Text(s) => Box::new(
                serde_json::from_str::<Value>(s).unwrap_or_else(|_| Value::String(s.clone())),
            ),
            other => Box::new(other.to_json()),
        },
        Type::UUID => match param {
            SqlParam::Text(s) => Box::new(Uuid::parse_str(s).map_err(|_| mismatch(param, ty))?),
            _ => return Err(mismatch(param, ty)),
        },
        _ => match param {
            SqlParam::Text(s) => Box::new(s.clone()),
            SqlParam::Float(f) => Box::new(*f),
            SqlParam::Integer(i) => Box::new(*i),
            SqlParam::Bool(b) => Box::new(*b),
            SqlParam::Timestamp(dt) => Box::new(*dt),
            SqlParam::Null => Box::new(Option::<String>::None),
        },
    };
    Ok(boxed)
}

/// Converts every bound parameter, in binding order, to the statement's
/// parameter types.
pub fn to_pg_params(params: &BoundParams, types: &[Type]) -> StorageResult<Vec<PgParam>> {
    if params.len() != types.len() {
        return Err(StorageError::Backend(BackendError::Internal {
            backend_name: "postgres".to_string(),
            message: format!(
                "statement expects {} parameters, {} bound",
                types.len(),
                params.len()
            ),
            source: None,
        }));
    }
    params
        .iter()
        .zip(types)
        .map(|((_, param), ty)| to_pg_param(param, ty))
        .collect()
}

fn cell<'a, T>(row: &'a tokio_postgres::Row, index: usize) -> StorageResult<Option<T>>
where
    T: postgres_types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(index).map_err(StorageError::from)
}

/// Converts a result row to a JSON object keyed by column name.
pub fn row_to_json(row: &tokio_postgres::Row) -> StorageResult<Row> {
    let mut out = Map::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = match *column.type_() {
            Type::BOOL => cell::<bool>(row, index)?.map(Value::Bool),
            Type::INT2 => cell::<i16>(row, index)?.map(Value::from),
            Type::INT4 => cell::<i32>(row, index)?.map(Value::from),
            Type::INT8 => cell::<i64>(row, index)?.map(Value::from),
            Type::FLOAT4 => cell::<f32>(row, index)?.map(|v| Value::from(f64::from(v))),
            Type::FLOAT8 => cell::<f64>(row, index)?.map(Value::from),
            Type::NUMERIC => cell::<Decimal>(row, index)?.map(|d| Value::String(d.to_string())),
            Type::TIMESTAMPTZ => {
                cell::<DateTime<Utc>>(row, index)?.map(|t| Value::String(t.to_rfc3339()))
            }
            Type::TIMESTAMP => cell::<NaiveDateTime>(row, index)?
                .map(|t| Value::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
            Type::DATE => cell::<NaiveDate>(row, index)?.map(|d| Value::String(d.to_string())),
            Type::JSON | Type::JSONB => cell::<Value>(row, index)?,
            Type::UUID => cell::<Uuid>(row, index)?.map(|u| Value::String(u.to_string())),
            _ => cell::<String>(row, index)?.map(Value::String),
        };
        out.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    Ok(out)
}
