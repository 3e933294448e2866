//! Database connection abstraction.

use futures_util::{future::BoxFuture, stream::BoxStream, FutureExt, StreamExt, TryStreamExt};
use sqlx::{
    mysql::{MySqlRow, MySqlValueRef},
    Column as _, MySqlPool, Row as _, TypeInfo as _, ValueRef as _,
};

use crate::{
    error::{QueryError, ScrapeError},
    row::{Row, Value},
};

/// Stream of result rows. Dropping the stream releases the underlying cursor.
pub type RowStream<'a> = BoxStream<'a, Result<Row, ScrapeError>>;

/// Database connection able to execute introspection queries.
///
/// The trait is object-safe, so that scrapers can be run against real and mock connections alike.
pub trait Connection: Send + Sync + 'static {
    /// Queries the server version string, e.g. `8.0.34-log`.
    fn server_version(&self) -> BoxFuture<'_, Result<String, QueryError>>;

    /// Executes a query and streams its result rows.
    fn query<'a>(&'a self, sql: &'a str) -> RowStream<'a>;
}

impl Connection for MySqlPool {
    fn server_version(&self) -> BoxFuture<'_, Result<String, QueryError>> {
        sqlx::query_scalar::<_, String>("SELECT VERSION()")
            .fetch_one(self)
            .map(|res| res.map_err(QueryError::from))
            .boxed()
    }

    fn query<'a>(&'a self, sql: &'a str) -> RowStream<'a> {
        // Raw SQL uses the text protocol, which supports all `SHOW` statements unlike prepared ones.
        sqlx::raw_sql(sql)
            .fetch(self)
            .map_err(QueryError::from)
            .and_then(|row| async move { convert_row(&row) })
            .map_err(ScrapeError::from)
            .boxed()
    }
}

fn convert_row(row: &MySqlRow) -> Result<Row, QueryError> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let raw = row.try_get_raw(i)?;
            convert_value(row, i, column.type_info().name(), &raw)
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Row::new)
}

fn convert_value(
    row: &MySqlRow,
    i: usize,
    type_name: &str,
    raw: &MySqlValueRef<'_>,
) -> Result<Value, QueryError> {
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let value = match type_name {
        "BOOLEAN" => Value::Int(row.try_get_unchecked::<bool, _>(i)?.into()),
        name if name.ends_with("INT UNSIGNED") => Value::UInt(row.try_get_unchecked(i)?),
        name if name.ends_with("INT") || name == "YEAR" => Value::Int(row.try_get_unchecked(i)?),
        "FLOAT" => Value::Float(row.try_get_unchecked::<f32, _>(i)?.into()),
        "DOUBLE" => Value::Float(row.try_get_unchecked(i)?),
        "DECIMAL" => Value::Decimal(row.try_get_unchecked(i)?),
        name if name.contains("BINARY") || name.contains("BLOB") || name == "GEOMETRY" => {
            Value::Bytes(row.try_get_unchecked(i)?)
        }
        _ => match row.try_get_unchecked::<String, _>(i) {
            Ok(text) => Value::Text(text),
            Err(_) => Value::Bytes(row.try_get_unchecked(i)?),
        },
    };
    Ok(value)
}
