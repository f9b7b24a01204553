use super::{Datastore, Predicate, Select, Update};
use crate::core::{RekeyError, Result, Row, Value};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

/// PostgreSQL adapter.
///
/// The driver is async; this adapter owns a current-thread runtime and
/// blocks on every statement, so callers see plain round-trips. The
/// connection task only makes progress while a statement is in flight,
/// which is all it needs.
pub struct PgStore {
    runtime: Runtime,
    client: Client,
}

impl PgStore {
    /// Connect using a libpq-style connection string or `postgres://` URL.
    pub fn connect(url: &str, connect_timeout: Duration) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| RekeyError::ExecutionError(format!("failed to start runtime: {}", e)))?;

        let config: tokio_postgres::Config = url
            .parse()
            .map_err(|e| RekeyError::Config(format!("invalid database url: {}", e)))?;

        let connect = async {
            match tokio::time::timeout(connect_timeout, config.connect(NoTls)).await {
                Ok(result) => result.map_err(|e| RekeyError::Connection(e.to_string())),
                Err(_) => Err(RekeyError::Connection(format!(
                    "timed out after {:?} connecting to database",
                    connect_timeout
                ))),
            }
        };
        let (client, connection) = runtime.block_on(connect)?;

        runtime.spawn(async move {
            if let Err(e) = connection.await {
                error!("database connection closed: {}", e);
            }
        });

        Ok(Self { runtime, client })
    }

    fn run_query(&self, sql: &str, params: &[Value]) -> Result<Vec<tokio_postgres::Row>> {
        debug!(sql, params = params.len(), "query");
        let bound = bind(params);
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|p| p.as_ref() as _).collect();
        self.runtime
            .block_on(self.client.query(sql, &refs))
            .map_err(classify)
    }

    fn run_execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        debug!(sql, params = params.len(), "execute");
        let bound = bind(params);
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|p| p.as_ref() as _).collect();
        self.runtime
            .block_on(self.client.execute(sql, &refs))
            .map_err(classify)
    }
}

impl Datastore for PgStore {
    fn select(&self, query: &Select) -> Result<Vec<Row>> {
        let (sql, params) = render_select(query)?;
        let rows = self.run_query(&sql, &params)?;
        rows.iter().map(decode_row).collect()
    }

    fn update(&self, statement: &Update) -> Result<u64> {
        let (sql, params) = render_update(statement)?;
        self.run_execute(&sql, &params)
    }
}

// ============================================================================
// SQL rendering
// ============================================================================

/// Identifiers only ever come from the rule catalogue and the configured
/// table prefix, but they are still checked before being spliced in.
fn quote_ident(name: &str) -> Result<String> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(RekeyError::ExecutionError(format!(
            "refusing to use '{}' as an identifier",
            name
        )));
    }
    Ok(format!("\"{}\"", name))
}

fn placeholder(value: &Value, params: &mut Vec<Value>) -> String {
    params.push(value.clone());
    let cast = match value {
        Value::Integer(_) => "bigint",
        Value::Text(_) | Value::Null => "text",
    };
    format!("${}::{}", params.len(), cast)
}

fn render_predicate(predicate: &Predicate, params: &mut Vec<Value>) -> Result<String> {
    match predicate {
        Predicate::Eq { value: Value::Null, .. } => Ok("FALSE".to_string()),
        Predicate::Eq { column, value } => {
            Ok(format!("{} = {}", quote_ident(column)?, placeholder(value, params)))
        }
        // strpos instead of LIKE so '%' and '_' in keys stay literal
        Predicate::Contains { column, needle } => Ok(format!(
            "strpos({}, {}) > 0",
            quote_ident(column)?,
            placeholder(&Value::Text(needle.clone()), params)
        )),
        Predicate::NotNull(column) => Ok(format!("{} IS NOT NULL", quote_ident(column)?)),
        Predicate::Any(inner) if inner.is_empty() => Ok("FALSE".to_string()),
        Predicate::Any(inner) => {
            let parts = inner
                .iter()
                .map(|p| render_predicate(p, params))
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("({})", parts.join(" OR ")))
        }
    }
}

pub(crate) fn render_select(query: &Select) -> Result<(String, Vec<Value>)> {
    let mut params = Vec::new();
    let columns = query
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>>>()?;
    let mut sql = format!(
        "SELECT {} FROM {} WHERE {}",
        columns.join(", "),
        quote_ident(&query.table)?,
        render_predicate(&query.predicate, &mut params)?
    );
    if let Some(order) = &query.order_by {
        sql.push_str(&format!(" ORDER BY {}", quote_ident(order)?));
    }
    Ok((sql, params))
}

pub(crate) fn render_update(statement: &Update) -> Result<(String, Vec<Value>)> {
    if statement.assignments.is_empty() {
        return Err(RekeyError::ExecutionError(format!(
            "update of '{}' has no assignments",
            statement.table
        )));
    }
    let mut params = Vec::new();
    let mut sets = Vec::with_capacity(statement.assignments.len());
    for (column, value) in &statement.assignments {
        sets.push(format!("{} = {}", quote_ident(column)?, placeholder(value, &mut params)));
    }
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(&statement.table)?,
        sets.join(", "),
        render_predicate(&statement.predicate, &mut params)?
    );
    Ok((sql, params))
}

fn bind(params: &[Value]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    params
        .iter()
        .map(|v| -> Box<dyn ToSql + Sync + Send> {
            match v {
                Value::Null => Box::new(None::<String>),
                Value::Integer(i) => Box::new(*i),
                Value::Text(s) => Box::new(s.clone()),
            }
        })
        .collect()
}

fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = match *column.type_() {
            Type::INT2 => row
                .try_get::<_, Option<i16>>(idx)
                .map(|v| Value::from(v.map(i64::from))),
            Type::INT4 => row
                .try_get::<_, Option<i32>>(idx)
                .map(|v| Value::from(v.map(i64::from))),
            Type::INT8 => row.try_get::<_, Option<i64>>(idx).map(Value::from),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
                row.try_get::<_, Option<String>>(idx).map(Value::from)
            }
            _ => {
                return Err(RekeyError::TypeMismatch(format!(
                    "column '{}' has unsupported type {}",
                    column.name(),
                    column.type_()
                )));
            }
        }
        .map_err(|e| RekeyError::TypeMismatch(format!("column '{}': {}", column.name(), e)))?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

// ============================================================================
// Error classification
// ============================================================================

fn classify(err: tokio_postgres::Error) -> RekeyError {
    match err.code() {
        Some(state) => {
            let message = err
                .as_db_error()
                .map(|db| db.message().to_string())
                .unwrap_or_else(|| err.to_string());
            classify_sqlstate(state, message)
        }
        None if err.is_closed() => RekeyError::Connection(err.to_string()),
        None => {
            let io = std::error::Error::source(&err)
                .is_some_and(|source| source.downcast_ref::<std::io::Error>().is_some());
            if io {
                RekeyError::Connection(err.to_string())
            } else {
                RekeyError::ExecutionError(err.to_string())
            }
        }
    }
}

pub(crate) fn classify_sqlstate(state: &SqlState, message: String) -> RekeyError {
    if *state == SqlState::UNIQUE_VIOLATION
        || *state == SqlState::FOREIGN_KEY_VIOLATION
        || *state == SqlState::NOT_NULL_VIOLATION
    {
        return RekeyError::ConstraintViolation(message);
    }
    if *state == SqlState::UNDEFINED_TABLE {
        return RekeyError::TableNotFound(message);
    }
    if *state == SqlState::UNDEFINED_COLUMN {
        return RekeyError::ColumnNotFound(message);
    }
    // Class 08 is "connection exception"; 57P0x is the server going away.
    let code = state.code();
    if code.starts_with("08") || code.starts_with("57P0") {
        return RekeyError::Connection(message);
    }
    RekeyError::ExecutionError(message)
}
