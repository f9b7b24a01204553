use super::{Datastore, Predicate, Select, Update};
use crate::core::{RekeyError, Result, Row, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub unique: bool,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    fn require_column(&self, name: &str) -> Result<()> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(RekeyError::ColumnNotFound(format!(
                "'{}' in table '{}'",
                name, self.name
            )))
        }
    }
}

#[derive(Debug, Clone)]
struct Table {
    schema: TableSchema,
    rows: BTreeMap<usize, Row>,
    next_row_id: usize,
}

impl Table {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            next_row_id: 0,
        }
    }

    fn insert(&mut self, mut row: Row) -> Result<usize> {
        for name in row.keys() {
            self.schema.require_column(name)?;
        }
        // Missing columns default to NULL.
        for column in &self.schema.columns {
            row.entry(column.name.clone()).or_insert(Value::Null);
        }

        let mut after = self.rows.clone();
        let id = self.next_row_id;
        after.insert(id, row.clone());
        self.check_uniqueness(&after, &[id])?;

        self.rows.insert(id, row);
        self.next_row_id += 1;
        Ok(id)
    }

    fn validate_predicate(&self, predicate: &Predicate) -> Result<()> {
        for column in predicate.columns() {
            self.schema.require_column(&column)?;
        }
        Ok(())
    }

    /// Statement-level uniqueness check over the post-statement state.
    /// Only rows touched by the statement can introduce a conflict.
    fn check_uniqueness(&self, after: &BTreeMap<usize, Row>, touched: &[usize]) -> Result<()> {
        for column in self.schema.columns.iter().filter(|c| c.unique) {
            for id in touched {
                let value = match after.get(id).and_then(|r| r.get(&column.name)) {
                    Some(v) if !v.is_null() => v,
                    _ => continue,
                };
                let clash = after
                    .iter()
                    .any(|(other, r)| other != id && r.get(&column.name) == Some(value));
                if clash {
                    return Err(RekeyError::ConstraintViolation(format!(
                        "Unique constraint violation: Column '{}' of '{}' already contains value {}",
                        column.name, self.schema.name, value
                    )));
                }
            }
        }
        Ok(())
    }
}

/// In-process datastore with declared tables and unique columns.
///
/// Rows come back in insertion order unless the select asks for an ordering.
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        let mut tables = self.tables.write()?;
        let name = schema.name().to_string();
        if tables.contains_key(&name) {
            return Err(RekeyError::ExecutionError(format!(
                "Table '{}' already exists",
                name
            )));
        }
        tables.insert(name, Table::new(schema));
        Ok(())
    }

    pub fn insert(&self, table: &str, row: Row) -> Result<usize> {
        let mut tables = self.tables.write()?;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| RekeyError::TableNotFound(table.to_string()))?;
        table.insert(row)
    }

    /// Every row of `table` in insertion order.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let tables = self.tables.read()?;
        let table = tables
            .get(table)
            .ok_or_else(|| RekeyError::TableNotFound(table.to_string()))?;
        Ok(table.rows.values().cloned().collect())
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables
            .read()
            .map(|t| t.contains_key(name))
            .unwrap_or(false)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Datastore for MemoryStore {
    fn select(&self, query: &Select) -> Result<Vec<Row>> {
        let tables = self.tables.read()?;
        let table = tables
            .get(&query.table)
            .ok_or_else(|| RekeyError::TableNotFound(query.table.clone()))?;

        table.validate_predicate(&query.predicate)?;
        for column in &query.columns {
            table.schema.require_column(column)?;
        }

        let mut rows: Vec<Row> = table
            .rows
            .values()
            .filter(|r| query.predicate.matches(r))
            .map(|r| {
                query
                    .columns
                    .iter()
                    .map(|c| (c.clone(), r.get(c).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();

        if let Some(order) = &query.order_by {
            table.schema.require_column(order)?;
            rows.sort_by(|a, b| {
                let key = |r: &Row| r.get(order).cloned().unwrap_or(Value::Null);
                match (key(a), key(b)) {
                    (Value::Integer(x), Value::Integer(y)) => x.cmp(&y),
                    (x, y) => x.to_string().cmp(&y.to_string()),
                }
            });
        }

        Ok(rows)
    }

    fn update(&self, statement: &Update) -> Result<u64> {
        let mut tables = self.tables.write()?;
        let table = tables
            .get_mut(&statement.table)
            .ok_or_else(|| RekeyError::TableNotFound(statement.table.clone()))?;

        table.validate_predicate(&statement.predicate)?;
        for (column, _) in &statement.assignments {
            table.schema.require_column(column)?;
        }

        let touched: Vec<usize> = table
            .rows
            .iter()
            .filter(|(_, r)| statement.predicate.matches(r))
            .map(|(id, _)| *id)
            .collect();

        if touched.is_empty() {
            return Ok(0);
        }

        let mut after = table.rows.clone();
        for id in &touched {
            if let Some(r) = after.get_mut(id) {
                for (column, value) in &statement.assignments {
                    r.insert(column.clone(), value.clone());
                }
            }
        }
        table.check_uniqueness(&after, &touched)?;

        table.rows = after;
        Ok(touched.len() as u64)
    }
}
