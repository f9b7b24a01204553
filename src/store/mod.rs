//! Datastore seam.
//!
//! The engine never builds SQL text itself. It describes reads and writes as
//! [`Select`] and [`Update`] values whose literals are always carried
//! separately from identifiers, and hands them to a [`Datastore`]. Adapters
//! decide how to bind them.

pub mod dry_run;
pub mod memory;
pub mod postgres;

pub use dry_run::DryRunStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::core::{Result, Row, Value};

/// Row filter over named columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = value`
    Eq { column: String, value: Value },
    /// `column` contains `needle` as a literal substring. No pattern
    /// characters are interpreted.
    Contains { column: String, needle: String },
    /// `column IS NOT NULL`
    NotNull(String),
    /// Logical OR of the inner predicates. An empty list matches nothing.
    Any(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn contains(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains {
            column: column.into(),
            needle: needle.into(),
        }
    }

    /// Collapses a single-element disjunction.
    pub fn any(mut predicates: Vec<Predicate>) -> Self {
        if predicates.len() == 1 {
            predicates.remove(0)
        } else {
            Self::Any(predicates)
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Eq { column, value } => {
                // NULL never equals anything
                !value.is_null() && row.get(column) == Some(value)
            }
            Self::Contains { column, needle } => row
                .get(column)
                .and_then(Value::as_str)
                .is_some_and(|s| s.contains(needle.as_str())),
            Self::NotNull(column) => row.get(column).is_some_and(|v| !v.is_null()),
            Self::Any(inner) => inner.iter().any(|p| p.matches(row)),
        }
    }

    /// Columns referenced by the predicate, in first-seen order.
    pub fn columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<String>) {
        match self {
            Self::Eq { column, .. } | Self::Contains { column, .. } | Self::NotNull(column) => {
                if !out.contains(column) {
                    out.push(column.clone());
                }
            }
            Self::Any(inner) => inner.iter().for_each(|p| p.collect_columns(out)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub columns: Vec<String>,
    pub predicate: Predicate,
    pub order_by: Option<String>,
}

impl Select {
    pub fn new(table: impl Into<String>, columns: Vec<String>, predicate: Predicate) -> Self {
        Self {
            table: table.into(),
            columns,
            predicate,
            order_by: None,
        }
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Value)>,
    pub predicate: Predicate,
}

impl Update {
    pub fn new(table: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            predicate,
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }
}

/// Blocking statement interface the engine runs against.
///
/// Each call is one round-trip and one implicit transaction. `update` is
/// statement-atomic: either every matching row receives every assignment
/// or none does.
pub trait Datastore: Send + Sync {
    fn select(&self, query: &Select) -> Result<Vec<Row>>;

    /// Returns the number of rows changed.
    fn update(&self, statement: &Update) -> Result<u64>;
}
