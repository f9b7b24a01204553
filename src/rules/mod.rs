//! Declarative per-table rewrite rules.
//!
//! An [`EntityRule`] names a table, the columns in it that can carry an
//! identity and how each carries it ([`Role`]), and how changes are written
//! back ([`WriteBack`]). Running a rule against a pair selects candidate
//! rows, computes the new values with the field rewriters and writes them.

pub mod catalogue;

pub use catalogue::{MAPPING_TABLE, standard_rules};

use crate::core::{IdentityPair, RekeyError, Result, Row, Value};
use crate::rewrite::{
    EncodedSubstringRewriter, ExactMatchRewriter, FieldRewriter, MultiRoleRewriter,
    PathSegmentRewriter,
};
use crate::store::{Datastore, Predicate, Select, Update};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Column equals the key.
    Exact,
    /// Column equals a fixed prefix followed by the key.
    Composite { prefix: &'static str },
    /// Key appears as a quoted token inside a serialized blob.
    Encoded,
    /// Key is the leading path segment. Never used to select rows.
    PathSegment,
    /// Recomputed as the lowercased new key. Never used to select rows.
    Lowercase,
}

impl Role {
    pub fn selects(&self) -> bool {
        matches!(self, Self::Exact | Self::Composite { .. } | Self::Encoded)
    }

    /// Bulk updates need a value that does not depend on the row.
    fn is_row_independent(&self) -> bool {
        !matches!(self, Self::Encoded | Self::PathSegment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleColumn {
    pub column: &'static str,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBack {
    /// One UPDATE keyed by the selection predicate.
    Bulk,
    /// Read candidates, then one UPDATE per changed row keyed by `id_column`.
    PerRow { id_column: &'static str },
}

#[derive(Debug, Clone)]
pub struct EntityRule {
    pub entity: &'static str,
    pub table: &'static str,
    pub columns: Vec<RoleColumn>,
    pub write_back: WriteBack,
}

/// A row (or whole statement, for bulk rules) that could not be written.
#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub row_id: Option<String>,
    pub constraint: bool,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleOutcome {
    pub entity: &'static str,
    pub table: String,
    pub rows_updated: u64,
    pub failures: Vec<RowFailure>,
}

impl RuleOutcome {
    fn new(entity: &'static str, table: &str) -> Self {
        Self {
            entity,
            table: table.to_string(),
            rows_updated: 0,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, row_id: Option<String>, err: &RekeyError) {
        self.failures.push(RowFailure {
            row_id,
            constraint: err.is_constraint(),
            error: err.to_string(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl EntityRule {
    pub fn new(entity: &'static str, table: &'static str) -> Self {
        Self {
            entity,
            table,
            columns: Vec::new(),
            write_back: WriteBack::Bulk,
        }
    }

    fn with(mut self, column: &'static str, role: Role) -> Self {
        self.columns.push(RoleColumn { column, role });
        self
    }

    pub fn exact(self, column: &'static str) -> Self {
        self.with(column, Role::Exact)
    }

    pub fn composite(self, column: &'static str, prefix: &'static str) -> Self {
        self.with(column, Role::Composite { prefix })
    }

    pub fn encoded(self, column: &'static str) -> Self {
        self.with(column, Role::Encoded)
    }

    pub fn path_segment(self, column: &'static str) -> Self {
        self.with(column, Role::PathSegment)
    }

    pub fn lowercase(self, column: &'static str) -> Self {
        self.with(column, Role::Lowercase)
    }

    pub fn per_row(mut self, id_column: &'static str) -> Self {
        self.write_back = WriteBack::PerRow { id_column };
        self
    }

    /// Check the rule is internally consistent. A bulk rule with two
    /// selecting columns would overwrite roles that never held the key.
    pub fn validate(&self) -> Result<()> {
        let selecting = self.columns.iter().filter(|c| c.role.selects()).count();
        if selecting == 0 {
            return Err(RekeyError::Config(format!(
                "rule '{}' has no column to select rows by",
                self.entity
            )));
        }

        match self.write_back {
            WriteBack::Bulk => {
                if selecting != 1 {
                    return Err(RekeyError::Config(format!(
                        "bulk rule '{}' must select by exactly one column",
                        self.entity
                    )));
                }
                if let Some(c) = self.columns.iter().find(|c| !c.role.is_row_independent()) {
                    return Err(RekeyError::Config(format!(
                        "bulk rule '{}' cannot rewrite '{}' without reading it",
                        self.entity, c.column
                    )));
                }
            }
            WriteBack::PerRow { id_column } => {
                if self.columns.iter().any(|c| c.column == id_column) {
                    return Err(RekeyError::Config(format!(
                        "rule '{}' rewrites its own id column '{}'",
                        self.entity, id_column
                    )));
                }
            }
        }
        Ok(())
    }

    /// OR of the per-column selection tests.
    pub fn selection(&self, old_key: &str) -> Predicate {
        let tests = self
            .columns
            .iter()
            .filter_map(|c| match c.role {
                Role::Exact => Some(Predicate::eq(c.column, old_key)),
                Role::Composite { prefix } => {
                    Some(Predicate::eq(c.column, format!("{}{}", prefix, old_key)))
                }
                Role::Encoded => Some(Predicate::contains(
                    c.column,
                    EncodedSubstringRewriter::token(old_key),
                )),
                Role::PathSegment | Role::Lowercase => None,
            })
            .collect();
        Predicate::any(tests)
    }

    /// Compute the changed columns of one candidate row. Reads only the
    /// snapshot, never the live row.
    pub fn rewrite_row(&self, row: &Row, pair: &IdentityPair) -> Vec<(String, Value)> {
        let (old, new) = (pair.old_key(), pair.new_key());

        let exact: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.role == Role::Exact)
            .map(|c| c.column)
            .collect();
        let mut changes = MultiRoleRewriter.rewrite_row(row, &exact, old, new);

        for c in &self.columns {
            let current = row.get(c.column).and_then(Value::as_str);
            let rewritten = match (c.role, current) {
                (Role::Composite { prefix }, Some(v)) => ExactMatchRewriter.rewrite(
                    v,
                    &format!("{}{}", prefix, old),
                    &format!("{}{}", prefix, new),
                ),
                (Role::Encoded, Some(v)) => EncodedSubstringRewriter.rewrite(v, old, new),
                (Role::PathSegment, Some(v)) => PathSegmentRewriter.rewrite(v, old, new),
                _ => None,
            };
            if let Some(v) = rewritten {
                changes.push((c.column.to_string(), Value::Text(v)));
            }
        }

        // Derived columns follow the key, and only on rows that moved.
        if !changes.is_empty() {
            let lowered = new.to_lowercase();
            for c in self.columns.iter().filter(|c| c.role == Role::Lowercase) {
                if row.get(c.column).and_then(Value::as_str) != Some(lowered.as_str()) {
                    changes.push((c.column.to_string(), Value::Text(lowered.clone())));
                }
            }
        }

        changes
    }

    /// Run this rule for one pair against `table` (the prefixed table name).
    ///
    /// Only fatal errors come back as `Err`; anything else is recorded on the
    /// returned outcome.
    pub fn apply(
        &self,
        store: &dyn Datastore,
        table: &str,
        pair: &IdentityPair,
    ) -> Result<RuleOutcome> {
        let mut outcome = RuleOutcome::new(self.entity, table);

        let result = match self.write_back {
            WriteBack::Bulk => self.apply_bulk(store, table, pair, &mut outcome),
            WriteBack::PerRow { id_column } => {
                self.apply_per_row(store, table, id_column, pair, &mut outcome)
            }
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(entity = self.entity, table, error = %e, "rule failed");
                outcome.record(None, &e);
            }
        }

        debug!(
            entity = self.entity,
            rows = outcome.rows_updated,
            failures = outcome.failures.len(),
            "rule done"
        );
        Ok(outcome)
    }

    fn apply_bulk(
        &self,
        store: &dyn Datastore,
        table: &str,
        pair: &IdentityPair,
        outcome: &mut RuleOutcome,
    ) -> Result<()> {
        let new = pair.new_key();
        let mut statement = Update::new(table, self.selection(pair.old_key()));
        for c in &self.columns {
            statement = match c.role {
                Role::Exact => statement.set(c.column, new),
                Role::Composite { prefix } => statement.set(c.column, format!("{}{}", prefix, new)),
                Role::Lowercase => statement.set(c.column, new.to_lowercase()),
                Role::Encoded | Role::PathSegment => statement,
            };
        }
        outcome.rows_updated = store.update(&statement)?;
        Ok(())
    }

    fn apply_per_row(
        &self,
        store: &dyn Datastore,
        table: &str,
        id_column: &str,
        pair: &IdentityPair,
        outcome: &mut RuleOutcome,
    ) -> Result<()> {
        let mut columns = vec![id_column.to_string()];
        columns.extend(self.columns.iter().map(|c| c.column.to_string()));

        let query = Select::new(table, columns, self.selection(pair.old_key())).order_by(id_column);
        let candidates = store.select(&query)?;

        for candidate in &candidates {
            let id = candidate.get(id_column).cloned().unwrap_or(Value::Null);
            if id.is_null() {
                outcome.record(
                    None,
                    &RekeyError::ExecutionError(format!("row without '{}'", id_column)),
                );
                continue;
            }

            let changes = self.rewrite_row(candidate, pair);
            if changes.is_empty() {
                continue;
            }

            let mut statement = Update::new(table, Predicate::eq(id_column, id.clone()));
            statement.assignments = changes;

            match store.update(&statement) {
                Ok(n) => outcome.rows_updated += n,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(entity = self.entity, table, row = %id, error = %e, "row update failed");
                    outcome.record(Some(id.to_string()), &e);
                }
            }
        }
        Ok(())
    }
}
