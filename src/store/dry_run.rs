use super::{Datastore, Select, Update};
use crate::core::{Result, Row};
use std::sync::Arc;
use tracing::info;

/// Read-through, write-nothing decorator.
///
/// Updates are answered by counting the rows their predicate selects, so a
/// dry run reports the same per-rule totals a real run would on its first
/// pass. Because nothing is written, per-row rules see every candidate.
pub struct DryRunStore {
    inner: Arc<dyn Datastore>,
}

impl DryRunStore {
    pub fn new(inner: Arc<dyn Datastore>) -> Self {
        Self { inner }
    }
}

impl Datastore for DryRunStore {
    fn select(&self, query: &Select) -> Result<Vec<Row>> {
        self.inner.select(query)
    }

    fn update(&self, statement: &Update) -> Result<u64> {
        let probe = Select::new(
            statement.table.clone(),
            statement.predicate.columns(),
            statement.predicate.clone(),
        );
        let matched = self.inner.select(&probe)?.len() as u64;
        if matched > 0 {
            let columns: Vec<&str> = statement.assignments.iter().map(|(c, _)| c.as_str()).collect();
            info!(
                table = %statement.table,
                rows = matched,
                columns = ?columns,
                "dry run: would update"
            );
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Value, row};
    use crate::store::memory::{Column, TableSchema};
    use crate::store::{MemoryStore, Predicate};

    #[test]
    fn test_update_counts_without_writing() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .create_table(TableSchema::new("oc_authtoken", vec![Column::new("uid")]))
            .unwrap();
        memory.insert("oc_authtoken", row([("uid", "alice")])).unwrap();
        memory.insert("oc_authtoken", row([("uid", "alice")])).unwrap();
        memory.insert("oc_authtoken", row([("uid", "bob")])).unwrap();

        let dry = DryRunStore::new(memory.clone());
        let n = dry
            .update(&Update::new("oc_authtoken", Predicate::eq("uid", "alice")).set("uid", "u-1"))
            .unwrap();

        assert_eq!(n, 2);
        let uids: Vec<_> = memory.rows("oc_authtoken").unwrap().into_iter().map(|r| r["uid"].clone()).collect();
        assert_eq!(uids, vec![Value::from("alice"), Value::from("alice"), Value::from("bob")]);
    }
}
