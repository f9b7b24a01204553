use crate::core::{IdentityPair, Result, Value};
use crate::rules::MAPPING_TABLE;
use crate::store::{Datastore, Predicate, Select};
use std::sync::Arc;
use tracing::warn;

/// Where the `(old, new)` pairs come from. Read once, before any rewriting.
pub trait KeyMappingSource {
    fn list(&mut self) -> Result<Vec<IdentityPair>>;
}

impl KeyMappingSource for Vec<IdentityPair> {
    fn list(&mut self) -> Result<Vec<IdentityPair>> {
        Ok(self.clone())
    }
}

/// Reads the LDAP user mapping table: internal name to directory UUID.
pub struct StoreMappingSource {
    store: Arc<dyn Datastore>,
    table: String,
}

impl StoreMappingSource {
    pub const NAME_COLUMN: &'static str = "owncloud_name";
    pub const UUID_COLUMN: &'static str = "directory_uuid";

    pub fn new(store: Arc<dyn Datastore>, table_prefix: &str) -> Self {
        Self {
            store,
            table: format!("{}{}", table_prefix, MAPPING_TABLE),
        }
    }
}

impl KeyMappingSource for StoreMappingSource {
    fn list(&mut self) -> Result<Vec<IdentityPair>> {
        let query = Select::new(
            self.table.clone(),
            vec![Self::NAME_COLUMN.to_string(), Self::UUID_COLUMN.to_string()],
            Predicate::NotNull(Self::NAME_COLUMN.to_string()),
        )
        .order_by(Self::NAME_COLUMN);

        let rows = self.store.select(&query)?;
        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let name = row.get(Self::NAME_COLUMN).and_then(Value::as_str).unwrap_or("");
            let uuid = row.get(Self::UUID_COLUMN).and_then(Value::as_str).unwrap_or("");
            match IdentityPair::new(name, uuid) {
                Ok(pair) => pairs.push(pair),
                Err(e) => warn!(name, error = %e, "skipping unusable mapping row"),
            }
        }
        Ok(pairs)
    }
}
