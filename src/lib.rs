// ============================================================================
// identity_rekey Library
// ============================================================================
//
// Rewrites every record keyed by a user's internal name so that the user's
// directory UUID becomes the key instead.

pub mod config;
pub mod core;
pub mod engine;
pub mod mapping;
pub mod progress;
pub mod rewrite;
pub mod rules;
pub mod store;

// Re-export main types for convenience
pub use config::RekeyConfig;
pub use crate::core::{IdentityPair, RekeyError, Result, Row, Value, row};
pub use engine::{PairOutcome, PairStatus, RekeyEngine, RunSummary};
pub use mapping::{KeyMappingSource, StoreMappingSource};
pub use progress::{ProgressReporter, SilentProgress, TerminalProgress};
pub use rules::{EntityRule, Role, RuleOutcome, standard_rules};
pub use store::{Datastore, DryRunStore, MemoryStore, PgStore, Predicate, Select, Update};

// ============================================================================
// Entry point
// ============================================================================

/// Rekey every pair in `source` against `store` with the standard entity
/// catalogue.
///
/// # Examples
///
/// ```
/// use identity_rekey::store::memory::{Column, TableSchema};
/// use identity_rekey::{IdentityPair, MemoryStore, SilentProgress, rekey_all, row};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(MemoryStore::new());
/// for (table, column) in [
///     ("accounts", "user_id"), ("activity", "activity_id"), ("authtoken", "uid"),
///     ("comments", "actor_id"), ("comments_read_markers", "user_id"),
///     ("ldap_user_mapping", "owncloud_name"), ("mounts", "id"),
///     ("preferences", "userid"), ("share", "id"), ("storages", "id"),
///     ("vcategory", "uid"),
/// ] {
///     let mut columns = vec![Column::new(column)];
///     match table {
///         "accounts" => columns.push(Column::new("lower_user_id")),
///         "activity" => columns.extend(["user", "affecteduser", "subjectparams"].map(Column::new)),
///         "mounts" => columns.extend(["user_id", "mount_point"].map(Column::new)),
///         "share" => columns.extend(["share_with", "uid_owner", "uid_initiator"].map(Column::new)),
///         _ => {}
///     }
///     store.create_table(TableSchema::new(table, columns))?;
/// }
/// store.insert("authtoken", row([("uid", "alice")]))?;
///
/// let pairs = vec![IdentityPair::new("alice", "8c1f6a0e-1d9b-4d3e-a1c2-5b7e9f0d2c44")?];
/// let summary = rekey_all(store.clone(), "", pairs, &mut SilentProgress)?;
///
/// assert_eq!(summary.rows_updated(), 1);
/// assert_eq!(
///     store.rows("authtoken")?[0]["uid"].as_str(),
///     Some("8c1f6a0e-1d9b-4d3e-a1c2-5b7e9f0d2c44")
/// );
/// # Ok(())
/// # }
/// ```
pub fn rekey_all(
    store: std::sync::Arc<dyn Datastore>,
    table_prefix: &str,
    source: impl KeyMappingSource + 'static,
    reporter: &mut dyn ProgressReporter,
) -> Result<RunSummary> {
    RekeyEngine::new(store, Box::new(source))
        .table_prefix(table_prefix)
        .run(reporter)
}
