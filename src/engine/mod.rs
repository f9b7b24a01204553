//! The rekey driver.
//!
//! Pairs are processed strictly one after another and, within a pair, rules
//! run in catalogue order. Nothing spans a transaction larger than a single
//! UPDATE, so a crash can leave an identity half-moved; every rule is
//! idempotent and re-running the pair finishes the job.

pub mod summary;

pub use summary::{PairOutcome, PairStatus, RunSummary};

use crate::core::{IdentityPair, Result};
use crate::mapping::KeyMappingSource;
use crate::progress::ProgressReporter;
use crate::rules::{EntityRule, standard_rules};
use crate::store::Datastore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};

pub struct RekeyEngine {
    store: Arc<dyn Datastore>,
    source: Box<dyn KeyMappingSource>,
    rules: Vec<EntityRule>,
    table_prefix: String,
    dry_run: bool,
}

impl RekeyEngine {
    /// Engine over the standard entity catalogue with no table prefix.
    pub fn new(store: Arc<dyn Datastore>, source: Box<dyn KeyMappingSource>) -> Self {
        Self {
            store,
            source,
            rules: standard_rules(),
            table_prefix: String::new(),
            dry_run: false,
        }
    }

    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Marks the summary as a dry run. The store is expected to be a
    /// [`DryRunStore`](crate::store::DryRunStore) already.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Replace the rule list. Every rule is validated first.
    pub fn with_rules(mut self, rules: Vec<EntityRule>) -> Result<Self> {
        for rule in &rules {
            rule.validate()?;
        }
        self.rules = rules;
        Ok(self)
    }

    pub fn rules(&self) -> &[EntityRule] {
        &self.rules
    }

    /// Apply every rule to one pair.
    ///
    /// Returns `Err` only when the datastore connection is lost; rule and
    /// row failures are part of the outcome.
    pub fn rekey_pair(&self, pair: &IdentityPair) -> Result<PairOutcome> {
        let span = info_span!("pair", old = pair.old_key(), new = pair.new_key());
        let _guard = span.enter();

        if pair.is_noop() {
            debug!("keys already equal, skipping");
            return Ok(PairOutcome::skipped(pair.clone()));
        }
        if !pair.new_key_is_uuid() {
            debug!("new key is not a canonical UUID");
        }

        let mut outcomes = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let table = format!("{}{}", self.table_prefix, rule.table);
            outcomes.push(rule.apply(self.store.as_ref(), &table, pair)?);
        }

        let outcome = PairOutcome::completed(pair.clone(), outcomes);
        match outcome.status {
            PairStatus::PartiallyFailed => {
                let failed: Vec<&str> = outcome.failed_rules().map(|r| r.entity).collect();
                warn!(rows = outcome.rows_updated(), failed = ?failed, "identity partially rekeyed");
            }
            _ => info!(rows = outcome.rows_updated(), "identity rekeyed"),
        }
        Ok(outcome)
    }

    /// Read the pair stream once and rekey every pair.
    pub fn run(&mut self, reporter: &mut dyn ProgressReporter) -> Result<RunSummary> {
        let started_at = Utc::now();
        let pairs = self.source.list()?;
        info!(pairs = pairs.len(), dry_run = self.dry_run, "starting rekey");

        reporter.start(pairs.len());
        let mut outcomes = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            reporter.set_status(&format!(
                "Changing {} internal username as {}",
                pair.old_key(),
                pair.new_key()
            ));
            match self.rekey_pair(pair) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    reporter.finish();
                    warn!(
                        error = %e,
                        completed = outcomes.len(),
                        remaining = pairs.len() - outcomes.len(),
                        "aborting run"
                    );
                    return Err(e);
                }
            }
            reporter.advance();
        }
        reporter.finish();

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            pairs: outcomes,
        };
        info!(
            succeeded = summary.count(PairStatus::Succeeded),
            skipped = summary.count(PairStatus::Skipped),
            partially_failed = summary.count(PairStatus::PartiallyFailed),
            "rekey finished"
        );
        Ok(summary)
    }
}
