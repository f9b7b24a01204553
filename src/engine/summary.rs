use crate::core::IdentityPair;
use crate::rules::RuleOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    Succeeded,
    /// Old and new key were already equal.
    Skipped,
    /// At least one rule recorded a failure; needs manual follow-up.
    PartiallyFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairOutcome {
    #[serde(flatten)]
    pub pair: IdentityPair,
    pub status: PairStatus,
    pub rules: Vec<RuleOutcome>,
}

impl PairOutcome {
    pub fn skipped(pair: IdentityPair) -> Self {
        Self {
            pair,
            status: PairStatus::Skipped,
            rules: Vec::new(),
        }
    }

    pub fn completed(pair: IdentityPair, rules: Vec<RuleOutcome>) -> Self {
        let status = if rules.iter().all(RuleOutcome::is_success) {
            PairStatus::Succeeded
        } else {
            PairStatus::PartiallyFailed
        };
        Self { pair, status, rules }
    }

    pub fn rows_updated(&self) -> u64 {
        self.rules.iter().map(|r| r.rows_updated).sum()
    }

    pub fn failed_rules(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.rules.iter().filter(|r| !r.is_success())
    }

    pub fn rule(&self, entity: &str) -> Option<&RuleOutcome> {
        self.rules.iter().find(|r| r.entity == entity)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub pairs: Vec<PairOutcome>,
}

impl RunSummary {
    pub fn count(&self, status: PairStatus) -> usize {
        self.pairs.iter().filter(|p| p.status == status).count()
    }

    pub fn rows_updated(&self) -> u64 {
        self.pairs.iter().map(PairOutcome::rows_updated).sum()
    }

    pub fn needs_follow_up(&self) -> impl Iterator<Item = &PairOutcome> {
        self.pairs
            .iter()
            .filter(|p| p.status == PairStatus::PartiallyFailed)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable report: totals, then every identity with failures.
    pub fn render<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let verb = if self.dry_run { "would update" } else { "updated" };
        writeln!(
            out,
            "Processed {} identities: {} succeeded, {} skipped, {} need follow-up ({} rows {})",
            self.pairs.len(),
            self.count(PairStatus::Succeeded),
            self.count(PairStatus::Skipped),
            self.count(PairStatus::PartiallyFailed),
            self.rows_updated(),
            verb,
        )?;

        let mut follow_up = self.needs_follow_up().peekable();
        if follow_up.peek().is_none() {
            return Ok(());
        }

        writeln!(out, "Identities needing manual follow-up:")?;
        for outcome in follow_up {
            writeln!(out, "  {}", outcome.pair)?;
            for rule in outcome.failed_rules() {
                for failure in &rule.failures {
                    match &failure.row_id {
                        Some(id) => writeln!(
                            out,
                            "    {} ({}) row {}: {}",
                            rule.entity, rule.table, id, failure.error
                        )?,
                        None => writeln!(out, "    {} ({}): {}", rule.entity, rule.table, failure.error)?,
                    }
                }
            }
        }
        Ok(())
    }
}
