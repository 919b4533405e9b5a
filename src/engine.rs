// ⚖️ Reconciliation Engine - Fold every source into the canonical registry
//
// Per source: reset the exclusion set, then per record
//   cached decision → replay it
//   auto-accept rule holds → take the top candidate
//   otherwise → ask the operator (answer is logged before it is used)
// and apply Matched / Create-new / Skip.
//
// `q` stops the loop. Merges done so far stay in the registry; writing the
// registry out is the caller's job.

use crate::decisions::{Choice, DecisionMap, DecisionStore};
use crate::error::{ReconcileError, Result};
use crate::matcher::{ExclusionSet, Matcher};
use crate::model::{CanonicalRecord, Record, SourceCollection};
use crate::prompt::{Disambiguator, InputProvider, Resolution};
use crate::registry::{CanonicalIndex, CanonicalRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, info_span};
use uuid::Uuid;

// ============================================================================
// REPORT
// ============================================================================

/// Counters for one source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTally {
    pub found: usize,
    pub added: usize,
    pub skipped: usize,
}

impl SourceTally {
    fn record(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Matched(_) => self.found += 1,
            Resolution::CreateNew => self.added += 1,
            Resolution::Skip => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub run_id: Uuid,
    pub found: usize,
    pub skipped: usize,
    pub added: usize,

    /// Stopped early by the operator
    pub aborted: bool,

    /// How many records needed the operator
    pub prompts: usize,

    /// Matched without the operator or a cached decision
    pub auto_accepted: usize,

    /// Resolved from the decision log
    pub replayed: usize,

    pub per_source: BTreeMap<String, SourceTally>,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationReport {
    fn new() -> Self {
        ReconciliationReport {
            run_id: Uuid::new_v4(),
            found: 0,
            skipped: 0,
            added: 0,
            aborted: false,
            prompts: 0,
            auto_accepted: 0,
            replayed: 0,
            per_source: BTreeMap::new(),
            reconciled_at: Utc::now(),
        }
    }

    fn record(&mut self, source: &str, resolution: Resolution) {
        match resolution {
            Resolution::Matched(_) => self.found += 1,
            Resolution::CreateNew => self.added += 1,
            Resolution::Skip => self.skipped += 1,
        }
        self.per_source
            .entry(source.to_string())
            .or_default()
            .record(resolution);
    }

    pub fn summary(&self) -> String {
        format!(
            "found={}, skipped={}, added={}{}",
            self.found,
            self.skipped,
            self.added,
            if self.aborted { ", exiting" } else { "" }
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

/// How a resolution was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Via {
    Replay,
    Auto,
    Operator,
}

pub struct ReconciliationEngine<'a> {
    matcher: Matcher,
    store: &'a mut dyn DecisionStore,
    input: &'a mut dyn InputProvider,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        matcher: Matcher,
        store: &'a mut dyn DecisionStore,
        input: &'a mut dyn InputProvider,
    ) -> Self {
        ReconciliationEngine {
            matcher,
            store,
            input,
        }
    }

    /// Fold `sources` into `registry`
    ///
    /// Sources are visited in map order, records in collection order. An
    /// operator abort returns `Ok` with `aborted = true`; any other error
    /// is returned as is.
    pub fn reconcile(
        &mut self,
        sources: &BTreeMap<String, SourceCollection<Record>>,
        registry: &mut CanonicalRegistry,
    ) -> Result<ReconciliationReport> {
        let mut report = ReconciliationReport::new();
        let mut decisions = self.store.load()?;
        let mut exclusion = ExclusionSet::new();

        info!(run_id = %report.run_id, sources = sources.len(), decisions = decisions.len(), "starting reconciliation");

        'sources: for (source, collection) in sources {
            let _span = info_span!("source", source = %source).entered();
            println!("{}", "#".repeat(120));
            println!("# Finding connection for {}", source);
            println!("{}", "#".repeat(120));

            exclusion.clear();
            report.per_source.entry(source.clone()).or_default();

            for (_, record) in collection.iter() {
                let resolved = self.resolve(source, record, registry, &exclusion, &mut decisions);
                let (resolution, via) = match resolved {
                    Ok(r) => r,
                    Err(ReconcileError::Aborted) => {
                        report.aborted = true;
                        break 'sources;
                    }
                    Err(e) => return Err(e),
                };

                match via {
                    Via::Replay => report.replayed += 1,
                    Via::Auto => report.auto_accepted += 1,
                    Via::Operator => report.prompts += 1,
                }

                self.apply(source, record, resolution, registry, &mut exclusion);
                report.record(source, resolution);
            }
        }

        report.reconciled_at = Utc::now();
        println!("{}", report.summary());
        info!(
            run_id = %report.run_id,
            found = report.found,
            added = report.added,
            skipped = report.skipped,
            aborted = report.aborted,
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Decide what to do with one record
    fn resolve(
        &mut self,
        source: &str,
        record: &Record,
        registry: &CanonicalRegistry,
        exclusion: &ExclusionSet,
        decisions: &mut DecisionMap,
    ) -> Result<(Resolution, Via)> {
        let cache_key = (source.to_string(), record.name.clone());
        if let Some(choice) = decisions.get(&cache_key) {
            let resolution = replay(source, record, choice, registry)?;
            debug!(name = %record.name, choice = choice.as_field(), "replayed decision");
            return Ok((resolution, Via::Replay));
        }

        let index = CanonicalIndex::for_record(record);
        let candidates = self.matcher.candidates(&record.match_key(), registry, index);

        if let Some(top) = self.matcher.auto_accept(&candidates, exclusion) {
            if let Some(canonical) = registry.get(top.id) {
                println!(" -> Selected  {}", canonical);
                println!("    ↪    for  {}\n", record);
            }
            return Ok((Resolution::Matched(top.id), Via::Auto));
        }

        let (resolution, choice) = Disambiguator::new(&mut *self.input).disambiguate(
            source,
            record,
            &candidates,
            registry,
            exclusion,
            &mut *self.store,
        )?;
        decisions.insert(cache_key, choice);
        Ok((resolution, Via::Operator))
    }

    /// Merge one resolution into the registry
    fn apply(
        &self,
        source: &str,
        record: &Record,
        resolution: Resolution,
        registry: &mut CanonicalRegistry,
        exclusion: &mut ExclusionSet,
    ) {
        match resolution {
            Resolution::Matched(id) => {
                registry.attach(id, source, record.clone());
                exclusion.insert(id);
            }
            Resolution::CreateNew => {
                registry.insert(CanonicalRecord::from_source(source, record.clone()));
            }
            Resolution::Skip => {}
        }
    }
}

/// Turn a logged choice back into a resolution
///
/// A selection naming no live canonical record is a hard failure.
fn replay(
    source: &str,
    record: &Record,
    choice: &Choice,
    registry: &CanonicalRegistry,
) -> Result<Resolution> {
    match choice {
        Choice::CreateNew => Ok(Resolution::CreateNew),
        Choice::Skip => Ok(Resolution::Skip),
        Choice::Select(name) => registry
            .find_by_raw_name(name)
            .map(Resolution::Matched)
            .ok_or_else(|| ReconcileError::UnresolvableDecision {
                source_id: source.to_string(),
                name: record.name.clone(),
                choice: name.clone(),
            }),
    }
}

// ============================================================================
// TESTS
// ============================================================================
