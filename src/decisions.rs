// 📝 Decision Store - Append-only log of operator decisions
//
// Format, one decision per line:
//   source;raw_name;choice
// choice is empty for "create new", `-1` for "skip", otherwise the raw name
// of the selected canonical record. Later lines win on load. The file is
// never rewritten. Fields are written as-is, no quoting, so a name holding
// `;` or a line break cannot be logged.

use crate::error::{ReconcileError, Result};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Literal written for a skipped record
pub const SKIP_MARKER: &str = "-1";

// ============================================================================
// DECISION
// ============================================================================

/// How one (source, record) pair was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    /// Matched to the canonical record with this raw name
    Select(String),
    /// No canonical record fits; a new one was created
    CreateNew,
    /// Record left out of the canonical registry
    Skip,
}

impl Choice {
    /// Parse the third column of a log line
    pub fn from_field(field: &str) -> Choice {
        match field {
            "" => Choice::CreateNew,
            SKIP_MARKER => Choice::Skip,
            name => Choice::Select(name.to_string()),
        }
    }

    pub fn as_field(&self) -> &str {
        match self {
            Choice::Select(name) => name,
            Choice::CreateNew => "",
            Choice::Skip => SKIP_MARKER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub source: String,
    pub name: String,
    pub choice: Choice,
}

impl Decision {
    pub fn new(source: impl Into<String>, name: impl Into<String>, choice: Choice) -> Self {
        Decision {
            source: source.into(),
            name: name.into(),
            choice,
        }
    }
}

/// (source, raw record name) → latest choice
pub type DecisionMap = HashMap<(String, String), Choice>;

// ============================================================================
// STORE TRAIT
// ============================================================================

pub trait DecisionStore {
    /// Read every decision made so far
    fn load(&self) -> Result<DecisionMap>;

    /// Persist one decision; durable once this returns
    fn append(&mut self, decision: &Decision) -> Result<()>;
}

// ============================================================================
// FILE STORE
// ============================================================================

/// Decision log on disk (`combine_selections.csv`)
pub struct FileDecisionStore {
    path: PathBuf,
}

impl FileDecisionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileDecisionStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DecisionStore for FileDecisionStore {
    fn load(&self) -> Result<DecisionMap> {
        let mut decisions = DecisionMap::new();
        if !self.path.exists() {
            return Ok(decisions);
        }

        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_path(&self.path)?;

        for result in rdr.records() {
            let row = result?;
            let line = row.position().map(|p| p.line()).unwrap_or(0);

            // Blank line
            if row.len() == 1 && row[0].is_empty() {
                continue;
            }
            if row.len() != 3 {
                return Err(ReconcileError::MalformedDecision {
                    line,
                    message: format!("expected 3 fields, found {}", row.len()),
                });
            }

            decisions.insert(
                (row[0].to_string(), row[1].to_string()),
                Choice::from_field(&row[2]),
            );
        }

        debug!(path = %self.path.display(), decisions = decisions.len(), "loaded decision log");
        Ok(decisions)
    }

    fn append(&mut self, decision: &Decision) -> Result<()> {
        let fields = [
            decision.source.as_str(),
            decision.name.as_str(),
            decision.choice.as_field(),
        ];
        if let Some(field) = fields.iter().find(|f| f.contains([';', '\n', '\r'])) {
            return Err(ReconcileError::UnloggableDecision {
                source_id: decision.source.clone(),
                field: field.to_string(),
            });
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .quote_style(csv::QuoteStyle::Never)
            .from_writer(file);

        wtr.write_record(fields)?;
        wtr.flush()?;

        let file = wtr.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Store that keeps the log in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryDecisionStore {
    log: Vec<Decision>,
}

impl MemoryDecisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed with earlier decisions
    pub fn with_decisions(decisions: Vec<Decision>) -> Self {
        MemoryDecisionStore { log: decisions }
    }

    /// Every appended decision, oldest first
    pub fn log(&self) -> &[Decision] {
        &self.log
    }
}

impl DecisionStore for MemoryDecisionStore {
    fn load(&self) -> Result<DecisionMap> {
        Ok(self
            .log
            .iter()
            .map(|d| ((d.source.clone(), d.name.clone()), d.choice.clone()))
            .collect())
    }

    fn append(&mut self, decision: &Decision) -> Result<()> {
        self.log.push(decision.clone());
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
