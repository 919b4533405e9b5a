// ⚙️ Configuration - Run settings as data
//
// Everything has a default, so a config file is optional and may be
// partial. The CLI applies its flags on top of whatever was loaded here.

use crate::loader::DuplicateExceptions;
use crate::matcher::MatchPolicy;
use crate::schema::{ShapeRegistry, SourceKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Decision log file name inside the data directory
pub const DEFAULT_DECISION_FILE: &str = "combine_selections.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Directory holding one `<source>.json` per source
    pub data_dir: PathBuf,

    /// Decision log; `<data_dir>/combine_selections.csv` when unset
    pub decision_file: Option<PathBuf>,

    /// Source whose records seed the canonical registry
    pub target_source: String,

    /// Combined JSON output
    pub output: PathBuf,

    /// SQLite output, skipped when unset
    pub sqlite: Option<PathBuf>,

    pub matching: MatchPolicy,

    /// Per source: normalized names allowed to appear twice
    pub duplicate_exceptions: DuplicateExceptions,

    /// Per source: fields every record must carry
    pub required_fields: BTreeMap<String, Vec<String>>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            data_dir: PathBuf::from("data"),
            decision_file: None,
            target_source: SourceKind::Rowo2019.id().to_string(),
            output: PathBuf::from("combined.json"),
            sqlite: None,
            matching: MatchPolicy::default(),
            duplicate_exceptions: DuplicateExceptions::standard(),
            required_fields: BTreeMap::new(),
        }
    }
}

impl ReconcileConfig {
    /// Load from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: ReconcileConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }

    /// Where decisions are read from and appended to
    pub fn decision_path(&self) -> PathBuf {
        self.decision_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DEFAULT_DECISION_FILE))
    }

    /// Standard shapes plus the configured required fields
    pub fn shape_registry(&self) -> Result<ShapeRegistry> {
        let mut shapes = ShapeRegistry::standard();
        for (source, fields) in &self.required_fields {
            for field in fields {
                shapes
                    .require_field(source, field)
                    .with_context(|| format!("Invalid required field '{}' in config", field))?;
            }
        }
        Ok(shapes)
    }
}

// ============================================================================
// TESTS
// ============================================================================
