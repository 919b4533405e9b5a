// Error types for the reconciliation engine
//
// Everything fatal is a variant here. `Aborted` is the one variant that is
// NOT a failure: it is how an operator `q` unwinds the loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Two or more records of one source share a normalized key
    ///
    /// `records` holds the raw names of every colliding record, grouped by key.
    #[error("duplicate normalized names in source '{source_id}': {} ({})", keys.join(", "), records.join(" | "))]
    DuplicateIdentity {
        source_id: String,
        keys: Vec<String>,
        records: Vec<String>,
    },

    /// No record shape is registered for this source id
    #[error("unknown source '{0}': no record shape registered")]
    UnknownSource(String),

    /// The data directory has no file for the target source
    #[error("target source '{0}' not found in data directory")]
    MissingTarget(String),

    /// The file name and the `source` field inside the file disagree
    #[error("source file '{file_source}' declares source '{declared}'")]
    SourceMismatch { file_source: String, declared: String },

    /// A record does not fit its source's shape
    #[error("invalid record in source '{source_id}': {message}")]
    InvalidRecord { source_id: String, message: String },

    /// A stored selection names a canonical record that does not exist
    #[error("decision for '{name}' ({source_id}) selects unknown canonical record '{choice}'")]
    UnresolvableDecision {
        source_id: String,
        name: String,
        choice: String,
    },

    /// A decision log line could not be parsed
    #[error("malformed decision log line {line}: {message}")]
    MalformedDecision { line: u64, message: String },

    /// A decision field holds the delimiter or a line break
    #[error("decision for source '{source_id}' cannot be logged: '{field}' contains ';' or a line break")]
    UnloggableDecision { source_id: String, field: String },

    /// Operator asked to quit
    #[error("reconciliation aborted by operator")]
    Aborted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl ReconcileError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, ReconcileError::Aborted)
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
