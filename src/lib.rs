// Source Reconcile - Core Library
// Merges supplier lists from several scrapers into one canonical registry

pub mod error;
pub mod model;
pub mod schema;         // Record shapes per source
pub mod loader;         // Source files → keyed collections
pub mod decisions;      // Append-only decision log
pub mod similarity;     // Fuzzy scoring
pub mod registry;       // Canonical records + indexes
pub mod matcher;        // Candidates + auto-accept rule
pub mod prompt;         // Operator disambiguation
pub mod engine;         // Reconciliation loop
pub mod export;         // JSON / SQLite output
pub mod config;

// Re-export commonly used types
pub use error::{ReconcileError, Result};
pub use model::{
    CanonicalRecord, Identified, NormalizedKey, Record, SourceCollection,
    normalize_name,
};
pub use schema::{RecordShape, ShapeRegistry, SourceKind};
pub use loader::{
    DuplicateExceptions, LoadedSources, ScrapeResults,
    discover_sources, load_data_dir, to_collection,
};
pub use decisions::{
    Choice, Decision, DecisionMap, DecisionStore,
    FileDecisionStore, MemoryDecisionStore, SKIP_MARKER,
};
pub use similarity::{JaroWinkler, ScorerKind, SimilarityScorer, WeightedRatio};
pub use registry::{CanonicalId, CanonicalIndex, CanonicalRegistry};
pub use matcher::{Candidate, ExclusionSet, MatchPolicy, Matcher};
pub use prompt::{
    Disambiguator, InputProvider, Resolution, ScriptedInput, Selection, StdinInput,
    parse_selection,
};
pub use engine::{ReconciliationEngine, ReconciliationReport, SourceTally};
pub use export::write_json;
#[cfg(feature = "sqlite")]
pub use export::{write_sqlite, SqliteExport};
pub use config::ReconcileConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
