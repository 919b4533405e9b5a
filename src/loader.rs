// 📂 Source Loader - Read scraped collections, key them by normalized name
//
// A source whose records collide under one normalized key is rejected:
// the duplicates are printed grouped by key and loading stops. Only keys
// on the exception list are tolerated (last record wins).

use crate::error::{ReconcileError, Result};
use crate::model::{CanonicalRecord, Identified, NormalizedKey, Record, SourceCollection};
use crate::schema::ShapeRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ============================================================================
// INPUT FORMAT
// ============================================================================

/// One scraper output file: `{"source": "...", "results": [...]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResults<R> {
    #[serde(default)]
    pub source: Option<String>,
    pub results: Vec<R>,
}

// ============================================================================
// DUPLICATE EXCEPTIONS
// ============================================================================

/// Keys allowed to repeat within one specific source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DuplicateExceptions(BTreeMap<String, BTreeSet<String>>);

impl DuplicateExceptions {
    pub fn none() -> Self {
        DuplicateExceptions(BTreeMap::new())
    }

    /// Öko-Test lists Westfalenwind twice
    pub fn standard() -> Self {
        DuplicateExceptions::none().with("oekotest", "westfalenwind")
    }

    pub fn with(mut self, source: &str, key: &str) -> Self {
        self.0
            .entry(source.to_string())
            .or_default()
            .insert(key.to_string());
        self
    }

    pub fn allows(&self, source: &str, key: &NormalizedKey) -> bool {
        self.0
            .get(source)
            .is_some_and(|keys| keys.contains(key.as_str()))
    }
}

// ============================================================================
// KEYED COLLECTIONS
// ============================================================================

/// Key records by normalized name, rejecting collisions
pub fn to_collection<R>(
    source: &str,
    results: Vec<R>,
    exceptions: &DuplicateExceptions,
) -> Result<SourceCollection<R>>
where
    R: Identified + Display + Clone,
{
    let mut collection = SourceCollection::new(source);
    let mut seen: BTreeMap<NormalizedKey, Vec<R>> = BTreeMap::new();
    let mut duplicate_keys: BTreeSet<NormalizedKey> = BTreeSet::new();

    for record in results {
        let key = record.record().name_key();
        seen.entry(key.clone()).or_default().push(record.clone());
        if collection.insert(key.clone(), record).is_some() {
            if exceptions.allows(source, &key) {
                warn!(source, key = %key, "tolerating whitelisted duplicate");
            } else {
                duplicate_keys.insert(key);
            }
        }
    }

    if duplicate_keys.is_empty() {
        return Ok(collection);
    }

    let mut records = Vec::new();
    for key in &duplicate_keys {
        println!(" -> {} ({})", key, source);
        for record in seen.get(key).into_iter().flatten() {
            println!("      -> {}", record);
            records.push(record.record().name.clone());
        }
    }

    Err(ReconcileError::DuplicateIdentity {
        source_id: source.to_string(),
        keys: duplicate_keys.into_iter().map(|k| k.to_string()).collect(),
        records,
    })
}

// ============================================================================
// DATA DIRECTORY
// ============================================================================

/// Everything loaded from the data directory
#[derive(Debug, Clone)]
pub struct LoadedSources {
    pub target: String,
    pub canonical: SourceCollection<CanonicalRecord>,

    /// Non-target sources, ordered by source id
    pub sources: BTreeMap<String, SourceCollection<Record>>,
}

/// Every `*.json` file in `dir`, sorted by name
pub fn discover_sources(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            found.push((stem.to_string(), path.clone()));
        }
    }
    found.sort();
    Ok(found)
}

fn parse_file<R>(source: &str, path: &Path) -> Result<Vec<R>>
where
    R: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)?;
    let parsed: ScrapeResults<R> = serde_json::from_str(&content)?;

    if let Some(declared) = parsed.source {
        if declared != source {
            return Err(ReconcileError::SourceMismatch {
                file_source: source.to_string(),
                declared,
            });
        }
    }

    Ok(parsed.results)
}

/// Load every source in the data directory
///
/// The target source is read as canonical records; all others as plain
/// records. Every source needs a registered shape.
pub fn load_data_dir(
    dir: &Path,
    target: &str,
    shapes: &ShapeRegistry,
    exceptions: &DuplicateExceptions,
) -> Result<LoadedSources> {
    let mut canonical = None;
    let mut sources = BTreeMap::new();

    for (source, path) in discover_sources(dir)? {
        let shape = shapes.shape_for(&source)?;
        debug!(source = %source, path = %path.display(), "loading source");

        if source == target {
            let records: Vec<CanonicalRecord> = parse_file(&source, &path)?;
            for r in &records {
                shape.validate(&r.record)?;
            }
            let collection = to_collection(&source, records, exceptions)?;
            println!("✓ {} ({}): {} canonical records", shape.display_name, source, collection.len());
            info!(source = %source, records = collection.len(), "loaded target source");
            canonical = Some(collection);
        } else {
            let records: Vec<Record> = parse_file(&source, &path)?;
            for r in &records {
                shape.validate(r)?;
            }
            let collection = to_collection(&source, records, exceptions)?;
            println!("✓ {} ({}): {} records", shape.display_name, source, collection.len());
            info!(source = %source, records = collection.len(), "loaded source");
            sources.insert(source, collection);
        }
    }

    let canonical = canonical.ok_or_else(|| ReconcileError::MissingTarget(target.to_string()))?;

    Ok(LoadedSources {
        target: target.to_string(),
        canonical,
        sources,
    })
}

// ============================================================================
// TESTS
// ============================================================================
