// 💾 Export - Write the canonical registry out
//
// JSON for people and downstream scripts, SQLite (feature `sqlite`) for
// queries across runs. Both write records in `sorted_records()` order.

use crate::registry::CanonicalRegistry;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

#[cfg(feature = "sqlite")]
use crate::engine::ReconciliationReport;
#[cfg(feature = "sqlite")]
use crate::model::{CanonicalRecord, Record};
#[cfg(feature = "sqlite")]
use rusqlite::{params, Connection};
#[cfg(feature = "sqlite")]
use sha2::{Digest, Sha256};
#[cfg(feature = "sqlite")]
use tracing::{debug, info};

// ============================================================================
// JSON
// ============================================================================

/// Write every canonical record as a pretty JSON array
pub fn write_json(registry: &CanonicalRegistry, path: &Path) -> Result<()> {
    let records = registry.sorted_records();
    let mut json = serde_json::to_string_pretty(&records)
        .context("Failed to serialize canonical records")?;
    json.push('\n');

    fs::write(path, json).with_context(|| format!("Failed to write output file: {:?}", path))?;
    Ok(())
}

// ============================================================================
// SQLITE
// ============================================================================

/// Rows written by one `write_sqlite` call
#[cfg(feature = "sqlite")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqliteExport {
    pub inserted: usize,
    pub duplicates: usize,
    pub provenance: usize,
}

/// Content hash of a canonical record's own data (provenance excluded)
#[cfg(feature = "sqlite")]
pub fn record_hash(record: &CanonicalRecord) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&record.record)?);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(feature = "sqlite")]
pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS canonical_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_hash TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL,
            plz TEXT,
            from_target INTEGER NOT NULL,
            fields TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS provenance (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_hash TEXT NOT NULL,
            source TEXT NOT NULL,
            name TEXT NOT NULL,
            plz TEXT,
            fields TEXT NOT NULL,
            UNIQUE(record_hash, source)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reconciliation_runs (
            run_id TEXT PRIMARY KEY,
            reconciled_at TEXT NOT NULL,
            found INTEGER NOT NULL,
            skipped INTEGER NOT NULL,
            added INTEGER NOT NULL,
            aborted INTEGER NOT NULL,
            fingerprint TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_name_key ON canonical_records(name_key)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_provenance_source ON provenance(source)",
        [],
    )?;

    Ok(())
}

/// Write the registry and the run summary to a SQLite database
///
/// Records already present (same `record_hash`) are counted as duplicates;
/// their provenance rows are replaced with the current ones.
#[cfg(feature = "sqlite")]
pub fn write_sqlite(
    registry: &CanonicalRegistry,
    report: &ReconciliationReport,
    path: &Path,
) -> Result<SqliteExport> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {:?}", path))?;
    setup_database(&conn)?;

    let tx = conn.transaction()?;
    let mut export = SqliteExport::default();

    for canonical in registry.sorted_records() {
        let hash = record_hash(canonical)?;
        let fields = serde_json::to_string(&canonical.record.fields)?;

        let result = tx.execute(
            "INSERT INTO canonical_records (
                record_hash, name, name_key, plz, from_target, fields
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                hash,
                canonical.record.name,
                canonical.record.name_key().as_str(),
                canonical.record.postal_code(),
                canonical.from_target,
                fields,
            ],
        );

        match result {
            Ok(_) => export.inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                debug!(name = %canonical.record.name, "record already exported");
                export.duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }

        for (source, record) in &canonical.sources {
            insert_provenance(&tx, &hash, source, record)?;
            export.provenance += 1;
        }
    }

    tx.execute(
        "INSERT OR REPLACE INTO reconciliation_runs (
            run_id, reconciled_at, found, skipped, added, aborted, fingerprint
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            report.run_id.to_string(),
            report.reconciled_at.to_rfc3339(),
            report.found as i64,
            report.skipped as i64,
            report.added as i64,
            report.aborted,
            registry.fingerprint()?,
        ],
    )?;

    tx.commit()?;

    info!(
        path = %path.display(),
        inserted = export.inserted,
        duplicates = export.duplicates,
        provenance = export.provenance,
        "sqlite export written"
    );
    Ok(export)
}

#[cfg(feature = "sqlite")]
fn insert_provenance(conn: &Connection, hash: &str, source: &str, record: &Record) -> Result<()> {
    let fields = serde_json::to_string(&record.fields)?;
    conn.execute(
        "INSERT OR REPLACE INTO provenance (record_hash, source, name, plz, fields)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![hash, source, record.name, record.postal_code(), fields],
    )?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CanonicalRecord, Record};
    use serde_json::json;
    use tempfile::TempDir;

    fn registry() -> CanonicalRegistry {
        let mut registry = CanonicalRegistry::new();
        registry.insert(CanonicalRecord::from_target(
            Record::new("Stadtwerke Musterstadt GmbH")
                .with_plz("12345")
                .with_field("ort", json!("Musterstadt")),
        ));
        let id = registry.insert(CanonicalRecord::from_target(Record::new("Naturstrom AG")));
        registry.attach(id, "okpower", Record::new("NATURSTROM"));
        registry.insert(CanonicalRecord::from_source("verivox", Record::new("Polarstern")));
        registry
    }

    #[test]
    fn test_json_sorted_by_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("combined.json");
        write_json(&registry(), &path).unwrap();

        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let names: Vec<&str> = written
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Naturstrom AG", "Polarstern", "Stadtwerke Musterstadt GmbH"]);
    }

    #[test]
    fn test_json_keeps_provenance_and_flags() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("combined.json");
        write_json(&registry(), &path).unwrap();

        let written: Vec<CanonicalRecord> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(written[0].from_target);
        assert_eq!(written[0].sources["okpower"].name, "NATURSTROM");
        assert!(!written[1].from_target);
        assert_eq!(written[2].record.fields.get("ort"), Some(&json!("Musterstadt")));
    }

    #[cfg(feature = "sqlite")]
    mod sqlite {
        use super::*;
        use crate::decisions::MemoryDecisionStore;
        use crate::engine::ReconciliationEngine;
        use crate::matcher::Matcher;
        use crate::prompt::ScriptedInput;
        use std::collections::BTreeMap;

        fn report() -> ReconciliationReport {
            let mut store = MemoryDecisionStore::new();
            let mut input = ScriptedInput::new(Vec::<String>::new());
            ReconciliationEngine::new(Matcher::new(), &mut store, &mut input)
                .reconcile(&BTreeMap::new(), &mut CanonicalRegistry::new())
                .unwrap()
        }

        fn count(conn: &Connection, table: &str) -> i64 {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .unwrap()
        }

        #[test]
        fn test_sqlite_tables_written() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("combined.db");

            let export = write_sqlite(&registry(), &report(), &path).unwrap();
            assert_eq!(export, SqliteExport { inserted: 3, duplicates: 0, provenance: 2 });

            let conn = Connection::open(&path).unwrap();
            assert_eq!(count(&conn, "canonical_records"), 3);
            assert_eq!(count(&conn, "provenance"), 2);
            assert_eq!(count(&conn, "reconciliation_runs"), 1);

            let mode: String = conn
                .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .unwrap();
            assert_eq!(mode, "wal");
        }

        #[test]
        fn test_sqlite_rerun_counts_duplicates() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("combined.db");

            write_sqlite(&registry(), &report(), &path).unwrap();
            let again = write_sqlite(&registry(), &report(), &path).unwrap();

            assert_eq!(again.inserted, 0);
            assert_eq!(again.duplicates, 3);

            let conn = Connection::open(&path).unwrap();
            assert_eq!(count(&conn, "canonical_records"), 3);
            assert_eq!(count(&conn, "provenance"), 2);
            assert_eq!(count(&conn, "reconciliation_runs"), 2);
        }

        #[test]
        fn test_record_hash_ignores_provenance() {
            let plain = CanonicalRecord::from_target(Record::new("Naturstrom AG"));
            let mut attached = plain.clone();
            attached.attach("okpower", Record::new("NATURSTROM"));

            assert_eq!(record_hash(&plain).unwrap(), record_hash(&attached).unwrap());
        }
    }
}
