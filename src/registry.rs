// 🗂️ Canonical Registry - The merged entities and their lookup indexes
//
// Records are stored once; the indexes point into that storage:
//   - by normalized name
//   - by normalized name with postal code prefix (matching key)
//   - by raw name (decision replay)
// Every insertion updates all three together.

use crate::error::Result;
use crate::model::{CanonicalRecord, NormalizedKey, Record, SourceCollection};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Stable handle to a canonical record within one registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalId(usize);

/// Which index a lookup goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalIndex {
    /// Normalized name only
    Name,
    /// `"{plz} {normalized name}"` (plain name when no postal code)
    NamePostal,
}

impl CanonicalIndex {
    /// Records with a postal code match against the postal index
    pub fn for_record(record: &Record) -> Self {
        if record.postal_code().is_some() {
            CanonicalIndex::NamePostal
        } else {
            CanonicalIndex::Name
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CanonicalRegistry {
    records: Vec<CanonicalRecord>,
    by_name: BTreeMap<NormalizedKey, CanonicalId>,
    by_name_plz: BTreeMap<NormalizedKey, CanonicalId>,
    by_raw_name: HashMap<String, CanonicalId>,
}

impl CanonicalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the target source
    pub fn from_target(collection: SourceCollection<CanonicalRecord>) -> Self {
        let mut registry = CanonicalRegistry::new();
        for record in collection.into_records() {
            registry.insert(record);
        }
        registry
    }

    /// Add a record to storage and every index
    ///
    /// A matching key already present in an index is repointed to the new
    /// record; the older record stays in storage and in the other indexes.
    /// Raw names are first come: a logged selection always replays to the
    /// record that first carried the name.
    pub fn insert(&mut self, record: CanonicalRecord) -> CanonicalId {
        let id = CanonicalId(self.records.len());
        self.by_name.insert(record.record.name_key(), id);
        self.by_name_plz.insert(record.record.match_key(), id);
        self.by_raw_name
            .entry(record.record.name.clone())
            .or_insert(id);
        self.records.push(record);
        id
    }

    /// Attach a source's record to a canonical record's provenance
    pub fn attach(&mut self, id: CanonicalId, source: &str, record: Record) {
        if let Some(canonical) = self.records.get_mut(id.0) {
            canonical.attach(source, record);
        }
    }

    pub fn get(&self, id: CanonicalId) -> Option<&CanonicalRecord> {
        self.records.get(id.0)
    }

    pub fn lookup(&self, index: CanonicalIndex, key: &NormalizedKey) -> Option<CanonicalId> {
        self.index(index).get(key).copied()
    }

    pub fn find_by_raw_name(&self, name: &str) -> Option<CanonicalId> {
        self.by_raw_name.get(name).copied()
    }

    /// All keys of one index with the record they point to
    pub fn entries(&self, index: CanonicalIndex) -> impl Iterator<Item = (&NormalizedKey, CanonicalId)> {
        self.index(index).iter().map(|(k, id)| (k, *id))
    }

    fn index(&self, index: CanonicalIndex) -> &BTreeMap<NormalizedKey, CanonicalId> {
        match index {
            CanonicalIndex::Name => &self.by_name,
            CanonicalIndex::NamePostal => &self.by_name_plz,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order (target records first)
    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    /// Records ordered by normalized name, then postal code, for export
    pub fn sorted_records(&self) -> Vec<&CanonicalRecord> {
        let mut sorted: Vec<&CanonicalRecord> = self.records.iter().collect();
        sorted.sort_by_key(|r| {
            (
                r.record.name_key(),
                r.record.postal_code().map(str::to_string),
                r.record.name.clone(),
            )
        });
        sorted
    }

    /// SHA-256 over the sorted records
    ///
    /// Two runs over the same inputs and decisions yield the same digest.
    pub fn fingerprint(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        for record in self.sorted_records() {
            hasher.update(serde_json::to_vec(record)?);
            hasher.update(b"\n");
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> CanonicalRegistry {
        let mut registry = CanonicalRegistry::new();
        registry.insert(CanonicalRecord::from_target(Record::new("Naturstrom AG")));
        registry.insert(CanonicalRecord::from_target(
            Record::new("Stadtwerke Musterstadt GmbH").with_plz("12345"),
        ));
        registry
    }

    #[test]
    fn test_insert_updates_both_indexes() {
        let registry = seeded();

        let by_name = registry.lookup(CanonicalIndex::Name, &NormalizedKey::from("stadtwerke musterstadt"));
        let by_plz = registry.lookup(
            CanonicalIndex::NamePostal,
            &NormalizedKey::from("12345 stadtwerke musterstadt"),
        );

        assert!(by_name.is_some());
        assert_eq!(by_name, by_plz);
        assert_eq!(registry.find_by_raw_name("Stadtwerke Musterstadt GmbH"), by_name);
    }

    #[test]
    fn test_record_without_plz_uses_name_in_postal_index() {
        let registry = seeded();
        let id = registry.lookup(CanonicalIndex::NamePostal, &NormalizedKey::from("naturstrom"));
        assert_eq!(registry.get(id.unwrap()).unwrap().name(), "Naturstrom AG");
    }

    #[test]
    fn test_index_choice_follows_postal_code() {
        assert_eq!(CanonicalIndex::for_record(&Record::new("A")), CanonicalIndex::Name);
        assert_eq!(
            CanonicalIndex::for_record(&Record::new("A").with_plz("10115")),
            CanonicalIndex::NamePostal
        );
    }

    #[test]
    fn test_raw_name_keeps_first_record() {
        let mut registry = seeded();
        let first = registry.find_by_raw_name("Naturstrom AG").unwrap();
        let second = registry.insert(CanonicalRecord::from_source(
            "verivox",
            Record::new("Naturstrom AG").with_plz("40210"),
        ));

        assert_ne!(first, second);
        assert_eq!(registry.find_by_raw_name("Naturstrom AG"), Some(first));
        assert_eq!(
            registry.lookup(CanonicalIndex::NamePostal, &NormalizedKey::from("40210 naturstrom")),
            Some(second)
        );
    }

    #[test]
    fn test_attach_provenance() {
        let mut registry = seeded();
        let id = registry.find_by_raw_name("Naturstrom AG").unwrap();
        registry.attach(id, "okpower", Record::new("NATURSTROM"));

        let canonical = registry.get(id).unwrap();
        assert_eq!(canonical.sources.get("okpower").map(|r| r.name.as_str()), Some("NATURSTROM"));
    }

    #[test]
    fn test_fingerprint_ignores_insertion_order() {
        let a = seeded();
        let mut b = CanonicalRegistry::new();
        b.insert(CanonicalRecord::from_target(
            Record::new("Stadtwerke Musterstadt GmbH").with_plz("12345"),
        ));
        b.insert(CanonicalRecord::from_target(Record::new("Naturstrom AG")));

        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_changes_with_provenance() {
        let a = seeded();
        let mut b = seeded();
        let id = b.find_by_raw_name("Naturstrom AG").unwrap();
        b.attach(id, "okpower", Record::new("Naturstrom"));

        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }
}
