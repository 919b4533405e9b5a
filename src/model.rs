// 🧾 Record Model - Source records, canonical records, normalized keys
//
// A Record is what one source says about one provider. It never changes
// after load. A CanonicalRecord is the merged entity: the target source's
// record plus provenance from every source matched to it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ============================================================================
// NORMALIZED KEY
// ============================================================================

/// Identity key used for lookup and fuzzy matching only
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    pub fn new(key: impl Into<String>) -> Self {
        NormalizedKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NormalizedKey {
    fn from(s: &str) -> Self {
        NormalizedKey(s.to_string())
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// One provider as reported by one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Raw name exactly as scraped
    pub name: String,

    /// Postal code (PLZ) if the source reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plz: Option<String>,

    /// Source-specific fields, kept as-is
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Record {
            name: name.into(),
            plz: None,
            fields: Map::new(),
        }
    }

    /// Builder: set postal code
    pub fn with_plz(mut self, plz: impl Into<String>) -> Self {
        self.plz = Some(plz.into());
        self
    }

    /// Builder: add a source-specific field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Postal code, ignoring blank values
    pub fn postal_code(&self) -> Option<&str> {
        self.plz.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }

    /// Normalized name alone
    pub fn name_key(&self) -> NormalizedKey {
        NormalizedKey(normalize_name(&self.name))
    }

    /// Key used for matching: `"{plz} {name}"` when a postal code exists
    pub fn match_key(&self) -> NormalizedKey {
        match self.postal_code() {
            Some(plz) => NormalizedKey(format!("{} {}", plz, normalize_name(&self.name))),
            None => self.name_key(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.postal_code() {
            Some(plz) => write!(f, "{} [{}]", self.name, plz)?,
            None => write!(f, "{}", self.name)?,
        }
        if let Some(Value::String(city)) = self.fields.get("ort") {
            write!(f, " {}", city)?;
        }
        Ok(())
    }
}

// ============================================================================
// CANONICAL RECORD
// ============================================================================

fn default_true() -> bool {
    true
}

/// The merged entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    #[serde(flatten)]
    pub record: Record,

    /// True when the entity was seeded by the target source
    #[serde(rename = "rowo2019", alias = "from_target", default = "default_true")]
    pub from_target: bool,

    /// Provenance: source id → record that source contributed
    #[serde(default)]
    pub sources: BTreeMap<String, Record>,
}

impl CanonicalRecord {
    /// Seed from a target-source record
    pub fn from_target(record: Record) -> Self {
        CanonicalRecord {
            record,
            from_target: true,
            sources: BTreeMap::new(),
        }
    }

    /// Synthesize from a record no canonical entity matched
    pub fn from_source(source: &str, record: Record) -> Self {
        let mut sources = BTreeMap::new();
        sources.insert(source.to_string(), record.clone());
        CanonicalRecord {
            record,
            from_target: false,
            sources,
        }
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn attach(&mut self, source: &str, record: Record) {
        self.sources.insert(source.to_string(), record);
    }
}

impl fmt::Display for CanonicalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.record.fmt(f)
    }
}

/// Anything that can be keyed into a SourceCollection
pub trait Identified {
    fn record(&self) -> &Record;
}

impl Identified for Record {
    fn record(&self) -> &Record {
        self
    }
}

impl Identified for CanonicalRecord {
    fn record(&self) -> &Record {
        &self.record
    }
}

// ============================================================================
// SOURCE COLLECTION
// ============================================================================

/// Records of one source keyed by normalized name, in load order
#[derive(Debug, Clone)]
pub struct SourceCollection<R = Record> {
    source: String,
    order: Vec<NormalizedKey>,
    records: HashMap<NormalizedKey, R>,
}

impl<R> SourceCollection<R> {
    pub fn new(source: impl Into<String>) -> Self {
        SourceCollection {
            source: source.into(),
            order: Vec::new(),
            records: HashMap::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: NormalizedKey, record: R) -> Option<R> {
        let previous = self.records.insert(key.clone(), record);
        if previous.is_none() {
            self.order.push(key);
        }
        previous
    }

    pub fn get(&self, key: &NormalizedKey) -> Option<&R> {
        self.records.get(key)
    }

    pub fn contains_key(&self, key: &NormalizedKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate in load order
    pub fn iter(&self) -> impl Iterator<Item = (&NormalizedKey, &R)> {
        self.order
            .iter()
            .filter_map(move |key| self.records.get(key).map(|r| (key, r)))
    }

    pub fn into_records(mut self) -> Vec<R> {
        let mut records = Vec::with_capacity(self.order.len());
        for key in &self.order {
            if let Some(r) = self.records.remove(key) {
                records.push(r);
            }
        }
        records
    }
}

// ============================================================================
// NAME NORMALIZATION
// ============================================================================

/// Legal-form tokens dropped from the end of provider names
const LEGAL_FORMS: &[&str] = &["gmbh", "mbh", "ag", "kg", "co", "eg", "ug", "se", "ev"];

/// Normalize a provider name for matching
///
/// - Lowercase, umlauts folded (ä → ae, ß → ss)
/// - Anything not alphanumeric becomes a space
/// - Trailing legal forms removed ("GmbH & Co. KG")
/// - Whitespace collapsed
///
/// Example: "Stadtwerke Musterstadt GmbH" → "stadtwerke musterstadt"
pub fn normalize_name(name: &str) -> String {
    let mut folded = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        match c {
            'ä' => folded.push_str("ae"),
            'ö' => folded.push_str("oe"),
            'ü' => folded.push_str("ue"),
            'ß' => folded.push_str("ss"),
            c if c.is_alphanumeric() => folded.push(c),
            _ => folded.push(' '),
        }
    }

    let mut words: Vec<&str> = folded.split_whitespace().collect();
    // Never strip the name down to nothing
    while words.len() > 1 && words.last().is_some_and(|w| LEGAL_FORMS.contains(w)) {
        words.pop();
    }

    words.join(" ")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_name_strips_legal_form() {
        assert_eq!(normalize_name("Stadtwerke Musterstadt GmbH"), "stadtwerke musterstadt");
        assert_eq!(normalize_name("EWS Schönau eG"), "ews schoenau");
        assert_eq!(normalize_name("Naturstrom AG"), "naturstrom");
    }

    #[test]
    fn test_normalize_name_compound_legal_form() {
        assert_eq!(
            normalize_name("Westfalenwind Strom GmbH & Co. KG"),
            "westfalenwind strom"
        );
    }

    #[test]
    fn test_normalize_name_keeps_single_token() {
        // A provider literally called "AG" keeps its name
        assert_eq!(normalize_name("AG"), "ag");
    }

    #[test]
    fn test_normalize_name_punctuation_and_spacing() {
        assert_eq!(normalize_name("  Green-Planet   Energy  "), "green planet energy");
        assert_eq!(normalize_name("Straßen-Strom"), "strassen strom");
    }

    #[test]
    fn test_match_key_with_plz() {
        let record = Record::new("Stadtwerke Musterstadt GmbH").with_plz("12345");
        assert_eq!(record.name_key().as_str(), "stadtwerke musterstadt");
        assert_eq!(record.match_key().as_str(), "12345 stadtwerke musterstadt");
    }

    #[test]
    fn test_match_key_blank_plz_is_ignored() {
        let record = Record::new("Polarstern").with_plz("  ");
        assert_eq!(record.postal_code(), None);
        assert_eq!(record.match_key(), record.name_key());
    }

    #[test]
    fn test_record_keeps_source_fields() {
        let record: Record = serde_json::from_value(json!({
            "name": "Polarstern GmbH",
            "plz": "80331",
            "tarif": "Wirklich Ökostrom",
            "bewertung": 1.2
        }))
        .unwrap();

        assert_eq!(record.plz.as_deref(), Some("80331"));
        assert_eq!(record.fields.get("tarif"), Some(&json!("Wirklich Ökostrom")));
        assert_eq!(record.fields.len(), 2);
    }

    #[test]
    fn test_canonical_record_defaults_to_target() {
        let canonical: CanonicalRecord =
            serde_json::from_value(json!({"name": "Naturstrom AG", "ort": "Düsseldorf"})).unwrap();

        assert!(canonical.from_target);
        assert!(canonical.sources.is_empty());
        assert_eq!(canonical.record.fields.get("ort"), Some(&json!("Düsseldorf")));
    }

    #[test]
    fn test_canonical_record_from_source() {
        let record = Record::new("Bürgerwerke eG");
        let canonical = CanonicalRecord::from_source("okpower", record.clone());

        assert!(!canonical.from_target);
        assert_eq!(canonical.sources.len(), 1);
        assert_eq!(canonical.sources.get("okpower"), Some(&record));
    }

    #[test]
    fn test_source_collection_replace_keeps_position() {
        let mut collection = SourceCollection::new("oekotest");
        collection.insert(NormalizedKey::from("a"), Record::new("A"));
        collection.insert(NormalizedKey::from("b"), Record::new("B"));
        let previous = collection.insert(NormalizedKey::from("a"), Record::new("A2"));

        assert_eq!(previous.map(|r| r.name), Some("A".to_string()));
        let names: Vec<&str> = collection.iter().map(|(_, r)| r.name.as_str()).collect();
        assert_eq!(names, vec!["A2", "B"]);
    }
}
