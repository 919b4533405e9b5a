// 📐 Shape Layer - Which sources exist and what their records look like
//
// One explicit registry, built once at startup. Every source file needs an
// entry here; the target source additionally gets the provenance map when
// the loader reads it as canonical records.

use crate::error::{ReconcileError, Result};
use crate::model::Record;
use std::collections::BTreeMap;

// ============================================================================
// SOURCE KIND
// ============================================================================

/// Sources the scrapers produce today
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Rowo 2019 list - the target that seeds the canonical registry
    Rowo2019,
    Oekotest,
    OkPower,
    Stromauskunft,
    Verivox,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Rowo2019,
        SourceKind::Oekotest,
        SourceKind::OkPower,
        SourceKind::Stromauskunft,
        SourceKind::Verivox,
    ];

    /// Identifier used in file names and the decision log
    pub fn id(&self) -> &'static str {
        match self {
            SourceKind::Rowo2019 => "rowo2019",
            SourceKind::Oekotest => "oekotest",
            SourceKind::OkPower => "okpower",
            SourceKind::Stromauskunft => "stromauskunft",
            SourceKind::Verivox => "verivox",
        }
    }

    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Rowo2019 => "Rowo 2019",
            SourceKind::Oekotest => "Öko-Test",
            SourceKind::OkPower => "ok-power",
            SourceKind::Stromauskunft => "Stromauskunft",
            SourceKind::Verivox => "Verivox",
        }
    }
}

// ============================================================================
// RECORD SHAPE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordShape {
    pub source: String,
    pub display_name: String,

    /// Fields every record of this source must carry besides `name`
    pub required_fields: Vec<String>,
}

impl RecordShape {
    pub fn new(source: impl Into<String>, display_name: impl Into<String>) -> Self {
        RecordShape {
            source: source.into(),
            display_name: display_name.into(),
            required_fields: Vec::new(),
        }
    }

    /// Builder: require a source-specific field
    pub fn with_required(mut self, field: impl Into<String>) -> Self {
        self.required_fields.push(field.into());
        self
    }

    /// Check a record against this shape
    pub fn validate(&self, record: &Record) -> Result<()> {
        let mut problems = Vec::new();

        if record.name.trim().is_empty() {
            problems.push("name: Required field is empty".to_string());
        }

        for field in &self.required_fields {
            if !record.fields.contains_key(field) {
                problems.push(format!("{}: Required field is missing", field));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::InvalidRecord {
                source_id: self.source.clone(),
                message: format!("'{}': {}", record.name, problems.join("; ")),
            })
        }
    }
}

// ============================================================================
// SHAPE REGISTRY
// ============================================================================

pub struct ShapeRegistry {
    shapes: BTreeMap<String, RecordShape>,
}

impl ShapeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        ShapeRegistry {
            shapes: BTreeMap::new(),
        }
    }

    /// Registry with every known source
    pub fn standard() -> Self {
        let mut registry = ShapeRegistry::new();
        for kind in SourceKind::ALL {
            registry.register(RecordShape::new(kind.id(), kind.name()));
        }
        registry
    }

    pub fn register(&mut self, shape: RecordShape) {
        self.shapes.insert(shape.source.clone(), shape);
    }

    /// Add a required field to an already registered source
    pub fn require_field(&mut self, source: &str, field: &str) -> Result<()> {
        let shape = self
            .shapes
            .get_mut(source)
            .ok_or_else(|| ReconcileError::UnknownSource(source.to_string()))?;
        shape.required_fields.push(field.to_string());
        Ok(())
    }

    pub fn shape_for(&self, source: &str) -> Result<&RecordShape> {
        self.shapes
            .get(source)
            .ok_or_else(|| ReconcileError::UnknownSource(source.to_string()))
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.shapes.keys().map(String::as_str)
    }
}

impl Default for ShapeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standard_shapes_carry_display_names() {
        let registry = ShapeRegistry::standard();
        assert_eq!(registry.shape_for("oekotest").unwrap().display_name, "Öko-Test");
        assert_eq!(registry.shape_for("rowo2019").unwrap().display_name, "Rowo 2019");
    }

    #[test]
    fn test_standard_registry_lists_all_sources() {
        let registry = ShapeRegistry::standard();
        let ids: Vec<&str> = registry.sources().collect();
        assert_eq!(ids, vec!["oekotest", "okpower", "rowo2019", "stromauskunft", "verivox"]);
    }

    #[test]
    fn test_require_field_on_registered_source() {
        let mut registry = ShapeRegistry::standard();
        registry.require_field("verivox", "tarif").unwrap();

        let shape = registry.shape_for("verivox").unwrap();
        assert_eq!(shape.required_fields, vec!["tarif".to_string()]);
        assert!(registry.require_field("tarifcheck", "tarif").is_err());
    }

    #[test]
    fn test_unknown_source_is_fatal() {
        let registry = ShapeRegistry::default();
        let err = registry.shape_for("tarifcheck").unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownSource(ref s) if s == "tarifcheck"));
    }

    #[test]
    fn test_validate_empty_name() {
        let shape = RecordShape::new("okpower", "ok-power");
        let err = shape.validate(&Record::new("   ")).unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_validate_accepts_any_postal_code_format() {
        let shape = RecordShape::new("verivox", "Verivox");
        assert!(shape.validate(&Record::new("Polarstern").with_plz("80331")).is_ok());
        assert!(shape.validate(&Record::new("Polarstern").with_plz("D-01067")).is_ok());
    }

    #[test]
    fn test_validate_required_field() {
        let shape = RecordShape::new("oekotest", "Öko-Test").with_required("bewertung");

        let missing = Record::new("Naturstrom");
        let present = Record::new("Naturstrom").with_field("bewertung", json!("sehr gut"));

        assert!(shape.validate(&missing).is_err());
        assert!(shape.validate(&present).is_ok());
    }
}
