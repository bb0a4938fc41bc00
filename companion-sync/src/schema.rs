//! Schema drift detection
//!
//! Advisory only: the validator samples incoming rows, infers their shape and
//! compares it with what a transformer expects. It never mutates data and
//! never blocks a sync; the per-field fallback rules are what keep records
//! usable when the server schema moves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Default number of rows inspected per table.
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// JSON type of an observed field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl FieldKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => FieldKind::Null,
            Value::Bool(_) => FieldKind::Bool,
            Value::Number(_) => FieldKind::Number,
            Value::String(_) => FieldKind::String,
            Value::Array(_) => FieldKind::Array,
            Value::Object(_) => FieldKind::Object,
        }
    }
}

/// What the sample showed for one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldObservation {
    pub kinds: BTreeSet<FieldKind>,
    /// Number of sampled rows carrying the field at all.
    pub present: usize,
}

/// Inferred shape of a batch of raw rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDescriptor {
    pub sample_size: usize,
    pub fields: BTreeMap<String, FieldObservation>,
}

impl SchemaDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldObservation> {
        self.fields.get(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// The shape a transformer was written against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedShape {
    fields: Vec<FieldSpec>,
}

impl ExpectedShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec { name, kind, required: true });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec { name, kind, required: false });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|spec| spec.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "drift", rename_all = "snake_case")]
pub enum DriftKind {
    /// A required field is absent from every sampled row.
    Missing,
    /// The field is present but carries a different JSON type.
    TypeMismatch {
        expected: FieldKind,
        observed: Vec<FieldKind>,
    },
    /// A field the transformer does not know about.
    Unexpected { observed: Vec<FieldKind> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDrift {
    pub field: String,
    #[serde(flatten)]
    pub kind: DriftKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub compatible: bool,
    pub drift: Vec<FieldDrift>,
}

impl ValidationReport {
    /// Drift entries that break compatibility, excluding unknown extra fields.
    pub fn breaking(&self) -> impl Iterator<Item = &FieldDrift> {
        self.drift
            .iter()
            .filter(|d| !matches!(d.kind, DriftKind::Unexpected { .. }))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SchemaValidator {
    sample_size: usize,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_SIZE)
    }
}

impl SchemaValidator {
    pub fn new(sample_size: usize) -> Self {
        Self { sample_size: sample_size.max(1) }
    }

    /// Infer field kinds from the first `sample_size` object rows.
    pub fn infer(&self, rows: &[Value]) -> SchemaDescriptor {
        let mut descriptor = SchemaDescriptor::default();

        for row in rows.iter().filter_map(Value::as_object).take(self.sample_size) {
            descriptor.sample_size += 1;
            for (name, value) in row {
                let observation = descriptor.fields.entry(name.clone()).or_default();
                observation.kinds.insert(FieldKind::of(value));
                observation.present += 1;
            }
        }

        descriptor
    }

    pub fn validate(&self, descriptor: &SchemaDescriptor, expected: &ExpectedShape) -> ValidationReport {
        if descriptor.sample_size == 0 {
            return ValidationReport { compatible: true, drift: Vec::new() };
        }

        let mut drift = Vec::new();

        for spec in expected.fields() {
            match descriptor.field(spec.name) {
                None if spec.required => drift.push(FieldDrift {
                    field: spec.name.to_string(),
                    kind: DriftKind::Missing,
                }),
                None => {}
                Some(observation) => {
                    let observed: Vec<FieldKind> = observation
                        .kinds
                        .iter()
                        .copied()
                        .filter(|kind| *kind != FieldKind::Null)
                        .collect();
                    if observed.iter().any(|kind| *kind != spec.kind) {
                        drift.push(FieldDrift {
                            field: spec.name.to_string(),
                            kind: DriftKind::TypeMismatch { expected: spec.kind, observed },
                        });
                    }
                }
            }
        }

        for (name, observation) in &descriptor.fields {
            if !expected.contains(name) {
                drift.push(FieldDrift {
                    field: name.clone(),
                    kind: DriftKind::Unexpected {
                        observed: observation.kinds.iter().copied().collect(),
                    },
                });
            }
        }

        let compatible = !drift
            .iter()
            .any(|d| !matches!(d.kind, DriftKind::Unexpected { .. }));

        ValidationReport { compatible, drift }
    }

    pub fn check(&self, rows: &[Value], expected: &ExpectedShape) -> ValidationReport {
        self.validate(&self.infer(rows), expected)
    }
}
