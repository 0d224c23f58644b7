//! Declarative descriptors for checkpoint input forms.
//!
//! A [`FieldSchema`] is pure data: an ordered list of [`FieldDescriptor`]s that
//! describe what a checkpoint's submission form looks like. The engine never
//! interprets field semantics beyond what [`crate::validator`] checks against
//! this schema — rendering is the UI's job.

use serde::{Deserialize, Serialize};

/// The kind of input a field renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Textarea,
    Select,
    MultiSelect,
    Radio,
    Checkbox,
    Chips,
    Number,
    Range,
}

impl FieldType {
    /// Whether this field kind is rendered from an enumerated `options` list.
    pub fn is_enumerated(self) -> bool {
        matches!(
            self,
            FieldType::Select | FieldType::Radio | FieldType::MultiSelect | FieldType::Chips
        )
    }

    /// Whether `options` is required (as opposed to merely allowed) for this kind.
    pub fn requires_options(self) -> bool {
        matches!(self, FieldType::Select | FieldType::Radio)
    }

    /// Whether `min`/`max` bounds are meaningful for this kind.
    pub fn is_bounded(self) -> bool {
        matches!(self, FieldType::Number | FieldType::Range)
    }

    /// Whether submitted values for this kind are lists rather than scalars.
    pub fn is_multi_valued(self) -> bool {
        matches!(self, FieldType::MultiSelect | FieldType::Chips)
    }
}

/// A single `{value, label}` choice for enumerated field types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    pub value: String,
    pub label: String,
}

/// Descriptor for one field in a checkpoint's submission form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Unique within the owning schema; matches submission keys.
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FieldOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl FieldDescriptor {
    /// Look up an option by its `value`, if `options` is declared.
    pub fn find_option(&self, value: &str) -> Option<&FieldOption> {
        self.options
            .as_ref()
            .and_then(|opts| opts.iter().find(|o| o.value == value))
    }
}

/// An ordered list of field descriptors: a checkpoint's full submission form.
///
/// Ordering is preserved end-to-end (definition → frozen instance copy → UI
/// rendering) since admins rely on declaration order for form layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema(pub Vec<FieldDescriptor>);

/// A structural problem with a [`FieldSchema`] itself — not a submitted
/// value, which is [`crate::validator::ValidationIssue`]'s job. Caught once
/// at definition create/update time so the validator can assume a
/// well-formed schema and never has to re-check these.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaIssue {
    pub key: String,
    pub message: String,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&FieldDescriptor> {
        self.0.iter().find(|f| f.key == key)
    }

    /// Reject duplicate keys, `select`/`radio` fields with no (or an empty)
    /// `options` list, and inverted `min > max` bounds.
    pub fn check_well_formed(&self) -> Result<(), Vec<SchemaIssue>> {
        let mut issues = Vec::new();
        let mut seen_keys = std::collections::HashSet::new();

        for field in &self.0 {
            if !seen_keys.insert(field.key.as_str()) {
                issues.push(SchemaIssue {
                    key: field.key.clone(),
                    message: "duplicate field key".to_string(),
                });
            }
            if field.field_type.requires_options()
                && field.options.as_ref().is_none_or(|opts| opts.is_empty())
            {
                issues.push(SchemaIssue {
                    key: field.key.clone(),
                    message: "select/radio fields require a non-empty options list".to_string(),
                });
            }
            if let (Some(min), Some(max)) = (field.min, field.max) {
                if min > max {
                    issues.push(SchemaIssue {
                        key: field.key.clone(),
                        message: "min must not exceed max".to_string(),
                    });
                }
            }
        }

        if issues.is_empty() { Ok(()) } else { Err(issues) }
    }
}

/// Static catalog entry describing a supported field kind, for the
/// `GET /checkpoints/field-types` admin endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct FieldTypeCatalogEntry {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub description: &'static str,
    pub supports_options: bool,
    pub supports_bounds: bool,
    pub multi_valued: bool,
}

/// The closed set of field kinds the engine understands, with operator-facing
/// descriptions. This is code-level data, not an admin-extensible table: new
/// kinds require a new [`FieldType`] variant and validator branch.
pub fn field_type_catalog() -> Vec<FieldTypeCatalogEntry> {
    use FieldType::*;
    [
        (Text, "Single-line free text"),
        (Textarea, "Multi-line free text"),
        (Select, "Single choice from a fixed option list"),
        (MultiSelect, "Multiple choices from an option list, or free tags"),
        (Radio, "Single choice rendered as radio buttons"),
        (Checkbox, "Boolean toggle"),
        (Chips, "Free-form or enumerated tags rendered as chips"),
        (Number, "Numeric value, optionally bounded"),
        (Range, "Numeric value on a slider, optionally bounded"),
    ]
    .into_iter()
    .map(|(field_type, description)| FieldTypeCatalogEntry {
        field_type,
        description,
        supports_options: field_type.is_enumerated(),
        supports_bounds: field_type.is_bounded(),
        multi_valued: field_type.is_multi_valued(),
    })
    .collect()
}
