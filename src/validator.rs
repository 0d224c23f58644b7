//! Pure validation of a submission map against a frozen [`FieldSchema`].
//!
//! No I/O, no clock reads: given the same schema and submission, the result
//! is always the same. Validation order follows the field declaration order
//! within the schema, and within a field, the rules described in the
//! field-schema design (unknown keys dropped, then required, then type
//! coercion, then defaults).

use std::collections::BTreeMap;

use serde_json::Value;

use crate::field_schema::{FieldDescriptor, FieldSchema, FieldType};

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ValidationIssue {
    pub key: String,
    pub message: String,
}

impl ValidationIssue {
    fn required(key: &str) -> Self {
        Self {
            key: key.to_string(),
            message: "This field is required.".to_string(),
        }
    }

    fn invalid_type(key: &str, expected: &str) -> Self {
        Self {
            key: key.to_string(),
            message: format!("Expected {expected}."),
        }
    }

    fn invalid_option(key: &str) -> Self {
        Self {
            key: key.to_string(),
            message: "Value is not one of the allowed options.".to_string(),
        }
    }

    fn out_of_bounds(key: &str) -> Self {
        Self {
            key: key.to_string(),
            message: "Value is outside the allowed range.".to_string(),
        }
    }
}

/// A submission that passed validation: an ordered, normalized map ready to
/// be stored as an instance's `submit_result`.
pub type NormalizedSubmission = BTreeMap<String, Value>;

/// Validate `submission` against `schema`, returning either the normalized
/// data or the ordered list of issues that blocked it.
pub fn validate(
    schema: &FieldSchema,
    submission: &BTreeMap<String, Value>,
) -> Result<NormalizedSubmission, Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    let mut normalized = NormalizedSubmission::new();

    for field in schema.fields() {
        match validate_field(field, submission.get(&field.key)) {
            Ok(Some(value)) => {
                normalized.insert(field.key.clone(), value);
            }
            Ok(None) => {}
            Err(issue) => issues.push(issue),
        }
    }

    if issues.is_empty() {
        Ok(normalized)
    } else {
        Err(issues)
    }
}

/// Validate and normalize a single field's value. `Ok(None)` means the field
/// is legitimately absent from the result (non-required, no value, no default).
fn validate_field(
    field: &FieldDescriptor,
    raw: Option<&Value>,
) -> Result<Option<Value>, ValidationIssue> {
    let present = is_present(field.field_type, raw);

    if field.required {
        if !present {
            return Err(ValidationIssue::required(&field.key));
        }
        return coerce(field, raw.expect("present implies Some")).map(Some);
    }

    if !present {
        if field.field_type == FieldType::Checkbox {
            // Absence of an optional checkbox means "unchecked".
            return Ok(Some(Value::Bool(false)));
        }
        return Ok(field.default.clone());
    }

    coerce(field, raw.expect("present implies Some")).map(Some)
}

/// "Present" per the field-schema design: not absent, not empty string, not
/// empty array, not only-whitespace for string types.
fn is_present(field_type: FieldType, raw: Option<&Value>) -> bool {
    match raw {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => {
            if matches!(field_type, FieldType::Text | FieldType::Textarea) {
                !s.trim().is_empty()
            } else {
                !s.is_empty()
            }
        }
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

fn coerce(field: &FieldDescriptor, raw: &Value) -> Result<Value, ValidationIssue> {
    match field.field_type {
        FieldType::Text | FieldType::Textarea => match raw {
            Value::String(s) => Ok(Value::String(s.clone())),
            _ => Err(ValidationIssue::invalid_type(&field.key, "a string")),
        },
        FieldType::Select | FieldType::Radio => match raw {
            Value::String(s) => {
                if field.find_option(s).is_some() {
                    Ok(Value::String(s.clone()))
                } else {
                    Err(ValidationIssue::invalid_option(&field.key))
                }
            }
            _ => Err(ValidationIssue::invalid_type(&field.key, "a string")),
        },
        FieldType::MultiSelect | FieldType::Chips => match raw {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => {
                            if field.options.is_some() && field.find_option(s).is_none() {
                                return Err(ValidationIssue::invalid_option(&field.key));
                            }
                            out.push(Value::String(s.clone()));
                        }
                        _ => return Err(ValidationIssue::invalid_type(&field.key, "a string")),
                    }
                }
                Ok(Value::Array(out))
            }
            _ => Err(ValidationIssue::invalid_type(&field.key, "a list of strings")),
        },
        FieldType::Checkbox => match raw {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            _ => Err(ValidationIssue::invalid_type(&field.key, "a boolean")),
        },
        FieldType::Number | FieldType::Range => match raw.as_f64() {
            Some(n) if n.is_finite() => {
                if field.min.is_some_and(|min| n < min) || field.max.is_some_and(|max| n > max) {
                    Err(ValidationIssue::out_of_bounds(&field.key))
                } else {
                    Ok(raw.clone())
                }
            }
            _ => Err(ValidationIssue::invalid_type(&field.key, "a finite number")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_schema::FieldOption;
    use serde_json::json;

    fn field(key: &str, field_type: FieldType, required: bool) -> FieldDescriptor {
        FieldDescriptor {
            key: key.into(),
            field_type,
            label: key.into(),
            required,
            placeholder: None,
            options: None,
            min: None,
            max: None,
            default: None,
        }
    }

    #[test]
    fn required_textarea_rejects_whitespace_only() {
        let schema = FieldSchema::new(vec![field("notes", FieldType::Textarea, true)]);
        let mut submission = BTreeMap::new();
        submission.insert("notes".to_string(), json!("   "));
        let issues = validate(&schema, &submission).unwrap_err();
        assert_eq!(issues, vec![ValidationIssue::required("notes")]);
    }

    #[test]
    fn numeric_coercion_of_text_field_is_rejected() {
        let schema = FieldSchema::new(vec![field("notes", FieldType::Text, true)]);
        let mut submission = BTreeMap::new();
        submission.insert("notes".to_string(), json!(42));
        let issues = validate(&schema, &submission).unwrap_err();
        assert_eq!(issues[0].key, "notes");
    }

    #[test]
    fn select_must_match_declared_option() {
        let mut f = field("confidence", FieldType::Select, true);
        f.options = Some(vec![FieldOption {
            value: "4".into(),
            label: "4".into(),
        }]);
        let schema = FieldSchema::new(vec![f]);
        let mut submission = BTreeMap::new();
        submission.insert("confidence".to_string(), json!("9"));
        let issues = validate(&schema, &submission).unwrap_err();
        assert_eq!(issues[0].key, "confidence");
    }

    #[test]
    fn unknown_keys_are_dropped_silently() {
        let schema = FieldSchema::new(vec![field("notes", FieldType::Text, false)]);
        let mut submission = BTreeMap::new();
        submission.insert("notes".to_string(), json!("hi"));
        submission.insert("extra_ui_field".to_string(), json!("ignored"));
        let normalized = validate(&schema, &submission).unwrap();
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized.get("notes"), Some(&json!("hi")));
    }

    #[test]
    fn absent_non_required_checkbox_defaults_false() {
        let schema = FieldSchema::new(vec![field("agree", FieldType::Checkbox, false)]);
        let submission = BTreeMap::new();
        let normalized = validate(&schema, &submission).unwrap();
        assert_eq!(normalized.get("agree"), Some(&json!(false)));
    }

    #[test]
    fn default_applied_only_to_non_required_absent_field() {
        let mut f = field("priority", FieldType::Number, false);
        f.default = Some(json!(3));
        let schema = FieldSchema::new(vec![f]);
        let submission = BTreeMap::new();
        let normalized = validate(&schema, &submission).unwrap();
        assert_eq!(normalized.get("priority"), Some(&json!(3)));
    }

    #[test]
    fn number_bounds_are_inclusive() {
        let mut f = field("confidence", FieldType::Number, true);
        f.min = Some(1.0);
        f.max = Some(5.0);
        let schema = FieldSchema::new(vec![f]);

        let mut ok = BTreeMap::new();
        ok.insert("confidence".to_string(), json!(5));
        assert!(validate(&schema, &ok).is_ok());

        let mut bad = BTreeMap::new();
        bad.insert("confidence".to_string(), json!(5.01));
        assert!(validate(&schema, &bad).is_err());
    }

    #[test]
    fn multi_select_allows_free_tags_without_options() {
        let schema = FieldSchema::new(vec![field("tags", FieldType::Chips, false)]);
        let mut submission = BTreeMap::new();
        submission.insert("tags".to_string(), json!(["anything", "goes"]));
        assert!(validate(&schema, &submission).is_ok());
    }
}
