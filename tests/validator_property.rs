//! Property coverage for the field validator's numeric bounds and the
//! required-field contract, generated rather than enumerated by hand.

#[macro_use]
extern crate proptest;

use std::collections::BTreeMap;

use checkpoint_engine::field_schema::{FieldDescriptor, FieldSchema, FieldType};
use checkpoint_engine::validator::validate;
use proptest::prelude::*;
use serde_json::json;

fn number_field(min: f64, max: f64) -> FieldDescriptor {
    FieldDescriptor {
        key: "confidence".into(),
        field_type: FieldType::Number,
        label: "Confidence".into(),
        required: true,
        placeholder: None,
        options: None,
        min: Some(min),
        max: Some(max),
        default: None,
    }
}

proptest! {
    #[test]
    fn in_bounds_numbers_always_validate(n in -100.0f64..100.0) {
        let schema = FieldSchema::new(vec![number_field(-100.0, 100.0)]);
        let mut submission = BTreeMap::new();
        submission.insert("confidence".to_string(), json!(n));
        prop_assert!(validate(&schema, &submission).is_ok());
    }

    #[test]
    fn numbers_outside_the_declared_range_always_reject(n in 100.001f64..1000.0) {
        let schema = FieldSchema::new(vec![number_field(-100.0, 100.0)]);
        let mut submission = BTreeMap::new();
        submission.insert("confidence".to_string(), json!(n));
        let issues = validate(&schema, &submission).unwrap_err();
        prop_assert_eq!(issues.len(), 1);
        prop_assert_eq!(issues[0].key.as_str(), "confidence");
    }

    #[test]
    fn a_required_field_absent_from_an_arbitrary_submission_always_reports_one_issue(
        extra_keys in prop::collection::vec("[a-z]{1,8}", 0..5),
    ) {
        let schema = FieldSchema::new(vec![number_field(-100.0, 100.0)]);
        let mut submission = BTreeMap::new();
        for key in extra_keys {
            if key != "confidence" {
                submission.insert(key, json!("noise"));
            }
        }
        let issues = validate(&schema, &submission).unwrap_err();
        prop_assert_eq!(issues.len(), 1);
        prop_assert_eq!(issues[0].key.as_str(), "confidence");
    }
}
