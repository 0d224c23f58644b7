//! Idempotent seeding of the three built-in checkpoint definitions.
//!
//! Runs at bootstrap (see [`crate::config::EngineConfig`]); safe to call on
//! every process start since it only inserts a built-in when no definition
//! with its `control_type` already exists.

use crate::definition::{DefinitionPolicy, ModeSet, NewDefinition, PipelinePosition};
use crate::error::StoreResult;
use crate::field_schema::{FieldDescriptor, FieldOption, FieldSchema, FieldType};
use crate::store::DefinitionStore;

fn chunk_selector() -> NewDefinition {
    NewDefinition {
        control_type: "chunk_selector".to_string(),
        label: "Chunk Selector".to_string(),
        description: "Choose which retrieved passages should feed generation.".to_string(),
        field_schema: FieldSchema::new(vec![FieldDescriptor {
            key: "selected_node_ids".to_string(),
            field_type: FieldType::MultiSelect,
            label: "Relevant passages".to_string(),
            required: true,
            placeholder: None,
            options: None,
            min: None,
            max: None,
            default: None,
        }]),
        pipeline_position: PipelinePosition::AfterRetrieval,
        sort_order: 0,
        applicable_modes: ModeSet(vec!["hitl_r".to_string(), "hitl_full".to_string()]),
        policy: DefinitionPolicy {
            required: true,
            timeout_seconds: Some(600),
            max_retries: 2,
            circuit_breaker_threshold: 5,
            circuit_breaker_window_minutes: 60,
        },
        enabled: true,
    }
}

fn summary_editor() -> NewDefinition {
    NewDefinition {
        control_type: "summary_editor".to_string(),
        label: "Summary Editor".to_string(),
        description: "Edit the generated summary before it is finalized.".to_string(),
        field_schema: FieldSchema::new(vec![FieldDescriptor {
            key: "edited_text".to_string(),
            field_type: FieldType::Textarea,
            label: "Edited summary".to_string(),
            required: true,
            placeholder: Some("Revise the draft summary...".to_string()),
            options: None,
            min: None,
            max: None,
            default: None,
        }]),
        pipeline_position: PipelinePosition::AfterGeneration,
        sort_order: 0,
        applicable_modes: ModeSet(vec!["hitl_g".to_string(), "hitl_full".to_string()]),
        policy: DefinitionPolicy {
            required: true,
            timeout_seconds: Some(900),
            max_retries: 2,
            circuit_breaker_threshold: 5,
            circuit_breaker_window_minutes: 60,
        },
        enabled: true,
    }
}

fn questionnaire() -> NewDefinition {
    NewDefinition {
        control_type: "questionnaire".to_string(),
        label: "Post-Generation Questionnaire".to_string(),
        description: "Rate confidence and citation helpfulness for the finalized answer."
            .to_string(),
        field_schema: FieldSchema::new(vec![
            FieldDescriptor {
                key: "confidence".to_string(),
                field_type: FieldType::Select,
                label: "How confident are you in this answer?".to_string(),
                required: true,
                placeholder: None,
                options: Some(
                    (1..=5)
                        .map(|n| FieldOption {
                            value: n.to_string(),
                            label: n.to_string(),
                        })
                        .collect(),
                ),
                min: Some(1.0),
                max: Some(5.0),
                default: None,
            },
            FieldDescriptor {
                key: "citation_helpfulness".to_string(),
                field_type: FieldType::Radio,
                label: "Were the citations helpful?".to_string(),
                required: true,
                placeholder: None,
                options: Some(vec![
                    FieldOption {
                        value: "yes".to_string(),
                        label: "Yes".to_string(),
                    },
                    FieldOption {
                        value: "no".to_string(),
                        label: "No".to_string(),
                    },
                    FieldOption {
                        value: "unsure".to_string(),
                        label: "Unsure".to_string(),
                    },
                ]),
                min: None,
                max: None,
                default: None,
            },
            FieldDescriptor {
                key: "comments".to_string(),
                field_type: FieldType::Textarea,
                label: "Additional comments".to_string(),
                required: false,
                placeholder: Some("Optional".to_string()),
                options: None,
                min: None,
                max: None,
                default: None,
            },
        ]),
        pipeline_position: PipelinePosition::PostGeneration,
        sort_order: 0,
        applicable_modes: ModeSet(vec!["*".to_string()]),
        policy: DefinitionPolicy {
            required: false,
            timeout_seconds: None,
            max_retries: 1,
            circuit_breaker_threshold: 5,
            circuit_breaker_window_minutes: 60,
        },
        enabled: true,
    }
}

/// Insert each built-in definition that is missing by `control_type`.
/// Existing definitions (including ones an admin has edited) are left
/// untouched — seeding never overwrites.
#[tracing::instrument(skip(store))]
pub async fn seed_builtins(store: &dyn DefinitionStore) -> StoreResult<()> {
    for new_definition in [chunk_selector(), summary_editor(), questionnaire()] {
        if store
            .get_by_control_type(&new_definition.control_type)
            .await?
            .is_some()
        {
            tracing::debug!(control_type = %new_definition.control_type, "built-in already seeded");
            continue;
        }
        let control_type = new_definition.control_type.clone();
        store.create(new_definition).await?;
        tracing::info!(control_type = %control_type, "seeded built-in checkpoint definition");
    }
    Ok(())
}
