//! End-to-end scenarios driven directly against the in-memory stores,
//! exercising resolver → lifecycle → failure-tracker wiring the way the
//! orchestrator would.

use std::collections::BTreeMap;

use checkpoint_engine::definition::{PipelinePosition, TaskMode};
use checkpoint_engine::instance::{InstanceState, TaskId};
use checkpoint_engine::lifecycle::LifecycleController;
use checkpoint_engine::orchestrator::OrchestratorAdapter;
use checkpoint_engine::seeder::seed_builtins;
use checkpoint_engine::store::{
    DefinitionStore, InMemoryDefinitionStore, InMemoryInstanceStore, InstanceStore,
};
use serde_json::{Value, json};

#[tokio::test]
async fn s1_happy_path_hitl_full_mode() {
    let defs = InMemoryDefinitionStore::new();
    let insts = InMemoryInstanceStore::new();
    seed_builtins(&defs).await.unwrap();

    let adapter = OrchestratorAdapter::new(&defs, &insts);
    let controller = LifecycleController::new(&defs, &insts);
    let task = TaskId::from("t1");
    let mode = TaskMode::HitlFull;

    let retrieval = adapter
        .resolve(&task, PipelinePosition::AfterRetrieval, &mode, Value::Null)
        .await
        .unwrap();
    assert_eq!(retrieval.len(), 1);
    assert_eq!(retrieval[0].control_type, "chunk_selector");

    let mut submission = BTreeMap::new();
    submission.insert(
        "selected_node_ids".to_string(),
        json!(["n1", "n2"]),
    );
    let submitted = controller.submit(retrieval[0].id, submission).await.unwrap();
    assert_eq!(submitted.state, InstanceState::Submitted);

    let generation = adapter
        .resolve(&task, PipelinePosition::AfterGeneration, &mode, Value::Null)
        .await
        .unwrap();
    assert_eq!(generation[0].control_type, "summary_editor");
    let mut submission = BTreeMap::new();
    submission.insert("edited_text".to_string(), json!("Final text."));
    controller.submit(generation[0].id, submission).await.unwrap();

    let post = adapter
        .resolve(&task, PipelinePosition::PostGeneration, &mode, Value::Null)
        .await
        .unwrap();
    assert_eq!(post[0].control_type, "questionnaire");
    let mut submission = BTreeMap::new();
    submission.insert("confidence".to_string(), json!("4"));
    submission.insert("citation_helpfulness".to_string(), json!("yes"));
    let final_submission = controller.submit(post[0].id, submission).await.unwrap();
    assert_eq!(final_submission.state, InstanceState::Submitted);
}

#[tokio::test]
async fn s2_validation_failure_does_not_burn_a_retry() {
    use checkpoint_engine::definition::{DefinitionPolicy, ModeSet, NewDefinition};
    use checkpoint_engine::field_schema::{FieldDescriptor, FieldSchema, FieldType};

    let defs = InMemoryDefinitionStore::new();
    let insts = InMemoryInstanceStore::new();
    defs.create(NewDefinition {
        control_type: "notes_form".to_string(),
        label: "Notes".to_string(),
        description: String::new(),
        field_schema: FieldSchema::new(vec![FieldDescriptor {
            key: "notes".to_string(),
            field_type: FieldType::Textarea,
            label: "Notes".to_string(),
            required: true,
            placeholder: None,
            options: None,
            min: None,
            max: None,
            default: None,
        }]),
        pipeline_position: PipelinePosition::PostGeneration,
        sort_order: 0,
        applicable_modes: ModeSet(vec!["*".to_string()]),
        policy: DefinitionPolicy {
            required: false,
            timeout_seconds: None,
            max_retries: 2,
            circuit_breaker_threshold: 5,
            circuit_breaker_window_minutes: 60,
        },
        enabled: true,
    })
    .await
    .unwrap();

    let adapter = OrchestratorAdapter::new(&defs, &insts);
    let controller = LifecycleController::new(&defs, &insts);
    let task = TaskId::from("t2");
    let resolved = adapter
        .resolve(
            &task,
            PipelinePosition::PostGeneration,
            &TaskMode::Baseline,
            Value::Null,
        )
        .await
        .unwrap();
    let instance_id = resolved[0].id;

    let mut empty = BTreeMap::new();
    empty.insert("notes".to_string(), json!(""));
    let err = controller.submit(instance_id, empty).await.unwrap_err();
    let issues = match err {
        checkpoint_engine::error::LifecycleError::ValidationFailure {
            issues,
            attempt_count,
            ..
        } => {
            assert_eq!(attempt_count, 0);
            issues
        }
        other => panic!("expected ValidationFailure, got {other:?}"),
    };
    assert_eq!(issues[0].key, "notes");

    let mut fixed = BTreeMap::new();
    fixed.insert("notes".to_string(), json!("hi"));
    let submitted = controller.submit(instance_id, fixed).await.unwrap();
    assert_eq!(submitted.state, InstanceState::Submitted);
    assert_eq!(submitted.attempt_count, 0);
}

#[tokio::test]
async fn s3_nonapplicable_mode_resolves_empty() {
    let defs = InMemoryDefinitionStore::new();
    let insts = InMemoryInstanceStore::new();
    seed_builtins(&defs).await.unwrap();

    let adapter = OrchestratorAdapter::new(&defs, &insts);
    let resolved = adapter
        .resolve(
            &TaskId::from("t3"),
            PipelinePosition::AfterRetrieval,
            &TaskMode::Baseline,
            Value::Null,
        )
        .await
        .unwrap();
    assert!(resolved.is_empty());
}

#[tokio::test]
async fn s4_skip_forbidden_on_required_checkpoint() {
    let defs = InMemoryDefinitionStore::new();
    let insts = InMemoryInstanceStore::new();
    seed_builtins(&defs).await.unwrap();

    let adapter = OrchestratorAdapter::new(&defs, &insts);
    let controller = LifecycleController::new(&defs, &insts);
    let resolved = adapter
        .resolve(
            &TaskId::from("t4"),
            PipelinePosition::AfterRetrieval,
            &TaskMode::HitlR,
            Value::Null,
        )
        .await
        .unwrap();
    let err = controller.skip(resolved[0].id).await.unwrap_err();
    assert!(matches!(
        err,
        checkpoint_engine::error::LifecycleError::SkipNotAllowed
    ));
    let reloaded = insts.get(resolved[0].id).await.unwrap();
    assert_eq!(reloaded.state, InstanceState::Offered);
}

#[tokio::test]
async fn s5_circuit_breaker_trips_after_threshold_failures() {
    use checkpoint_engine::definition::{DefinitionPolicy, ModeSet, NewDefinition};
    use checkpoint_engine::field_schema::FieldSchema;

    let defs = InMemoryDefinitionStore::new();
    let insts = InMemoryInstanceStore::new();
    let definition = defs
        .create(NewDefinition {
            control_type: "flaky_control".to_string(),
            label: "Flaky Control".to_string(),
            description: String::new(),
            field_schema: FieldSchema::default(),
            pipeline_position: PipelinePosition::AfterRetrieval,
            sort_order: 0,
            applicable_modes: ModeSet(vec!["*".to_string()]),
            policy: DefinitionPolicy {
                required: false,
                timeout_seconds: Some(30),
                max_retries: 0,
                circuit_breaker_threshold: 3,
                circuit_breaker_window_minutes: 60,
            },
            enabled: true,
        })
        .await
        .unwrap();

    let adapter = OrchestratorAdapter::new(&defs, &insts);
    let controller = LifecycleController::new(&defs, &insts);

    for n in 0..3 {
        let task = TaskId::from(format!("task-{n}").as_str());
        let resolved = adapter
            .resolve(&task, PipelinePosition::AfterRetrieval, &TaskMode::Baseline, Value::Null)
            .await
            .unwrap();
        controller.timeout(resolved[0].id).await.unwrap();
        if n < 2 {
            // breaker has not yet tripped; definition remains visible
            assert!(defs.get_by_id(definition.id).await.unwrap().enabled);
        }
    }

    // The third timeout trips the breaker, which force-disables the
    // definition outright rather than merely hiding it from this resolve.
    assert!(!defs.get_by_id(definition.id).await.unwrap().enabled);

    let resolved = adapter
        .resolve(
            &TaskId::from("task-4"),
            PipelinePosition::AfterRetrieval,
            &TaskMode::Baseline,
            Value::Null,
        )
        .await
        .unwrap();
    assert!(resolved.is_empty());
}

#[tokio::test]
async fn s6_timeout_then_skip_on_optional_checkpoint() {
    let defs = InMemoryDefinitionStore::new();
    let insts = InMemoryInstanceStore::new();
    seed_builtins(&defs).await.unwrap();

    let adapter = OrchestratorAdapter::new(&defs, &insts);
    let controller = LifecycleController::new(&defs, &insts);
    let resolved = adapter
        .resolve(
            &TaskId::from("t6"),
            PipelinePosition::PostGeneration,
            &TaskMode::HitlFull,
            Value::Null,
        )
        .await
        .unwrap();
    let instance_id = resolved[0].id;

    let timed_out = controller.timeout(instance_id).await.unwrap();
    assert_eq!(timed_out.state, InstanceState::TimedOut);
    assert_eq!(timed_out.attempt_count, 1);

    let skipped = controller.skip(instance_id).await.unwrap();
    assert_eq!(skipped.state, InstanceState::Skipped);
}
