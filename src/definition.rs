//! Admin-owned checkpoint definitions: the template a [`crate::instance::CheckpointInstance`]
//! is created from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::field_schema::FieldSchema;

/// Opaque identity for a [`CheckpointDefinition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefinitionId(pub Uuid);

impl DefinitionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DefinitionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the three fixed interleaving points in the retrieval → generation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePosition {
    AfterRetrieval,
    AfterGeneration,
    PostGeneration,
}

/// The experimental condition of a task. New study arms can be introduced as
/// a `Custom` tag without a recompile; the four named arms are the ones the
/// built-in seeds reference. Serializes as the plain mode string in every
/// case, so the wire format never distinguishes a named arm from a custom one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskMode {
    Baseline,
    HitlR,
    HitlG,
    HitlFull,
    Custom(String),
}

impl TaskMode {
    pub fn as_str(&self) -> &str {
        match self {
            TaskMode::Baseline => "baseline",
            TaskMode::HitlR => "hitl_r",
            TaskMode::HitlG => "hitl_g",
            TaskMode::HitlFull => "hitl_full",
            TaskMode::Custom(s) => s.as_str(),
        }
    }
}

impl From<&str> for TaskMode {
    fn from(value: &str) -> Self {
        match value {
            "baseline" => TaskMode::Baseline,
            "hitl_r" => TaskMode::HitlR,
            "hitl_g" => TaskMode::HitlG,
            "hitl_full" => TaskMode::HitlFull,
            other => TaskMode::Custom(other.to_string()),
        }
    }
}

impl Serialize for TaskMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(TaskMode::from(s.as_str()))
    }
}

/// The wildcard mode tag meaning "any mode".
pub const ANY_MODE: &str = "*";

/// A definition's mode applicability set. `["*"]` matches every mode; `[]`
/// matches none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModeSet(pub Vec<String>);

impl ModeSet {
    pub fn matches(&self, mode: &TaskMode) -> bool {
        self.0.iter().any(|m| m == ANY_MODE || m == mode.as_str())
    }
}

/// Per-definition retry/timeout/circuit-breaker policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionPolicy {
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    pub max_retries: u32,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_window_minutes: u32,
}

/// Admin-owned template for a checkpoint kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointDefinition {
    pub id: DefinitionId,
    pub control_type: String,
    pub label: String,
    pub description: String,
    pub field_schema: FieldSchema,
    pub pipeline_position: PipelinePosition,
    pub sort_order: i64,
    pub applicable_modes: ModeSet,
    pub policy: DefinitionPolicy,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body for `POST /checkpoints/definitions`: a definition without `id` or timestamps.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDefinition {
    pub control_type: String,
    pub label: String,
    pub description: String,
    pub field_schema: FieldSchema,
    pub pipeline_position: PipelinePosition,
    pub sort_order: i64,
    pub applicable_modes: ModeSet,
    pub policy: DefinitionPolicy,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl NewDefinition {
    pub fn into_definition(self, now: DateTime<Utc>) -> CheckpointDefinition {
        CheckpointDefinition {
            id: DefinitionId::new(),
            control_type: self.control_type,
            label: self.label,
            description: self.description,
            field_schema: self.field_schema,
            pipeline_position: self.pipeline_position,
            sort_order: self.sort_order,
            applicable_modes: self.applicable_modes,
            policy: self.policy,
            enabled: self.enabled,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for `PUT /checkpoints/definitions/{id}`. `control_type`
/// cannot be changed through this path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefinitionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_schema: Option<FieldSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_position: Option<PipelinePosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicable_modes: Option<ModeSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<DefinitionPolicy>,
}

impl CheckpointDefinition {
    /// Apply a partial update in place, refreshing `updated_at`.
    pub fn apply_update(&mut self, update: DefinitionUpdate, now: DateTime<Utc>) {
        if let Some(label) = update.label {
            self.label = label;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(field_schema) = update.field_schema {
            self.field_schema = field_schema;
        }
        if let Some(pipeline_position) = update.pipeline_position {
            self.pipeline_position = pipeline_position;
        }
        if let Some(sort_order) = update.sort_order {
            self.sort_order = sort_order;
        }
        if let Some(applicable_modes) = update.applicable_modes {
            self.applicable_modes = applicable_modes;
        }
        if let Some(policy) = update.policy {
            self.policy = policy;
        }
        self.updated_at = now;
    }
}
