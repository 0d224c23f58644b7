//! Checkpoint pipeline engine: a definition registry, a per-task instance
//! state machine, a resolver, and circuit breakers for a human-in-the-loop
//! retrieval-and-summarization workflow. See `http` for the transport layer
//! and `orchestrator` for the facade the chat pipeline is expected to use.

pub mod config;
pub mod definition;
pub mod error;
pub mod failure_tracker;
pub mod field_schema;
pub mod http;
pub mod instance;
pub mod lifecycle;
pub mod orchestrator;
pub mod resolver;
pub mod seeder;
pub mod store;
pub mod telemetry;
pub mod validator;
