//! Shared application state handed to every Axum handler.

use std::sync::Arc;

use crate::store::{DefinitionStore, InstanceStore};

#[derive(Clone)]
pub struct AppState {
    pub definitions: Arc<dyn DefinitionStore>,
    pub instances: Arc<dyn InstanceStore>,
}

impl AppState {
    pub fn new(definitions: Arc<dyn DefinitionStore>, instances: Arc<dyn InstanceStore>) -> Self {
        Self {
            definitions,
            instances,
        }
    }
}
