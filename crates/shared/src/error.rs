use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::FlowId;

/// Where a diagnostic is rendered: catalog failures replace the whole content
/// area, flow failures replace only the flow view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "flow_id", rename_all = "snake_case")]
pub enum DiagnosticScope {
    Catalog,
    Flow(FlowId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub scope: DiagnosticScope,
    pub title: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(scope: DiagnosticScope, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            scope,
            title: title.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("failed to load flow catalog: {0}")]
    CatalogLoad(String),
    #[error("flow '{0}' not found in catalog")]
    FlowNotFound(FlowId),
    #[error("failed to load flow '{id}': {reason}")]
    FlowLoad { id: FlowId, reason: String },
    #[error("stored progress under '{key}' is unreadable: {reason}")]
    StorageRead { key: String, reason: String },
}

impl ViewerError {
    pub fn flow_load(id: &FlowId, reason: impl Into<String>) -> Self {
        Self::FlowLoad {
            id: id.clone(),
            reason: reason.into(),
        }
    }

    /// Human-readable diagnostic for the boundary that initiated the load.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ViewerError::CatalogLoad(reason) => Diagnostic::new(
                DiagnosticScope::Catalog,
                "Could not load the flow catalog",
                format!(
                    "{reason}. Verify that flows/index.json is hosted next to the viewer and contains a JSON array."
                ),
            ),
            ViewerError::FlowNotFound(id) => Diagnostic::new(
                DiagnosticScope::Flow(id.clone()),
                "Flow not found",
                format!("No flow with id '{id}' exists in the catalog."),
            ),
            ViewerError::FlowLoad { id, reason } => Diagnostic::new(
                DiagnosticScope::Flow(id.clone()),
                "Could not load flow",
                format!("Loading flows/{id}.json failed: {reason}"),
            ),
            ViewerError::StorageRead { key, reason } => Diagnostic::new(
                DiagnosticScope::Catalog,
                "Stored progress is unreadable",
                format!("{key}: {reason}"),
            ),
        }
    }
}

impl From<ViewerError> for Diagnostic {
    fn from(value: ViewerError) -> Self {
        value.to_diagnostic()
    }
}
