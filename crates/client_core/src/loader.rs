//! Catalog and flow loaders. Both convert transport failures into the
//! viewer's error taxonomy and never return partial results.

use std::sync::Arc;

use serde_json::Value;
use shared::{
    domain::{Catalog, FlowDocument, FlowId},
    error::ViewerError,
};
use tracing::{debug, info, warn};

use crate::source::FlowSource;

pub struct CatalogLoader<S: ?Sized> {
    source: Arc<S>,
}

impl<S: FlowSource + ?Sized> CatalogLoader<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    pub async fn load(&self) -> Result<Catalog, ViewerError> {
        let payload = self
            .source
            .fetch_catalog()
            .await
            .map_err(|error| ViewerError::CatalogLoad(format!("{error:#}")))?;
        let catalog = parse_catalog(payload)?;
        info!(
            source = %self.source.describe(),
            flows = catalog.len(),
            "loaded flow catalog"
        );
        Ok(catalog)
    }
}

fn parse_catalog(payload: Value) -> Result<Catalog, ViewerError> {
    if !payload.is_array() {
        return Err(ViewerError::CatalogLoad(
            "catalog payload is not a JSON array".to_string(),
        ));
    }
    serde_json::from_value(payload)
        .map_err(|error| ViewerError::CatalogLoad(format!("malformed catalog entry: {error}")))
}

/// Loads one flow document on demand, checked against the catalog it was
/// created with.
pub struct FlowLoader<S: ?Sized> {
    source: Arc<S>,
    catalog: Arc<Catalog>,
}

impl<S: ?Sized> Clone for FlowLoader<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl<S: FlowSource + ?Sized> FlowLoader<S> {
    pub fn new(source: Arc<S>, catalog: Arc<Catalog>) -> Self {
        Self { source, catalog }
    }

    pub async fn load(&self, id: &FlowId) -> Result<FlowDocument, ViewerError> {
        if !self.catalog.contains(id) {
            debug!(flow_id = %id, "flow id absent from catalog");
            return Err(ViewerError::FlowNotFound(id.clone()));
        }

        let payload = self
            .source
            .fetch_flow(id)
            .await
            .map_err(|error| ViewerError::flow_load(id, format!("{error:#}")))?;
        let document: FlowDocument = serde_json::from_value(payload)
            .map_err(|error| ViewerError::flow_load(id, format!("malformed flow document: {error}")))?;

        if &document.id != id {
            warn!(flow_id = %id, declared = %document.id, "flow document id mismatch");
            return Err(ViewerError::flow_load(
                id,
                format!("document declares id '{}'", document.id),
            ));
        }

        info!(flow_id = %id, steps = document.steps.len(), "loaded flow document");
        Ok(document)
    }
}

/// Result of probing a flow source the way an operator would when the
/// catalog fails to show up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub catalog_is_array: Option<bool>,
    pub flow_ids: Vec<String>,
    pub first_flow_keys: Option<Result<Vec<String>, String>>,
    pub error: Option<String>,
}

impl SourceReport {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("source: {}", self.source)];
        if let Some(error) = &self.error {
            lines.push(format!("catalog error: {error}"));
        }
        if let Some(is_array) = self.catalog_is_array {
            lines.push(format!("catalog is array: {is_array}"));
            lines.push(format!("ids: {:?}", self.flow_ids));
        }
        match (&self.first_flow_keys, self.flow_ids.first()) {
            (Some(Ok(keys)), Some(first)) => {
                lines.push(format!("{first}.json keys: {keys:?}"));
            }
            (Some(Err(error)), Some(first)) => {
                lines.push(format!("{first}.json error: {error}"));
            }
            _ => {}
        }
        lines
    }
}

pub async fn probe_source<S: FlowSource + ?Sized>(source: &S) -> SourceReport {
    let mut report = SourceReport {
        source: source.describe(),
        ..SourceReport::default()
    };

    let payload = match source.fetch_catalog().await {
        Ok(payload) => payload,
        Err(error) => {
            report.error = Some(format!("{error:#}"));
            return report;
        }
    };

    let entries = payload.as_array();
    report.catalog_is_array = Some(entries.is_some());
    report.flow_ids = entries
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if let Some(first) = report.flow_ids.first() {
        let probed = source
            .fetch_flow(&FlowId::from(first.as_str()))
            .await
            .map(|document| match document {
                Value::Object(map) => map.keys().cloned().collect(),
                _ => Vec::new(),
            })
            .map_err(|error| format!("{error:#}"));
        report.first_flow_keys = Some(probed);
    }

    report
}
