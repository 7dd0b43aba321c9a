use std::sync::Arc;

use anyhow::{ensure, Result};
use shared::{
    domain::{FlowId, ProgressExport, ProgressRecord},
    error::ViewerError,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::KeyValueStore;

pub const DEFAULT_NAMESPACE: &str = "flow-progress";

/// Per-flow step completion, one record per flow under `<namespace>:<flowId>`.
///
/// Only completed steps are stored; an absent index reads as unchecked.
/// Writes are full read-modify-write cycles of a single key and the last
/// write wins.
#[derive(Clone)]
pub struct ProgressStore<S> {
    store: S,
    namespace: String,
    write_lock: Arc<Mutex<()>>,
}

impl<S: KeyValueStore> ProgressStore<S> {
    pub fn new(store: S, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        ensure!(!namespace.is_empty(), "progress namespace must not be empty");
        ensure!(
            !namespace.contains(':'),
            "progress namespace '{namespace}' must not contain ':'"
        );
        Ok(Self {
            store,
            namespace,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn storage_key(&self, flow_id: &FlowId) -> String {
        format!("{}:{}", self.namespace, flow_id.as_str())
    }

    /// Current record for `flow_id`. Missing or unreadable records read as empty.
    pub async fn snapshot(&self, flow_id: &FlowId) -> ProgressRecord {
        match self.read_record(flow_id).await {
            Ok(record) => record.unwrap_or_default(),
            Err(error) => {
                warn!(flow_id = %flow_id, %error, "treating stored progress as empty");
                ProgressRecord::new()
            }
        }
    }

    pub async fn set_step(&self, flow_id: &FlowId, step_index: usize, completed: bool) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.record_for_update(flow_id).await?;
        apply_step(&mut record, step_index, completed);
        self.write_record(flow_id, &record).await?;
        debug!(flow_id = %flow_id, step_index, completed, "stored step completion");
        Ok(())
    }

    /// Flips the stored state of one step and returns the new state.
    pub async fn toggle_step(&self, flow_id: &FlowId, step_index: usize) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.record_for_update(flow_id).await?;
        let completed = !record.get(&step_index).copied().unwrap_or(false);
        apply_step(&mut record, step_index, completed);
        self.write_record(flow_id, &record).await?;
        debug!(flow_id = %flow_id, step_index, completed, "toggled step completion");
        Ok(completed)
    }

    /// Records of every known flow that has one; untouched flows are omitted.
    pub async fn export_all(&self, known_flow_ids: &[FlowId]) -> ProgressExport {
        let mut export = ProgressExport::new();
        for flow_id in known_flow_ids {
            match self.read_record(flow_id).await {
                Ok(Some(record)) => {
                    export.insert(flow_id.clone(), record);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(flow_id = %flow_id, %error, "skipping unreadable progress in export");
                }
            }
        }
        export
    }

    /// Deletes the record of every given flow. Callers gate this behind an
    /// explicit user confirmation.
    pub async fn reset_all(&self, known_flow_ids: &[FlowId]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut removed = 0;
        for flow_id in known_flow_ids {
            let key = self.storage_key(flow_id);
            if self.store.get(&key).await?.is_some() {
                removed += 1;
            }
            self.store.remove(&key).await?;
        }
        debug!(removed, "reset stored progress");
        Ok(removed)
    }

    async fn read_record(&self, flow_id: &FlowId) -> Result<Option<ProgressRecord>, ViewerError> {
        let key = self.storage_key(flow_id);
        let raw = self
            .store
            .get(&key)
            .await
            .map_err(|error| ViewerError::StorageRead {
                key: key.clone(),
                reason: format!("{error:#}"),
            })?;
        raw.map(|raw| decode_record(&key, &raw)).transpose()
    }

    /// Record a write starts from. Read failures abort the write; an
    /// undecodable record is overwritten.
    async fn record_for_update(&self, flow_id: &FlowId) -> Result<ProgressRecord> {
        let key = self.storage_key(flow_id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(ProgressRecord::new());
        };
        match decode_record(&key, &raw) {
            Ok(record) => Ok(record),
            Err(error) => {
                warn!(flow_id = %flow_id, %error, "replacing undecodable stored progress");
                Ok(ProgressRecord::new())
            }
        }
    }

    /// An empty record is removed so an untouched flow stays absent.
    async fn write_record(&self, flow_id: &FlowId, record: &ProgressRecord) -> Result<()> {
        let key = self.storage_key(flow_id);
        if record.is_empty() {
            return self.store.remove(&key).await;
        }
        let encoded = serde_json::to_string(record)?;
        self.store.set(&key, &encoded).await
    }
}

fn decode_record(key: &str, raw: &str) -> Result<ProgressRecord, ViewerError> {
    serde_json::from_str(raw).map_err(|error| ViewerError::StorageRead {
        key: key.to_string(),
        reason: error.to_string(),
    })
}

fn apply_step(record: &mut ProgressRecord, step_index: usize, completed: bool) {
    if completed {
        record.insert(step_index, true);
    } else {
        record.remove(&step_index);
    }
}
