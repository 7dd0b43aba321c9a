//! Binds activated view intents to their side effects: progress writes,
//! clipboard writes, and navigation requests handed back to the caller.

use std::{collections::HashMap, time::Duration};

use anyhow::{Context, Result};
use shared::{domain::FlowId, protocol::Route};
use storage::{KeyValueStore, ProgressStore};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::view::{CopyTarget, Intent};

pub const COPY_ACK_DURATION: Duration = Duration::from_millis(1200);

/// Write-only system clipboard.
pub trait Clipboard {
    fn write_text(&mut self, text: &str) -> Result<()>;
}

/// Per-button acknowledgement windows. A click restarts only its own
/// button's window.
#[derive(Debug, Default)]
pub struct CopyAcknowledgements {
    deadlines: HashMap<CopyTarget, Instant>,
}

impl CopyAcknowledgements {
    pub fn acknowledge(&mut self, target: CopyTarget, now: Instant) {
        self.deadlines.insert(target, now + COPY_ACK_DURATION);
    }

    pub fn is_acknowledged(&self, target: &CopyTarget, now: Instant) -> bool {
        self.deadlines
            .get(target)
            .is_some_and(|deadline| now < *deadline)
    }

    pub fn clear_expired(&mut self, now: Instant) {
        self.deadlines.retain(|_, deadline| now < *deadline);
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }
}

/// How the user activated an interactive element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    /// Checkbox changed to the given state.
    Checked(bool),
    /// Click or keyboard activation without a state of its own.
    Activated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    ProgressUpdated {
        flow_id: FlowId,
        step_index: usize,
        completed: bool,
    },
    Copied(CopyTarget),
    Navigate(Route),
}

pub struct Dispatcher<K> {
    progress: ProgressStore<K>,
    acks: CopyAcknowledgements,
}

impl<K: KeyValueStore> Dispatcher<K> {
    pub fn new(progress: ProgressStore<K>) -> Self {
        Self {
            progress,
            acks: CopyAcknowledgements::default(),
        }
    }

    pub fn progress(&self) -> &ProgressStore<K> {
        &self.progress
    }

    pub fn acknowledgements(&self) -> &CopyAcknowledgements {
        &self.acks
    }

    pub fn acknowledgements_mut(&mut self) -> &mut CopyAcknowledgements {
        &mut self.acks
    }

    pub async fn dispatch(
        &mut self,
        intent: &Intent,
        interaction: Interaction,
        clipboard: &mut dyn Clipboard,
        now: Instant,
    ) -> Result<DispatchOutcome> {
        match intent {
            Intent::ToggleStep {
                flow_id,
                step_index,
            } => {
                let completed = match interaction {
                    Interaction::Checked(checked) => {
                        self.progress.set_step(flow_id, *step_index, checked).await?;
                        checked
                    }
                    Interaction::Activated => self.progress.toggle_step(flow_id, *step_index).await?,
                };
                info!(flow_id = %flow_id, step_index, completed, "step completion changed");
                Ok(DispatchOutcome::ProgressUpdated {
                    flow_id: flow_id.clone(),
                    step_index: *step_index,
                    completed,
                })
            }
            Intent::CopyText { target, text } => {
                clipboard
                    .write_text(text)
                    .context("failed to write to clipboard")?;
                self.acks.clear_expired(now);
                self.acks.acknowledge(*target, now);
                debug!(step_index = target.step_index, field = target.field.as_str(), "copied text");
                Ok(DispatchOutcome::Copied(*target))
            }
            Intent::Navigate { route } => Ok(DispatchOutcome::Navigate(route.clone())),
        }
    }
}
