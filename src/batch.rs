use crate::remote::{CancelToken, GenerateError};
use crate::scene::Scene;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Hard ceiling on slots per batch, respected by both the wizard and the
/// renderer backend to bound remote cost and latency.
pub const MAX_BATCH: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Pending,
    Generating,
    Completed,
    Error,
}

impl SlotStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SlotStatus::Completed | SlotStatus::Error)
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotStatus::Pending => "pending",
            SlotStatus::Generating => "generating",
            SlotStatus::Completed => "completed",
            SlotStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("no scenes to generate for")]
    NoScenes,
    #[error("slot index {0} out of range")]
    IndexOutOfRange(usize),
    #[error("slot {0} is already generating")]
    SlotBusy(usize),
    #[error("invalid slot transition {from} -> {to}")]
    InvalidTransition { from: SlotStatus, to: SlotStatus },
}

/// Generation state for one scene's asset. Index-aligned 1:1 with the scene
/// list of the batch that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSlot {
    pub index: usize,
    pub status: SlotStatus,
    pub url: Option<String>,
    pub prompt: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub uploaded: bool,
}

impl GenerationSlot {
    pub fn pending(index: usize) -> Self {
        Self {
            index,
            status: SlotStatus::Pending,
            url: None,
            prompt: None,
            error: None,
            uploaded: false,
        }
    }

    /// Moves the slot to `to`, rejecting anything outside the transition
    /// table. Entering `Generating` clears the previous artifacts so `url`
    /// only ever exists on a completed slot and `error` on a failed one.
    fn transition(&mut self, to: SlotStatus) -> Result<(), BatchError> {
        use SlotStatus::*;
        let allowed = matches!(
            (self.status, to),
            (Pending, Generating)
                | (Generating, Completed)
                | (Generating, Error)
                | (Generating, Pending)
                | (Completed, Generating)
                | (Error, Generating)
        );
        if !allowed {
            return Err(BatchError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        if to == Generating {
            self.url = None;
            self.prompt = None;
            self.error = None;
            self.uploaded = false;
        }
        self.status = to;
        Ok(())
    }
}

/// Successful output of one slot job: the asset URL plus the intermediate
/// prompt when the job has a prompt-synthesis stage.
#[derive(Debug, Clone)]
pub struct SlotOutput {
    pub url: String,
    pub prompt: Option<String>,
}

/// One unit of remote work. Settings travel inside the job value, scoped to
/// the call site that built it; there is no shared mutable configuration.
#[async_trait]
pub trait SlotJob: Send + Sync {
    async fn generate(
        &self,
        scene: &Scene,
        cancel: &CancelToken,
    ) -> Result<SlotOutput, GenerateError>;
}

/// Read-only view published to observers after every slot transition.
#[derive(Debug, Clone)]
pub struct BatchSnapshot {
    pub slots: Vec<GenerationSlot>,
    pub progress: f64,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every slot reached a terminal state (completed or error).
    Completed,
    /// The in-flight call was cancelled; untouched slots stay pending.
    Cancelled,
}

/// Drives up to [`MAX_BATCH`] independent remote generations strictly
/// sequentially, index 0 upward. One outstanding call at a time bounds the
/// load on rate-limited providers and keeps progress reporting
/// deterministic. A failed slot never aborts its siblings; the controller
/// only stops early on cancellation.
///
/// The controller owns the slot array exclusively for the lifetime of a run
/// (`&mut self` keeps a second batch off the same slots); observers get
/// cloned snapshots through a watch channel.
pub struct BatchController {
    scenes: Vec<Scene>,
    slots: Vec<GenerationSlot>,
    job: Arc<dyn SlotJob>,
    snapshot_tx: watch::Sender<BatchSnapshot>,
}

impl BatchController {
    /// Builds the slot array for `target_count` scenes, clamped to
    /// `[1, min(scenes.len(), MAX_BATCH)]`. Completed slots carried over
    /// from `existing` at the same index are reused, so re-opening a
    /// partially finished batch does not regenerate what already succeeded.
    pub fn new(
        scenes: Vec<Scene>,
        target_count: usize,
        job: Arc<dyn SlotJob>,
        existing: Option<&[GenerationSlot]>,
    ) -> Result<Self, BatchError> {
        if scenes.is_empty() {
            return Err(BatchError::NoScenes);
        }
        let target = target_count.max(1).min(scenes.len()).min(MAX_BATCH);

        let slots: Vec<GenerationSlot> = (0..target)
            .map(|i| {
                match existing.and_then(|e| e.get(i)) {
                    Some(prev) if prev.status == SlotStatus::Completed => {
                        let mut slot = prev.clone();
                        slot.index = i;
                        slot
                    }
                    _ => GenerationSlot::pending(i),
                }
            })
            .collect();

        let (snapshot_tx, _) = watch::channel(BatchSnapshot {
            slots: slots.clone(),
            progress: Self::progress_of(&slots),
            done: false,
        });

        Ok(Self {
            scenes,
            slots,
            job,
            snapshot_tx,
        })
    }

    pub fn slots(&self) -> &[GenerationSlot] {
        &self.slots
    }

    /// Fraction of slots that finished an attempt (completed or error), in
    /// percent. Failures count: progress means "attempts finished".
    pub fn progress(&self) -> f64 {
        Self::progress_of(&self.slots)
    }

    fn progress_of(slots: &[GenerationSlot]) -> f64 {
        let terminal = slots.iter().filter(|s| s.status.is_terminal()).count();
        terminal as f64 / slots.len() as f64 * 100.0
    }

    /// Observer handle; every slot transition publishes a fresh snapshot.
    pub fn subscribe(&self) -> watch::Receiver<BatchSnapshot> {
        self.snapshot_tx.subscribe()
    }

    fn publish(&self, done: bool) {
        let _ = self.snapshot_tx.send(BatchSnapshot {
            slots: self.slots.clone(),
            progress: self.progress(),
            done,
        });
    }

    /// Runs the batch to completion. `cancel` must be a token created for
    /// this invocation only. Returns `Cancelled` when the in-flight call was
    /// aborted; the interrupted slot rolls back to pending and is never
    /// marked as an error.
    pub async fn run(&mut self, cancel: &CancelToken) -> Result<BatchOutcome, BatchError> {
        for index in 0..self.slots.len() {
            if self.slots[index].status == SlotStatus::Completed {
                // Seeded from a previous session; nothing to do.
                continue;
            }
            if cancel.is_cancelled() {
                self.publish(false);
                return Ok(BatchOutcome::Cancelled);
            }
            if self.run_slot(index, cancel).await? == BatchOutcome::Cancelled {
                self.publish(false);
                return Ok(BatchOutcome::Cancelled);
            }
        }
        self.publish(true);
        Ok(BatchOutcome::Completed)
    }

    /// Re-runs a single slot in isolation, outside the sequential loop.
    /// Only explicit calls re-enter a terminal slot; nothing retries
    /// automatically.
    pub async fn regenerate(
        &mut self,
        index: usize,
        cancel: &CancelToken,
    ) -> Result<BatchOutcome, BatchError> {
        if index >= self.slots.len() {
            return Err(BatchError::IndexOutOfRange(index));
        }
        if self.slots[index].status == SlotStatus::Generating {
            return Err(BatchError::SlotBusy(index));
        }
        let outcome = self.run_slot(index, cancel).await?;
        self.publish(self.slots.iter().all(|s| s.status.is_terminal()));
        Ok(outcome)
    }

    async fn run_slot(
        &mut self,
        index: usize,
        cancel: &CancelToken,
    ) -> Result<BatchOutcome, BatchError> {
        self.slots[index].transition(SlotStatus::Generating)?;
        self.publish(false);

        let scene = self.scenes[index].clone();
        match self.job.generate(&scene, cancel).await {
            Ok(output) => {
                debug!("slot {} completed: {}", index, output.url);
                let slot = &mut self.slots[index];
                slot.transition(SlotStatus::Completed)?;
                slot.url = Some(output.url);
                slot.prompt = output.prompt;
            }
            Err(GenerateError::Cancelled) => {
                self.slots[index].transition(SlotStatus::Pending)?;
                return Ok(BatchOutcome::Cancelled);
            }
            Err(e) => {
                warn!("slot {} failed: {}", index, e);
                let slot = &mut self.slots[index];
                slot.transition(SlotStatus::Error)?;
                slot.error = Some(e.to_string());
            }
        }
        self.publish(false);
        Ok(BatchOutcome::Completed)
    }
}
