//! Per-release operation table
//!
//! At most one state-machine-driving operation (install, upgrade, rollback,
//! delete) runs per release name. Acquiring the slot yields an
//! [`OperationPermit`] that the background task owns; dropping the permit
//! frees the name and wakes anyone waiting for it to settle.

use crate::error::{ReleaseError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use skipper_types::UpgradePhase;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// What the active operation is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Install,
    Upgrade,
    Rollback,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Install => "install",
            OperationKind::Upgrade => "upgrade",
            OperationKind::Rollback => "rollback",
            OperationKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Handles held by the table for one in-flight operation
struct ActiveOperation {
    kind: OperationKind,
    cancel: watch::Sender<bool>,
    phase: watch::Receiver<UpgradePhase>,
    done: watch::Receiver<bool>,
}

/// Keyed table of in-flight operations
#[derive(Clone, Default)]
pub struct ReleaseLocks {
    active: Arc<DashMap<String, ActiveOperation>>,
}

impl ReleaseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for an operation, failing if one is already running
    pub fn try_acquire(&self, name: &str, kind: OperationKind) -> Result<OperationPermit> {
        match self.active.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                debug!(
                    release = %name,
                    active = %entry.get().kind,
                    requested = %kind,
                    "Release is busy"
                );
                Err(ReleaseError::UpgradeInProgress(name.to_string()))
            }
            Entry::Vacant(entry) => {
                let (cancel_tx, cancel_rx) = watch::channel(false);
                let (phase_tx, phase_rx) = watch::channel(UpgradePhase::Init);
                let (done_tx, done_rx) = watch::channel(false);

                entry.insert(ActiveOperation {
                    kind,
                    cancel: cancel_tx,
                    phase: phase_rx,
                    done: done_rx,
                });

                Ok(OperationPermit {
                    name: name.to_string(),
                    kind,
                    active: self.active.clone(),
                    cancel: cancel_rx,
                    phase: phase_tx,
                    done: done_tx,
                })
            }
        }
    }

    /// Whether an operation currently holds `name`
    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    /// Kind of the operation holding `name`
    pub fn kind(&self, name: &str) -> Option<OperationKind> {
        self.active.get(name).map(|op| op.kind)
    }

    /// Current phase of the in-flight state machine for `name`
    pub fn phase(&self, name: &str) -> Option<UpgradePhase> {
        self.active.get(name).map(|op| *op.phase.borrow())
    }

    /// Ask the in-flight operation to stop.
    ///
    /// Returns false when nothing is running for `name`, the operation is a
    /// delete, or the state machine is past the point where it can be
    /// cancelled.
    pub fn request_cancel(&self, name: &str) -> bool {
        let Some(op) = self.active.get(name) else {
            return false;
        };
        if op.kind == OperationKind::Delete || !op.phase.borrow().is_cancellable() {
            return false;
        }
        op.cancel.send_replace(true);
        debug!(release = %name, kind = %op.kind, "Cancellation requested");
        true
    }

    /// Resolve once no operation is running for `name`
    pub async fn wait_until_released(&self, name: &str) {
        let done = self.active.get(name).map(|op| op.done.clone());
        if let Some(mut done) = done {
            // Err means the permit is gone, which is also released
            let _ = done.wait_for(|finished| *finished).await;
        }
    }
}

/// Exclusive right to drive the state machine of one release name
pub struct OperationPermit {
    name: String,
    kind: OperationKind,
    active: Arc<DashMap<String, ActiveOperation>>,
    cancel: watch::Receiver<bool>,
    phase: watch::Sender<UpgradePhase>,
    done: watch::Sender<bool>,
}

impl OperationPermit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn phase(&self) -> UpgradePhase {
        *self.phase.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolve when cancellation is requested
    pub async fn cancelled(&mut self) {
        if self.cancel.wait_for(|requested| *requested).await.is_err() {
            // The table entry was removed while we still hold the permit
            std::future::pending::<()>().await;
        }
    }

    /// Move the state machine to `next`, returning the previous phase
    pub fn set_phase(&self, next: UpgradePhase) -> Result<UpgradePhase> {
        let current = self.phase();
        if !current.can_transition_to(next) {
            return Err(ReleaseError::Internal(format!(
                "illegal phase transition for {}: {} -> {}",
                self.name, current, next
            )));
        }
        self.phase.send_replace(next);
        Ok(current)
    }

    /// Switch to PROMOTING unless cancellation was requested first.
    ///
    /// Returns `Ok(false)` when a cancel got in. The table entry is held
    /// exclusively across the check and the switch, so a concurrent
    /// [`ReleaseLocks::request_cancel`] either lands before it and is
    /// honoured here, or observes PROMOTING and is refused.
    pub fn enter_promotion(&self) -> Result<bool> {
        let _entry = self.active.get_mut(&self.name);
        if self.is_cancelled() {
            return Ok(false);
        }
        self.set_phase(UpgradePhase::Promoting)?;
        Ok(true)
    }
}

impl Drop for OperationPermit {
    fn drop(&mut self) {
        self.active.remove(&self.name);
        self.done.send_replace(true);
    }
}
