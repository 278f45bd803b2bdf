//! Event types for release observability
//!
//! The release service broadcasts one event per lifecycle step so callers can
//! follow an in-flight operation without polling.

use crate::phase::UpgradePhase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Release lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReleaseEvent {
    // ═══════════════════════════════════════════════════════════════════
    // OPERATION START
    // ═══════════════════════════════════════════════════════════════════
    InstallStarted {
        release: String,
        version: u32,
        platform: String,
    },
    UpgradeStarted {
        release: String,
        version: u32,
        redeploy: Vec<String>,
    },
    RollbackStarted {
        release: String,
        version: u32,
        source_version: u32,
    },
    DeleteStarted {
        release: String,
        version: u32,
    },

    // ═══════════════════════════════════════════════════════════════════
    // PROGRESS
    // ═══════════════════════════════════════════════════════════════════
    PhaseChanged {
        release: String,
        version: u32,
        from: UpgradePhase,
        to: UpgradePhase,
    },

    // ═══════════════════════════════════════════════════════════════════
    // OUTCOME
    // ═══════════════════════════════════════════════════════════════════
    ReleaseDeployed {
        release: String,
        version: u32,
    },
    ReleaseFailed {
        release: String,
        version: u32,
        reason: String,
    },
    ReleaseCancelled {
        release: String,
        version: u32,
    },
    ReleaseDeleted {
        release: String,
        version: u32,
    },
}

impl ReleaseEvent {
    pub fn release_name(&self) -> &str {
        match self {
            ReleaseEvent::InstallStarted { release, .. }
            | ReleaseEvent::UpgradeStarted { release, .. }
            | ReleaseEvent::RollbackStarted { release, .. }
            | ReleaseEvent::DeleteStarted { release, .. }
            | ReleaseEvent::PhaseChanged { release, .. }
            | ReleaseEvent::ReleaseDeployed { release, .. }
            | ReleaseEvent::ReleaseFailed { release, .. }
            | ReleaseEvent::ReleaseCancelled { release, .. }
            | ReleaseEvent::ReleaseDeleted { release, .. } => release,
        }
    }
}

/// Event plus the time it was emitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseEventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: ReleaseEvent,
}

impl ReleaseEventEnvelope {
    pub fn now(event: ReleaseEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
