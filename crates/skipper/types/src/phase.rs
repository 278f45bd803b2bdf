//! States of the red/black upgrade state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of one upgrade attempt
///
/// ```text
/// Init -> DeployingNew -> HealthCheck -> Promoting -> Completed
///              |               |
///              +-> Failed <----+
///              |               |
///              +-> Cancelling <+-> RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpgradePhase {
    Init,
    DeployingNew,
    HealthCheck,
    Promoting,
    Completed,
    Failed,
    Cancelling,
    RolledBack,
}

impl UpgradePhase {
    pub fn can_transition_to(&self, next: UpgradePhase) -> bool {
        use UpgradePhase::*;

        matches!(
            (self, next),
            (Init, DeployingNew)
                | (DeployingNew, HealthCheck | Promoting | Failed | Cancelling)
                | (HealthCheck, Promoting | Failed | Cancelling)
                | (Promoting, Completed)
                | (Cancelling, RolledBack)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpgradePhase::Completed | UpgradePhase::Failed | UpgradePhase::RolledBack
        )
    }

    /// Cancellation is only honoured before old instances start being retired
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            UpgradePhase::Init | UpgradePhase::DeployingNew | UpgradePhase::HealthCheck
        )
    }
}

impl fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpgradePhase::Init => "INIT",
            UpgradePhase::DeployingNew => "DEPLOYING_NEW",
            UpgradePhase::HealthCheck => "HEALTH_CHECK",
            UpgradePhase::Promoting => "PROMOTING",
            UpgradePhase::Completed => "COMPLETED",
            UpgradePhase::Failed => "FAILED",
            UpgradePhase::Cancelling => "CANCELLING",
            UpgradePhase::RolledBack => "ROLLED_BACK",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_legal() {
        let path = [
            UpgradePhase::Init,
            UpgradePhase::DeployingNew,
            UpgradePhase::HealthCheck,
            UpgradePhase::Promoting,
            UpgradePhase::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_promoting_cannot_be_cancelled() {
        assert!(!UpgradePhase::Promoting.can_transition_to(UpgradePhase::Cancelling));
        assert!(!UpgradePhase::Promoting.is_cancellable());
        assert!(UpgradePhase::HealthCheck.can_transition_to(UpgradePhase::Cancelling));
    }

    #[test]
    fn test_terminal_phases_are_final() {
        for phase in [
            UpgradePhase::Completed,
            UpgradePhase::Failed,
            UpgradePhase::RolledBack,
        ] {
            assert!(phase.is_terminal());
            assert!(!phase.can_transition_to(UpgradePhase::Init));
        }
    }
}
