use std::fmt;
use std::str::FromStr;

/// Internal execution state of a stored trigger.
///
/// Only the job-store coordinator moves triggers between these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum TriggerState {
    Waiting,
    Acquired,
    Blocked,
    Paused,
    PausedBlocked,
    Complete,
    Error,
}

impl TriggerState {
    pub const ALL: [TriggerState; 7] = [
        TriggerState::Waiting,
        TriggerState::Acquired,
        TriggerState::Blocked,
        TriggerState::Paused,
        TriggerState::PausedBlocked,
        TriggerState::Complete,
        TriggerState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerState::Waiting => "WAITING",
            TriggerState::Acquired => "ACQUIRED",
            TriggerState::Blocked => "BLOCKED",
            TriggerState::Paused => "PAUSED",
            TriggerState::PausedBlocked => "PAUSED_BLOCKED",
            TriggerState::Complete => "COMPLETE",
            TriggerState::Error => "ERROR",
        }
    }

    /// State after a pause request. `None` means the pause is a no-op.
    pub fn paused(self) -> Option<TriggerState> {
        match self {
            TriggerState::Complete => None,
            TriggerState::Blocked | TriggerState::PausedBlocked => {
                Some(TriggerState::PausedBlocked)
            }
            _ => Some(TriggerState::Paused),
        }
    }

    /// State after a resume request.
    pub fn resumed(self) -> TriggerState {
        match self {
            TriggerState::PausedBlocked => TriggerState::Blocked,
            _ => TriggerState::Waiting,
        }
    }

    /// Sibling transition while a non-concurrent job is executing.
    pub fn blocked(self) -> Option<TriggerState> {
        match self {
            TriggerState::Waiting => Some(TriggerState::Blocked),
            TriggerState::Paused => Some(TriggerState::PausedBlocked),
            _ => None,
        }
    }

    /// Sibling transition once a non-concurrent job has finished.
    pub fn unblocked(self) -> Option<TriggerState> {
        match self {
            TriggerState::Blocked => Some(TriggerState::Waiting),
            TriggerState::PausedBlocked => Some(TriggerState::Paused),
            _ => None,
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, TriggerState::Paused | TriggerState::PausedBlocked)
    }

    pub fn status(&self) -> TriggerStatus {
        match self {
            TriggerState::Complete => TriggerStatus::Complete,
            TriggerState::Paused | TriggerState::PausedBlocked => TriggerStatus::Paused,
            TriggerState::Blocked => TriggerStatus::Blocked,
            TriggerState::Error => TriggerStatus::Error,
            TriggerState::Waiting | TriggerState::Acquired => TriggerStatus::Normal,
        }
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTriggerState(pub String);

impl fmt::Display for UnknownTriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown trigger state: {}", self.0)
    }
}

impl std::error::Error for UnknownTriggerState {}

impl FromStr for TriggerState {
    type Err = UnknownTriggerState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownTriggerState(s.to_string()))
    }
}

/// Externally visible trigger state category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TriggerStatus {
    None,
    Normal,
    Paused,
    Complete,
    Error,
    Blocked,
}

/// Instruction returned by a finished job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompletedExecutionInstruction {
    Noop,
    ReExecuteJob,
    SetTriggerComplete,
    DeleteTrigger,
    SetAllJobTriggersComplete,
    SetTriggerError,
    SetAllJobTriggersError,
}
