//! Job lifecycle state machine.
//!
//! ```text
//! Received -> Accepted -> Running -> Completed ----> CallbackSent
//!                 |          |    -> Failed    \--> CallbackFailed
//!                 |          \----> Cancelled  /
//!                 \--------------------------/ (cancelled before start)
//! ```
//!
//! `Failed` and `Cancelled` still proceed to callback delivery with an error
//! payload. Only `CallbackSent` and `CallbackFailed` are terminal.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Received,
    Accepted,
    Running,
    Completed,
    Failed,
    Cancelled,
    CallbackSent,
    CallbackFailed,
}

impl JobStatus {
    /// Statuses reachable from `self` in one step.
    pub fn valid_transitions(self) -> &'static [JobStatus] {
        use JobStatus::*;
        match self {
            Received => &[Accepted],
            Accepted => &[Running, Cancelled],
            Running => &[Completed, Failed, Cancelled],
            Completed | Failed | Cancelled => &[CallbackSent, CallbackFailed],
            CallbackSent | CallbackFailed => &[],
        }
    }

    pub fn can_transition_to(self, to: JobStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Validate a transition, returning a readable message for invalid ones.
    pub fn validate_transition(self, to: JobStatus) -> Result<(), String> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(format!("Invalid transition: {} -> {}", self.as_str(), to.as_str()))
        }
    }

    /// Position in the lifecycle. Outcomes share a stage, as do deliveries.
    pub fn stage(self) -> u8 {
        match self {
            JobStatus::Received => 0,
            JobStatus::Accepted => 1,
            JobStatus::Running => 2,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 3,
            JobStatus::CallbackSent | JobStatus::CallbackFailed => 4,
        }
    }

    /// Whether `to` lies later in the lifecycle, possibly skipping stages.
    ///
    /// Observers that can miss events use this instead of
    /// [`can_transition_to`](Self::can_transition_to).
    pub fn precedes(self, to: JobStatus) -> bool {
        self.stage() < to.stage()
    }

    /// No further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::CallbackSent | JobStatus::CallbackFailed)
    }

    /// Execution has finished (successfully or not) but delivery may be pending.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        ) || self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Received => "received",
            JobStatus::Accepted => "accepted",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::CallbackSent => "callback_sent",
            JobStatus::CallbackFailed => "callback_failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
