//! Task state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting for a worker.
    Pending,
    /// A worker is executing the task.
    Processing,
    /// Images were generated.
    Completed,
    /// Execution failed. Retryable until the retry budget is spent.
    Failed,
    /// Generation exceeded its deadline, or the task went stale across a restart.
    Timeout,
    /// Cancelled by an external request.
    Cancelled,
}

impl TaskStatus {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            // From Pending
            (Pending, Processing) | (Pending, Cancelled) | (Pending, Timeout) |
            // From Processing
            (Processing, Completed) | (Processing, Failed) |
            (Processing, Timeout) | (Processing, Cancelled) |
            // Recovery after restart puts an interrupted execution back in line
            (Processing, Pending) |
            // Explicit retry or cancel of a failed attempt
            (Failed, Pending) | (Failed, Cancelled) |
            (Timeout, Pending) | (Timeout, Cancelled)
        )
    }

    /// No automatic transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }

    /// States a worker may pick up.
    pub fn is_executable(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// States an explicit retry may reset.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed | Self::Timeout)
    }

    /// Human-readable label used in task messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Waiting to be processed",
            Self::Processing => "Generating",
            Self::Completed => "Generation complete",
            Self::Failed => "Generation failed",
            Self::Timeout => "Timed out",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "timeout" => Ok(Self::Timeout),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}
