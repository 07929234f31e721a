//! Task lifecycle states and the transition rules reports must respect.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle state of a task.
///
/// `PENDING -> QUEUED -> IN_PROGRESS -> HOLDING` moves forward only, any
/// non-terminal state may finish, and nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
  Pending,
  Queued,
  InProgress,
  /// Waiting for an operator to skip, retry or abort.
  Holding,
  Completed,
  Failed,
  Aborted,
  #[serde(rename = "TIMEDOUT")]
  TimedOut,
}

impl TaskStatus {
  pub const ALL: [TaskStatus; 8] = [
    TaskStatus::Pending,
    TaskStatus::Queued,
    TaskStatus::InProgress,
    TaskStatus::Holding,
    TaskStatus::Completed,
    TaskStatus::Failed,
    TaskStatus::Aborted,
    TaskStatus::TimedOut,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      TaskStatus::Pending => "PENDING",
      TaskStatus::Queued => "QUEUED",
      TaskStatus::InProgress => "IN_PROGRESS",
      TaskStatus::Holding => "HOLDING",
      TaskStatus::Completed => "COMPLETED",
      TaskStatus::Failed => "FAILED",
      TaskStatus::Aborted => "ABORTED",
      TaskStatus::TimedOut => "TIMEDOUT",
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Aborted | TaskStatus::TimedOut
    )
  }

  /// Position along the forward path. Terminal states share the last rank.
  fn rank(self) -> u8 {
    match self {
      TaskStatus::Pending => 0,
      TaskStatus::Queued => 1,
      TaskStatus::InProgress => 2,
      TaskStatus::Holding => 3,
      _ => 4,
    }
  }

  /// Whether a status report may move a task from `self` to `next`.
  /// Redispatch is not a report; see [`TaskStatus::can_redispatch_to`].
  pub fn can_advance_to(self, next: TaskStatus) -> bool {
    if self.is_terminal() {
      return false;
    }
    if self == TaskStatus::InProgress && next == TaskStatus::InProgress {
      return true;
    }
    next.rank() > self.rank()
  }

  pub fn can_redispatch_to(self, next: TaskStatus) -> bool {
    !self.is_terminal() && matches!(next, TaskStatus::Pending | TaskStatus::Queued)
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);

impl FromStr for TaskStatus {
  type Err = UnknownVariant;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    TaskStatus::ALL
      .into_iter()
      .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| UnknownVariant(s.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use TaskStatus::*;

  #[test]
  fn terminal_states_are_final() {
    for from in [Completed, Failed, Aborted, TimedOut] {
      assert!(from.is_terminal());
      for to in TaskStatus::ALL {
        assert!(!from.can_advance_to(to), "{} -> {} must be rejected", from, to);
        assert!(!from.can_redispatch_to(to));
      }
    }
  }

  #[test]
  fn forward_progress_is_accepted() {
    assert!(Pending.can_advance_to(Queued));
    assert!(Pending.can_advance_to(InProgress));
    assert!(Queued.can_advance_to(InProgress));
    assert!(InProgress.can_advance_to(Holding));
    assert!(InProgress.can_advance_to(InProgress));
    assert!(Holding.can_advance_to(Completed));
    assert!(Pending.can_advance_to(Aborted));
  }

  #[test]
  fn backward_reports_are_rejected() {
    assert!(!Queued.can_advance_to(Pending));
    assert!(!InProgress.can_advance_to(Queued));
    assert!(!Holding.can_advance_to(InProgress));
    assert!(!Queued.can_advance_to(Queued));
  }

  #[test]
  fn redispatch_only_targets_pending_or_queued() {
    assert!(InProgress.can_redispatch_to(Pending));
    assert!(Holding.can_redispatch_to(Queued));
    assert!(!Holding.can_redispatch_to(InProgress));
  }

  #[test]
  fn parses_wire_names() {
    assert_eq!("TIMEDOUT".parse::<TaskStatus>(), Ok(TimedOut));
    assert_eq!("in_progress".parse::<TaskStatus>(), Ok(InProgress));
    assert_eq!("DONE".parse::<TaskStatus>().unwrap_err().to_string(), "unknown value 'DONE'");
    assert_eq!(serde_json::to_string(&TimedOut).unwrap(), "\"TIMEDOUT\"");
    assert_eq!(serde_json::to_string(&InProgress).unwrap(), "\"IN_PROGRESS\"");
  }
}
