use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TaskError};
use crate::state::{TaskStatus, UnknownVariant};

/// Operation a task performs against its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleCommand {
  Install,
  Uninstall,
  Start,
  Restart,
  Stop,
  Execute,
  Abort,
  Upgrade,
  ServiceCheck,
  CustomCommand,
  #[serde(rename = "ACTIONEXECUTE")]
  ActionExecute,
}

impl RoleCommand {
  pub const ALL: [RoleCommand; 11] = [
    RoleCommand::Install,
    RoleCommand::Uninstall,
    RoleCommand::Start,
    RoleCommand::Restart,
    RoleCommand::Stop,
    RoleCommand::Execute,
    RoleCommand::Abort,
    RoleCommand::Upgrade,
    RoleCommand::ServiceCheck,
    RoleCommand::CustomCommand,
    RoleCommand::ActionExecute,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      RoleCommand::Install => "INSTALL",
      RoleCommand::Uninstall => "UNINSTALL",
      RoleCommand::Start => "START",
      RoleCommand::Restart => "RESTART",
      RoleCommand::Stop => "STOP",
      RoleCommand::Execute => "EXECUTE",
      RoleCommand::Abort => "ABORT",
      RoleCommand::Upgrade => "UPGRADE",
      RoleCommand::ServiceCheck => "SERVICE_CHECK",
      RoleCommand::CustomCommand => "CUSTOM_COMMAND",
      RoleCommand::ActionExecute => "ACTIONEXECUTE",
    }
  }
}

impl fmt::Display for RoleCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for RoleCommand {
  type Err = UnknownVariant;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    RoleCommand::ALL
      .into_iter()
      .find(|cmd| cmd.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| UnknownVariant(s.to_string()))
  }
}

/// One remote command execution, as persisted by the task store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
  pub task_id: i64,
  pub request_id: i64,
  pub stage_id: i64,
  /// `None` for tasks that target the cluster rather than a host.
  pub host_name: Option<String>,
  pub role: String,
  pub role_command: RoleCommand,
  pub status: TaskStatus,
  pub exit_code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
  pub output_log: String,
  pub error_log: String,
  pub structured_out: Option<String>,
  pub start_time: Option<i64>,
  pub end_time: Option<i64>,
  pub attempt_count: i32,
  pub custom_command_name: Option<String>,
  pub command_detail: Option<String>,
}

impl TaskRecord {
  /// A freshly dispatched task in `PENDING` with no output yet.
  pub fn pending(
    task_id: i64,
    request_id: i64,
    stage_id: i64,
    host_name: Option<&str>,
    role: &str,
    role_command: RoleCommand,
  ) -> Self {
    Self {
      task_id,
      request_id,
      stage_id,
      host_name: host_name.map(str::to_string),
      role: role.to_string(),
      role_command,
      status: TaskStatus::Pending,
      exit_code: None,
      stdout: String::new(),
      stderr: String::new(),
      output_log: String::new(),
      error_log: String::new(),
      structured_out: None,
      start_time: None,
      end_time: None,
      attempt_count: 0,
      custom_command_name: None,
      command_detail: None,
    }
  }

  /// Persisted detail, or `"<role> <command>"` when none was stored.
  pub fn command_detail(&self) -> String {
    match &self.command_detail {
      Some(detail) => detail.clone(),
      None => format!("{} {}", self.role, self.role_command),
    }
  }

  /// Applies a status report. The record is left untouched when the
  /// transition is rejected.
  pub fn apply(&mut self, report: &StatusReport, now_millis: i64) -> Result<()> {
    let allowed = if report.redispatch {
      self.status.can_redispatch_to(report.status)
    } else {
      self.status.can_advance_to(report.status)
    };
    if !allowed {
      return Err(TaskError::InvalidStateTransition {
        task_id: self.task_id,
        from: self.status,
        to: report.status,
      });
    }

    let at = report.reported_at.unwrap_or(now_millis);
    if report.redispatch {
      self.attempt_count += 1;
      self.start_time = None;
    } else if report.status == TaskStatus::InProgress && self.start_time.is_none() {
      self.start_time = Some(at);
    }

    // exit code and end time only exist on terminal records
    if report.status.is_terminal() {
      self.exit_code = report.exit_code;
      self.end_time = Some(at);
    }

    if let Some(stdout) = &report.stdout {
      self.stdout = stdout.clone();
    }
    if let Some(stderr) = &report.stderr {
      self.stderr = stderr.clone();
    }
    if report.structured_out.is_some() {
      self.structured_out = report.structured_out.clone();
    }
    self.status = report.status;
    Ok(())
  }
}

/// Status update delivered by the dispatch side for a single task.
///
/// On the wire a progress report carries `status`, while a redispatch carries
/// only `redispatch` with the target state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StatusMessage", into = "StatusMessage")]
pub struct StatusReport {
  pub task_id: i64,
  pub status: TaskStatus,
  /// Resets the task to `PENDING`/`QUEUED` for another attempt.
  pub redispatch: bool,
  pub exit_code: Option<i32>,
  pub stdout: Option<String>,
  pub stderr: Option<String>,
  pub structured_out: Option<String>,
  pub reported_at: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusMessage {
  task_id: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  status: Option<TaskStatus>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  redispatch: Option<TaskStatus>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  exit_code: Option<i32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  stdout: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  stderr: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  structured_out: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  reported_at: Option<i64>,
}

impl TryFrom<StatusMessage> for StatusReport {
  type Error = &'static str;

  fn try_from(msg: StatusMessage) -> std::result::Result<Self, Self::Error> {
    let (status, redispatch) = match (msg.status, msg.redispatch) {
      (Some(status), None) => (status, false),
      (None, Some(target)) => (target, true),
      (Some(_), Some(_)) => return Err("a report carries either `status` or `redispatch`, not both"),
      (None, None) => return Err("missing field `status` or `redispatch`"),
    };
    Ok(StatusReport {
      task_id: msg.task_id,
      status,
      redispatch,
      exit_code: msg.exit_code,
      stdout: msg.stdout,
      stderr: msg.stderr,
      structured_out: msg.structured_out,
      reported_at: msg.reported_at,
    })
  }
}

impl From<StatusReport> for StatusMessage {
  fn from(report: StatusReport) -> Self {
    let (status, redispatch) = if report.redispatch {
      (None, Some(report.status))
    } else {
      (Some(report.status), None)
    };
    StatusMessage {
      task_id: report.task_id,
      status,
      redispatch,
      exit_code: report.exit_code,
      stdout: report.stdout,
      stderr: report.stderr,
      structured_out: report.structured_out,
      reported_at: report.reported_at,
    }
  }
}

impl StatusReport {
  pub fn new(task_id: i64, status: TaskStatus) -> Self {
    Self {
      task_id,
      status,
      redispatch: false,
      exit_code: None,
      stdout: None,
      stderr: None,
      structured_out: None,
      reported_at: None,
    }
  }

  pub fn redispatch(task_id: i64, status: TaskStatus) -> Self {
    Self {
      redispatch: true,
      ..Self::new(task_id, status)
    }
  }
}
