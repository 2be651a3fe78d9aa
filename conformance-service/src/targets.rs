// Target and execution models
// Containers for resolved execution settings and the mutable state of
// a launched execution.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, Duration, Local};

/// Name of the distinguished folder that seeds reference data.
/// Executions of this folder always block until completion.
pub const LOADSCRIPT_FOLDER: &str = "_LoadResources";

/// Which of the two property trees a target is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    Dev,
    Production,
}

impl TreeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeKind::Dev => "dev",
            TreeKind::Production => "production",
        }
    }
}

impl fmt::Display for TreeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully specified suite execution.
///
/// `origins` and `destinations` must be non-empty before the target is
/// handed to the orchestrator; the catalog enforces this at
/// construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTarget {
    /// Path of the suite folder, forward-slash, relative to the repo
    /// root (prefixed with `dev/` for dev-tree targets).
    pub rel_path: String,
    /// Test system name(s) used as the origin, in dropdown order.
    pub origins: Vec<String>,
    /// Test system name(s) used as the destination, in dropdown order.
    pub destinations: Vec<String>,
    /// Template variables filled out during execution setup.
    pub params: BTreeMap<String, String>,
    /// Whether this is the load-resources folder.
    pub is_loadscript_folder: bool,
    /// Explicit blocking flag; `None` inherits the run-wide default.
    pub block_until_complete: Option<bool>,
}

impl ExecutionTarget {
    pub fn new(rel_path: impl Into<String>) -> Self {
        Self {
            rel_path: rel_path.into(),
            origins: Vec::new(),
            destinations: Vec::new(),
            params: BTreeMap::new(),
            is_loadscript_folder: false,
            block_until_complete: None,
        }
    }

    /// Mark this target as the load-resources folder, which forces
    /// blocking behaviour.
    pub fn set_loadscript_folder(&mut self, is_loadscript_folder: bool) {
        self.is_loadscript_folder = is_loadscript_folder;
        if is_loadscript_folder {
            self.block_until_complete = Some(true);
        }
    }

    pub fn has_origins(&self) -> bool {
        !self.origins.is_empty()
    }

    pub fn has_destinations(&self) -> bool {
        !self.destinations.is_empty()
    }

    /// Whether subsequent launches must wait for this target to finish.
    pub fn blocks(&self) -> bool {
        self.is_loadscript_folder || self.block_until_complete.unwrap_or(false)
    }
}

/// Settings needed for uploading a suite folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    /// Path of the suite folder, forward-slash, relative to the repo
    /// root (prefixed with `dev/` for dev-tree targets).
    pub rel_path: String,
    /// All "viewable by" access group names.
    pub access: Vec<String>,
    /// Name of the validation environment for the folder.
    pub validator: String,
    /// Tree this target was resolved against.
    pub kind: TreeKind,
}

impl UploadTarget {
    pub fn new(rel_path: impl Into<String>, kind: TreeKind) -> Self {
        Self {
            rel_path: rel_path.into(),
            access: Vec::new(),
            validator: String::new(),
            kind,
        }
    }

    pub fn has_access(&self) -> bool {
        !self.access.is_empty()
    }

    pub fn has_validator(&self) -> bool {
        !self.validator.is_empty()
    }
}

/// Status of a launched execution as reported by the platform.
///
/// `Pending` stands for the empty status between launch and the first
/// successful poll. Anything that is neither `Pending` nor `Running`
/// is terminal; statuses outside the known set are carried verbatim in
/// `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Unknown,
    Other(String),
}

impl ExecutionStatus {
    /// Map a remote status string onto the typed status.
    pub fn from_remote(status: &str) -> Self {
        match status {
            "" => ExecutionStatus::Pending,
            "Running" => ExecutionStatus::Running,
            "Passed" => ExecutionStatus::Passed,
            "Failed" => ExecutionStatus::Failed,
            other => ExecutionStatus::Other(other.to_string()),
        }
    }

    /// Launched but not yet confirmed complete.
    pub fn is_active(&self) -> bool {
        matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Pending => f.write_str(""),
            ExecutionStatus::Running => f.write_str("Running"),
            ExecutionStatus::Passed => f.write_str("Passed"),
            ExecutionStatus::Failed => f.write_str("Failed"),
            ExecutionStatus::Unknown => f.write_str("Unknown"),
            ExecutionStatus::Other(s) => f.write_str(s),
        }
    }
}

/// A launched execution and its last observed state.
///
/// Created by the orchestrator at launch, mutated only by the status
/// poller, and read out by the report formatter at the end of the run.
#[derive(Debug, Clone)]
pub struct Execution {
    pub target: ExecutionTarget,
    /// Platform-assigned execution identifier.
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub total: u32,
    pub passes: u32,
    pub warns: u32,
    pub fails: u32,
    /// Opaque display string from the remote API.
    pub duration: String,
}

impl Execution {
    pub fn new(target: ExecutionTarget, execution_id: impl Into<String>) -> Self {
        Self {
            target,
            execution_id: execution_id.into(),
            status: ExecutionStatus::Pending,
            total: 0,
            passes: 0,
            warns: 0,
            fails: 0,
            duration: String::new(),
        }
    }

    /// Number of tests that reached a verdict.
    pub fn completed(&self) -> u32 {
        self.passes + self.warns + self.fails
    }
}

/// Scope of executions a poll pass waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitMode {
    /// Wait until all executions have finished.
    All,
    /// Wait only until all executions marked blocking have finished.
    Blocking,
    /// Wait until the number of active executions drops below the
    /// concurrency ceiling.
    Max,
}

/// The default value for the `T` template variable: the most recent
/// Monday, formatted `YYYY-MM-DD`.
pub fn default_date_t() -> String {
    let today = Local::now().date_naive();
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    monday.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loadscript_folder_forces_blocking() {
        let mut target = ExecutionTarget::new("Medication/_LoadResources");
        assert!(!target.blocks());
        target.set_loadscript_folder(true);
        assert!(target.blocks());
        assert_eq!(target.block_until_complete, Some(true));
    }

    #[test]
    fn blocking_defaults_to_false_when_unset() {
        let target = ExecutionTarget::new("Medication/Send");
        assert!(!target.blocks());
    }

    #[test]
    fn status_mapping_and_terminality() {
        assert_eq!(ExecutionStatus::from_remote(""), ExecutionStatus::Pending);
        assert!(ExecutionStatus::from_remote("Running").is_active());
        assert!(ExecutionStatus::from_remote("Passed").is_terminal());
        assert!(ExecutionStatus::from_remote("Failed").is_terminal());

        let other = ExecutionStatus::from_remote("Stopped");
        assert_eq!(other, ExecutionStatus::Other("Stopped".to_string()));
        assert!(other.is_terminal());
        assert_eq!(other.to_string(), "Stopped");
    }

    #[test]
    fn completed_sums_verdicts() {
        let mut execution = Execution::new(ExecutionTarget::new("Foo"), "12345");
        execution.passes = 3;
        execution.warns = 1;
        execution.fails = 2;
        assert_eq!(execution.completed(), 6);
    }

    #[test]
    fn date_t_is_a_monday() {
        let date = default_date_t();
        let parsed = chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d").unwrap();
        assert_eq!(parsed.weekday(), chrono::Weekday::Mon);
    }
}
