// Report formatting
// Projects the final execution list into text: a bullet-list summary
// with direct execution links, or ticket-markup table rows for pasting
// into an issue tracker.

use std::fmt;
use std::str::FromStr;

use crate::targets::{Execution, ExecutionStatus};

/// Output projection for the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// One bullet per execution with a result glyph and link.
    Summary,
    /// One table-markup row per execution.
    Ticket,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(ReportFormat::Summary),
            "ticket" => Ok(ReportFormat::Ticket),
            other => Err(format!(
                "unknown report format '{}' (expected 'summary' or 'ticket')",
                other
            )),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Summary => write!(f, "summary"),
            ReportFormat::Ticket => write!(f, "ticket"),
        }
    }
}

/// Renders final execution state. Purely a projection; it never fails
/// and has no side effects.
#[derive(Debug)]
pub struct ReportFormatter {
    base_url: String,
}

impl ReportFormatter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn render(&self, format: ReportFormat, executions: &[Execution]) -> String {
        match format {
            ReportFormat::Summary => self.to_summary(executions),
            ReportFormat::Ticket => self.to_ticket_table(executions),
        }
    }

    /// Bullet list with one entry per execution and a direct link to
    /// its result page.
    pub fn to_summary(&self, executions: &[Execution]) -> String {
        let mut out = String::from("### Summary ###\n");
        for execution in executions {
            let glyph = if execution.fails > 0 {
                "❌"
            } else if execution.warns > 0 {
                "⚠️"
            } else {
                "✅"
            };
            let mut line = format!(
                "* {} [{}]({})",
                glyph,
                execution.target.rel_path,
                self.link(execution)
            );
            if execution.fails > 0 || execution.warns > 0 {
                line.push_str(": ");
                if execution.fails > 0 {
                    line.push_str(&format!("{} x failures", execution.fails));
                }
                if execution.warns > 0 {
                    if execution.fails > 0 {
                        line.push_str(", ");
                    }
                    line.push_str(&format!("{} x warnings", execution.warns));
                }
            }
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Table-markup rows for an issue tracker, one per execution.
    pub fn to_ticket_table(&self, executions: &[Execution]) -> String {
        let mut out = String::from("### Ticket table ###\n");
        for execution in executions {
            let mut line = format!("|{}|", execution.target.rel_path);
            line.push_str(if execution.status == ExecutionStatus::Passed {
                "(/)"
            } else {
                "(x)"
            });
            if execution.fails > 0 {
                line.push_str(&format!("\n{} x failures", execution.fails));
            }
            if execution.warns > 0 {
                line.push_str(&format!("\n{} x warnings", execution.warns));
            }
            line.push_str(&format!("| | |[{}]|", self.link(execution)));
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    fn link(&self, execution: &Execution) -> String {
        format!(
            "{}/execution?exec={}",
            self.base_url, execution.execution_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::ExecutionTarget;

    fn execution(path: &str, status: ExecutionStatus, passes: u32, warns: u32, fails: u32) -> Execution {
        let mut execution = Execution::new(ExecutionTarget::new(path), "exec-7");
        execution.status = status;
        execution.total = passes + warns + fails;
        execution.passes = passes;
        execution.warns = warns;
        execution.fails = fails;
        execution
    }

    fn formatter() -> ReportFormatter {
        ReportFormatter::new("https://conformance.example.org/app")
    }

    #[test]
    fn summary_links_each_execution() {
        let executions = vec![execution("dev/Medication", ExecutionStatus::Passed, 12, 0, 0)];
        let summary = formatter().to_summary(&executions);
        assert_eq!(
            summary,
            "### Summary ###\n\
             * ✅ [dev/Medication](https://conformance.example.org/app/execution?exec=exec-7)\n"
        );
    }

    #[test]
    fn summary_reports_warning_and_failure_counts() {
        let executions = vec![execution("dev/Vitals", ExecutionStatus::Failed, 5, 2, 3)];
        let summary = formatter().to_summary(&executions);
        assert!(summary.contains("* ❌ [dev/Vitals]"));
        assert!(summary.contains(": 3 x failures, 2 x warnings"));
    }

    #[test]
    fn summary_marks_warnings_without_failures() {
        let executions = vec![execution("dev/Labs", ExecutionStatus::Passed, 5, 2, 0)];
        let summary = formatter().to_summary(&executions);
        assert!(summary.contains("* ⚠️ [dev/Labs]"));
        assert!(summary.contains(": 2 x warnings"));
    }

    #[test]
    fn ticket_rows_use_pass_and_fail_marks() {
        let executions = vec![
            execution("dev/A", ExecutionStatus::Passed, 4, 0, 0),
            execution("dev/B", ExecutionStatus::Failed, 1, 1, 2),
        ];
        let table = formatter().to_ticket_table(&executions);
        assert!(table.contains("|dev/A|(/)| | |["));
        assert!(table.contains("|dev/B|(x)\n2 x failures\n1 x warnings| | |["));
    }

    #[test]
    fn unknown_status_is_not_a_pass() {
        let executions = vec![execution("dev/C", ExecutionStatus::Unknown, 0, 0, 0)];
        let table = formatter().to_ticket_table(&executions);
        assert!(table.contains("|dev/C|(x)|"));
    }

    #[test]
    fn format_parses_from_flag_values() {
        assert_eq!("summary".parse::<ReportFormat>(), Ok(ReportFormat::Summary));
        assert_eq!("ticket".parse::<ReportFormat>(), Ok(ReportFormat::Ticket));
        assert!("jira".parse::<ReportFormat>().is_err());
    }
}
