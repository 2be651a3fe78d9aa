// Execution orchestrator
// Drives a flattened target sequence: throttles launches against the
// concurrency ceiling, honors per-target blocking, and drains the
// remaining executions at the end of the run.

use std::io::Write;
use std::time::Duration;

use crate::api::StatusApi;
use crate::error::ServiceResult;
use crate::execution::poller::{StatusPoller, MAX_PARALLEL_EXECUTIONS};
use crate::execution::render::StatusDisplay;
use crate::frontend::SuiteLauncher;
use crate::targets::{AwaitMode, Execution, ExecutionTarget};

/// Run-wide orchestration settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Ceiling for simultaneously active executions.
    pub max_parallel: usize,
    /// Pacing between consecutive status requests.
    pub poll_interval: Duration,
    /// Launch everything but skip the final drain.
    pub start_only: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel: MAX_PARALLEL_EXECUTIONS,
            poll_interval: Duration::from_secs(4),
            start_only: false,
        }
    }
}

/// Owns the executions of one run and the collaborators needed to
/// launch and await them.
pub struct ExecutionOrchestrator<L, A, W: Write> {
    launcher: L,
    poller: StatusPoller<A>,
    display: StatusDisplay<W>,
    executions: Vec<Execution>,
    start_only: bool,
}

impl<L, A, W> ExecutionOrchestrator<L, A, W>
where
    L: SuiteLauncher,
    A: StatusApi,
    W: Write,
{
    pub fn new(launcher: L, api: A, display: StatusDisplay<W>, config: OrchestratorConfig) -> Self {
        Self {
            launcher,
            poller: StatusPoller::new(api)
                .with_interval(config.poll_interval)
                .with_max_parallel(config.max_parallel),
            display,
            executions: Vec::new(),
            start_only: config.start_only,
        }
    }

    /// Launch the targets strictly in the given order.
    ///
    /// Before each launch the poller runs in MAX mode so the number of
    /// active executions never exceeds the ceiling. After a successful
    /// launch of a blocking target the poller runs in BLOCKING mode,
    /// unless that target is the very last of a start-only run. Unless
    /// start-only is set, a final ALL wait drains every remaining
    /// execution.
    pub async fn execute_targets(&mut self, targets: Vec<ExecutionTarget>) -> ServiceResult<()> {
        let count = targets.len();
        for (i, target) in targets.into_iter().enumerate() {
            self.poller
                .await_executions(&mut self.executions, AwaitMode::Max, &mut self.display)
                .await?;

            let blocks = target.blocks();
            self.display
                .note(&format!("- Setting up {}", target.rel_path))?;
            let launched = match self.launcher.launch(&target).await {
                Ok(execution_id) => {
                    self.display
                        .note(&format!("  execution started with id {}", execution_id))?;
                    self.executions.push(Execution::new(target, execution_id));
                    true
                }
                Err(err) => {
                    // The target gets no execution; the run continues
                    // with the remaining targets.
                    self.display.note(&format!("  {}", err))?;
                    false
                }
            };

            if launched && blocks && !(self.start_only && i == count - 1) {
                self.poller
                    .await_executions(&mut self.executions, AwaitMode::Blocking, &mut self.display)
                    .await?;
            }
        }

        if !self.start_only {
            self.poller
                .await_executions(&mut self.executions, AwaitMode::All, &mut self.display)
                .await?;
        }
        Ok(())
    }

    pub fn executions(&self) -> &[Execution] {
        &self.executions
    }

    pub fn into_executions(self) -> Vec<Execution> {
        self.executions
    }
}
