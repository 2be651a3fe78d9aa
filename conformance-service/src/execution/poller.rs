// Status poller
// Awaits in-flight executions by polling the remote status API on a
// shared pacing timer, and keeps the progress display current.

use std::io::Write;
use std::time::Duration;

use tokio::time::Instant;

use crate::api::{StatusApi, StatusReport};
use crate::error::ServiceResult;
use crate::execution::render::StatusDisplay;
use crate::targets::{AwaitMode, Execution, ExecutionStatus};

/// Default pacing between consecutive status requests.
const POLL_INTERVAL: Duration = Duration::from_secs(4);

/// Default ceiling for simultaneously active executions.
pub const MAX_PARALLEL_EXECUTIONS: usize = 4;

/// Polls the status API for a set of executions until the wait
/// condition of the requested mode clears.
#[derive(Debug)]
pub struct StatusPoller<A> {
    api: A,
    interval: Duration,
    max_parallel: usize,
}

impl<A: StatusApi> StatusPoller<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            interval: POLL_INTERVAL,
            max_parallel: MAX_PARALLEL_EXECUTIONS,
        }
    }

    /// Override the pacing interval (tests use zero).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Await executions according to `mode`:
    ///
    /// * `All` waits until every watched execution has finished.
    /// * `Blocking` waits only for active executions whose target
    ///   requires blocking.
    /// * `Max` waits until the number of active executions drops below
    ///   the concurrency ceiling.
    ///
    /// Returns immediately when the wait condition is already clear.
    /// There is no cancellation or deadline; a hung remote execution
    /// keeps this loop alive.
    pub async fn await_executions<W: Write>(
        &self,
        executions: &mut [Execution],
        mode: AwaitMode,
        display: &mut StatusDisplay<W>,
    ) -> ServiceResult<()> {
        let watched: Vec<usize> = match mode {
            AwaitMode::Blocking => executions
                .iter()
                .enumerate()
                .filter(|(_, e)| e.target.blocks() && e.status.is_active())
                .map(|(i, _)| i)
                .collect(),
            AwaitMode::All | AwaitMode::Max => (0..executions.len()).collect(),
        };

        let active = |executions: &[Execution]| {
            watched
                .iter()
                .filter(|&&i| executions[i].status.is_active())
                .count()
        };
        let need_to_wait = match mode {
            AwaitMode::Max => active(executions) >= self.max_parallel,
            AwaitMode::All | AwaitMode::Blocking => active(executions) > 0,
        };
        if !need_to_wait {
            return Ok(());
        }

        display.begin(mode)?;

        // One shared pacing timer for the whole loop: the total call
        // rate is throttled, not each execution's individually.
        let mut last_poll: Option<Instant> = None;
        let mut waiting = true;
        while waiting {
            for &i in &watched {
                if !executions[i].status.is_active() {
                    continue;
                }
                if let Some(last) = last_poll {
                    let elapsed = last.elapsed();
                    if elapsed < self.interval {
                        tokio::time::sleep(self.interval - elapsed).await;
                    }
                }
                let result = self.api.execution_status(&executions[i].execution_id).await;
                last_poll = Some(Instant::now());
                match result {
                    Ok(report) => apply_report(&mut executions[i], report),
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(_) => {
                        // Non-200 or malformed response: pin the
                        // execution to Unknown and never poll it again.
                        executions[i].status = ExecutionStatus::Unknown;
                    }
                }
            }

            display.redraw(watched.iter().map(|&i| &executions[i]))?;

            waiting = match mode {
                AwaitMode::Max => {
                    executions
                        .iter()
                        .filter(|e| e.status == ExecutionStatus::Running)
                        .count()
                        >= self.max_parallel
                }
                AwaitMode::All | AwaitMode::Blocking => watched
                    .iter()
                    .any(|&i| executions[i].status == ExecutionStatus::Running),
            };
        }

        display.finish(mode)
    }
}

fn apply_report(execution: &mut Execution, report: StatusReport) {
    execution.status = ExecutionStatus::from_remote(&report.status);
    execution.duration = report.duration;
    if let Some(counts) = report.counts {
        execution.total = counts.total;
        execution.passes = counts.passes;
        execution.warns = counts.warns;
        execution.fails = counts.fails;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StatusCounts;
    use crate::error::ServiceError;
    use crate::targets::ExecutionTarget;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses per execution id and records every
    /// request it receives.
    #[derive(Default)]
    struct ScriptedApi {
        responses: Mutex<HashMap<String, VecDeque<ServiceResult<StatusReport>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedApi {
        fn push(&self, id: &str, response: ServiceResult<StatusReport>) {
            self.responses
                .lock()
                .unwrap()
                .entry(id.to_string())
                .or_default()
                .push_back(response);
        }

        fn calls_for(&self, id: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| *c == id).count()
        }
    }

    #[async_trait]
    impl StatusApi for ScriptedApi {
        async fn execution_status(&self, execution_id: &str) -> ServiceResult<StatusReport> {
            self.calls.lock().unwrap().push(execution_id.to_string());
            self.responses
                .lock()
                .unwrap()
                .get_mut(execution_id)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| {
                    panic!("unexpected status request for '{}'", execution_id)
                })
        }
    }

    fn report(status: &str, total: u32, passes: u32, warns: u32, fails: u32) -> StatusReport {
        StatusReport {
            status: status.to_string(),
            duration: "00:10".to_string(),
            counts: Some(StatusCounts {
                total,
                passes,
                warns,
                fails,
            }),
        }
    }

    fn execution(id: &str, blocking: bool) -> Execution {
        let mut target = ExecutionTarget::new(format!("dev/{}", id));
        target.block_until_complete = Some(blocking);
        Execution::new(target, id)
    }

    fn poller(api: ScriptedApi) -> StatusPoller<ScriptedApi> {
        StatusPoller::new(api).with_interval(Duration::ZERO)
    }

    #[tokio::test]
    async fn running_then_passed_stops_polling() {
        let api = ScriptedApi::default();
        api.push(
            "e1",
            Ok(StatusReport {
                status: "Running".to_string(),
                duration: "00:05".to_string(),
                counts: Some(StatusCounts {
                    total: 10,
                    passes: 3,
                    warns: 0,
                    fails: 0,
                }),
            }),
        );
        api.push("e1", Ok(report("Passed", 10, 10, 0, 0)));

        let mut executions = vec![execution("e1", false)];
        let mut display = StatusDisplay::new(Vec::new());
        let poller = poller(api);
        poller
            .await_executions(&mut executions, AwaitMode::All, &mut display)
            .await
            .unwrap();

        assert_eq!(executions[0].status, ExecutionStatus::Passed);
        assert_eq!(executions[0].total, 10);
        assert_eq!(executions[0].passes, 10);
        assert_eq!(poller.api.calls_for("e1"), 2);
    }

    #[tokio::test]
    async fn transport_error_pins_unknown_without_retry() {
        let api = ScriptedApi::default();
        api.push(
            "e1",
            Err(ServiceError::PollTransport("HTTP 500".to_string())),
        );
        api.push("e2", Ok(report("Running", 4, 1, 0, 0)));
        api.push("e2", Ok(report("Passed", 4, 4, 0, 0)));

        let mut executions = vec![execution("e1", false), execution("e2", false)];
        let mut display = StatusDisplay::new(Vec::new());
        let poller = poller(api);
        poller
            .await_executions(&mut executions, AwaitMode::All, &mut display)
            .await
            .unwrap();

        assert_eq!(executions[0].status, ExecutionStatus::Unknown);
        assert_eq!(executions[1].status, ExecutionStatus::Passed);
        // The failed execution is never requested again.
        assert_eq!(poller.api.calls_for("e1"), 1);
    }

    #[tokio::test]
    async fn blocking_mode_ignores_non_blocking_executions() {
        let api = ScriptedApi::default();
        api.push("blocker", Ok(report("Passed", 2, 2, 0, 0)));

        let mut executions = vec![execution("blocker", true), execution("free", false)];
        let mut display = StatusDisplay::new(Vec::new());
        let poller = poller(api);
        poller
            .await_executions(&mut executions, AwaitMode::Blocking, &mut display)
            .await
            .unwrap();

        assert_eq!(executions[0].status, ExecutionStatus::Passed);
        // The non-blocking execution was never polled.
        assert_eq!(poller.api.calls_for("free"), 0);
        assert!(executions[1].status.is_active());
    }

    #[tokio::test]
    async fn max_mode_waits_until_below_ceiling() {
        let api = ScriptedApi::default();
        api.push("e1", Ok(report("Running", 5, 1, 0, 0)));
        api.push("e1", Ok(report("Passed", 5, 5, 0, 0)));
        api.push("e2", Ok(report("Passed", 5, 5, 0, 0)));

        let mut executions = vec![execution("e1", false), execution("e2", false)];
        let mut display = StatusDisplay::new(Vec::new());
        let poller = StatusPoller::new(api)
            .with_interval(Duration::ZERO)
            .with_max_parallel(2);
        poller
            .await_executions(&mut executions, AwaitMode::Max, &mut display)
            .await
            .unwrap();

        let active = executions.iter().filter(|e| e.status.is_active()).count();
        assert!(active < 2);
    }

    #[tokio::test]
    async fn max_mode_returns_immediately_below_ceiling() {
        let api = ScriptedApi::default();
        let mut executions = vec![execution("e1", false)];
        let mut display = StatusDisplay::new(Vec::new());
        let poller = poller(api);
        poller
            .await_executions(&mut executions, AwaitMode::Max, &mut display)
            .await
            .unwrap();
        // One active execution, ceiling four: no requests at all.
        assert!(poller.api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn counters_do_not_decrease_across_polls() {
        let api = ScriptedApi::default();
        api.push("e1", Ok(report("Running", 10, 2, 1, 0)));
        api.push("e1", Ok(report("Running", 10, 6, 1, 1)));
        api.push("e1", Ok(report("Passed", 10, 8, 1, 1)));

        let mut executions = vec![execution("e1", false)];
        let mut display = StatusDisplay::new(Vec::new());
        let poller = poller(api);
        poller
            .await_executions(&mut executions, AwaitMode::All, &mut display)
            .await
            .unwrap();

        assert_eq!(executions[0].passes, 8);
        assert_eq!(executions[0].completed(), 10);
    }

    #[tokio::test]
    async fn fatal_errors_abort_the_wait() {
        let api = ScriptedApi::default();
        api.push("e1", Err(ServiceError::Auth("no key".to_string())));

        let mut executions = vec![execution("e1", false)];
        let mut display = StatusDisplay::new(Vec::new());
        let poller = poller(api);
        let err = poller
            .await_executions(&mut executions, AwaitMode::All, &mut display)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Auth(_)));
    }
}
