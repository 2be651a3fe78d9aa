// Execution engine
// Launch orchestration, status polling, and the in-place progress
// display.

pub mod orchestrator;
pub mod poller;
pub mod render;

pub use orchestrator::{ExecutionOrchestrator, OrchestratorConfig};
pub use poller::StatusPoller;
pub use render::StatusDisplay;
