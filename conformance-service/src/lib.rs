// Conformance Service Library
// Core service for launching and awaiting conformance test executions

pub mod api;
pub mod catalog;
pub mod error;
pub mod execution;
pub mod frontend;
pub mod graph;
pub mod properties;
pub mod report;
pub mod targets;

// Re-export commonly used types
pub use error::{ServiceError, ServiceResult};

// Re-export target model types
pub use targets::{
    AwaitMode, Execution, ExecutionStatus, ExecutionTarget, TreeKind, UploadTarget,
};

// Re-export resolution types
pub use catalog::TargetCatalog;
pub use graph::{TargetGraph, UnwrapOutcome};
pub use properties::PropertyDocument;

// Re-export execution types
pub use execution::{ExecutionOrchestrator, OrchestratorConfig, StatusDisplay, StatusPoller};

// Re-export remote client types
pub use api::{ApiClient, Credentials, StatusApi};
pub use frontend::{FrontendSession, SuiteLauncher};

// Re-export report types
pub use report::{ReportFormat, ReportFormatter};
