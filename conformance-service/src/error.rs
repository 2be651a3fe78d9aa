// Service error types
// One taxonomy for the whole crate; only config and auth failures are
// fatal to a run.

use thiserror::Error;

/// Result alias used throughout the service crate.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors produced while resolving or orchestrating conformance runs.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The property document could not be parsed as the expected shape.
    #[error("invalid property document: {0}")]
    Config(String),

    /// A target could not be fully resolved through property inheritance.
    #[error("couldn't get the {attribute} from the properties for {path}")]
    Resolution {
        attribute: &'static str,
        path: String,
    },

    /// A named target declaration refers back to itself.
    #[error("cycle in target declarations while resolving '{0}'")]
    Cycle(String),

    /// A requested target name or ordinal is not declared.
    #[error("no such target: {0}")]
    UnknownTarget(String),

    /// The web frontend could not start an execution for a target.
    #[error("couldn't start execution for {path}: {reason}")]
    Launch { path: String, reason: String },

    /// Login against the platform (frontend or API) failed.
    #[error("couldn't login into the conformance platform: {0}")]
    Auth(String),

    /// A status poll returned a non-200 or malformed response.
    #[error("status request failed: {0}")]
    PollTransport(String),

    /// The HTTP client itself could not be constructed.
    #[error("http client error: {0}")]
    Http(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid property document: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ServiceError {
    /// Whether this error must abort the whole run rather than a
    /// single target.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ServiceError::Config(_) | ServiceError::Auth(_) | ServiceError::Yaml(_)
        )
    }
}
