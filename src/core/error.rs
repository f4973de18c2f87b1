use thiserror::Error;

/// Everything that can end an execution early or refuse to create one.
///
/// The first three variants are the fatal taxonomy surfaced by a running
/// execution; the rest are raised before or around the loop (bad inputs,
/// misuse of the subscription surface, unknown registry ids).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("control protocol error: unrecognized signal kind '{kind}'")]
    ControlProtocol { kind: String },

    #[error("upstream fetch failed for {url}: {status}")]
    UpstreamFetch { url: String, status: String },

    #[error("internal fault: {0}")]
    Internal(String),

    #[error("invalid input '{name}': {reason}")]
    InvalidInput { name: String, reason: String },

    #[error("output key '{0}' is not declared by this execution")]
    UndeclaredOutput(String),

    #[error("execution already has an active subscriber")]
    AlreadySubscribed,

    #[error("no execution type registered under '{0}'")]
    UnknownExecutionType(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ExecutionError {
    pub fn internal(msg: impl Into<String>) -> Self {
        ExecutionError::Internal(msg.into())
    }

    pub fn invalid_input(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ExecutionError::InvalidInput {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True for the variants that terminate a running execution.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExecutionError::ControlProtocol { .. }
                | ExecutionError::UpstreamFetch { .. }
                | ExecutionError::Internal(_)
        )
    }
}

impl From<serde_json::Error> for ExecutionError {
    fn from(err: serde_json::Error) -> Self {
        ExecutionError::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
