//! Lifecycle error types.

use thiserror::Error;

use hive_admission::AdmissionError;
use hive_state::StateError;

/// Errors from the container runtime API.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("runtime API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("runtime unreachable: {0}")]
    Http(#[from] hive_core::net::HttpError),

    #[error("unexpected runtime response: {0}")]
    Decode(String),

    #[error("image pull failed: {0}")]
    Pull(String),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors from host operations (volumes, mounts, firewall).
#[derive(Debug, Error)]
pub enum HostError {
    #[error("`{program}` exited with {status}: {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no volume has {needed_gb} GB free")]
    NoVolume { needed_gb: u64 },

    #[error("unparseable {what}: {line}")]
    Parse { what: &'static str, line: String },
}

pub type HostResult<T> = Result<T, HostError>;

/// Errors surfaced by lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{0} is already installed")]
    AlreadyInstalled(String),

    #[error("{0} is not installed")]
    NotInstalled(String),

    #[error("invalid repository reference: {0}")]
    InvalidImage(String),

    #[error("admission rejected: {0}")]
    Admission(#[from] AdmissionError),

    #[error("container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("host error: {0}")]
    Host(#[from] HostError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
