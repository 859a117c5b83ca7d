//! Scheduler error types.

use thiserror::Error;

use hive_admission::AdmissionError;
use hive_lifecycle::LifecycleError;
use hive_registry::RegistryError;

/// Errors that end one iteration of a scheduler loop.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no tier matches a collateral of {coins} coins")]
    NoTier { coins: u64 },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("admission error: {0}")]
    Admission(#[from] AdmissionError),

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("chain error: {0}")]
    Chain(#[from] anyhow::Error),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
