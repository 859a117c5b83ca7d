use thiserror::Error;

use hive_core::ResourceKind;
use hive_state::StateError;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("insufficient {resource}: requested {requested}, available {available}")]
    Insufficient {
        resource: ResourceKind,
        requested: u64,
        available: u64,
    },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type AdmissionResult<T> = Result<T, AdmissionError>;
