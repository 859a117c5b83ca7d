//! hive-admission — decides whether this node has room for an application.
//!
//! Capacity is the node tier's budget minus the system reserve minus what
//! the locally installed applications already hold. A request must stay
//! strictly below what is left in every dimension; CPU is compared in
//! tenths of a core.
//!
//! Usage is read fresh from the state store on every check. Callers run
//! the check right before each install or redeploy.

pub mod controller;
pub mod error;

pub use controller::{AdmissionController, available, check_fit};
pub use error::{AdmissionError, AdmissionResult};
