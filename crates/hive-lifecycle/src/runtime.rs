//! Container runtime interface.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

use hive_core::types::ImageRef;

use crate::error::RuntimeResult;

/// One item of an image pull stream. A stream always ends with `Done` or
/// `Failed`; a stream that closes without either is a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullEvent {
    Progress { id: Option<String>, status: String },
    Done,
    Failed(String),
}

/// Everything needed to create an application container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerConfig {
    pub name: String,
    pub image: String,
    pub network: String,
    pub env: Vec<String>,
    pub cmd: Vec<String>,
    pub container_port: u16,
    pub host_port: u16,
    /// CPU limit in units of 1e-9 cores.
    pub nano_cpus: u64,
    pub memory_bytes: u64,
    /// Host directory bind-mounted at `container_path`.
    pub volume_host_path: PathBuf,
    pub volume_container_path: String,
}

/// A container as listed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    /// Name without the leading `/`.
    pub name: String,
    pub image: String,
    pub running: bool,
}

/// The subset of the container runtime the lifecycle manager drives.
///
/// Operations on a missing container or image return
/// [`RuntimeError::NotFound`](crate::error::RuntimeError::NotFound).
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create the bridge network if it does not exist.
    async fn ensure_network(&self, name: &str) -> RuntimeResult<()>;

    /// Start pulling an image; progress arrives on the returned channel.
    async fn pull_image(&self, image: &ImageRef) -> RuntimeResult<mpsc::Receiver<PullEvent>>;

    /// Create a container and return its id.
    async fn create_container(&self, config: &ContainerConfig) -> RuntimeResult<String>;

    async fn start_container(&self, name: &str) -> RuntimeResult<()>;

    async fn stop_container(&self, name: &str) -> RuntimeResult<()>;

    async fn restart_container(&self, name: &str) -> RuntimeResult<()>;

    async fn remove_container(&self, name: &str) -> RuntimeResult<()>;

    async fn remove_image(&self, image: &str) -> RuntimeResult<()>;

    /// List containers; with `all` stopped ones are included.
    async fn list_containers(&self, all: bool) -> RuntimeResult<Vec<ContainerSummary>>;
}
