//! hive-lifecycle — runs applications on this node.
//!
//! [`LifecycleManager`] installs, removes, restarts and redeploys
//! application containers. It talks to the container runtime through
//! [`ContainerRuntime`] (implemented over the Docker Engine API by
//! [`DockerRuntime`]) and to the host through [`HostSystem`] (volumes,
//! boot mounts, firewall; implemented by [`ShellHost`]).
//!
//! Each application gets a loop-mounted volume file sized to its `hdd`
//! and bind-mounted into the container, a firewall opening for its port,
//! and a container named after it on the shared bridge network.

pub mod docker;
pub mod error;
pub mod host;
pub mod locks;
pub mod manager;
pub mod runtime;
pub mod volume;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use docker::DockerRuntime;
pub use error::{
    HostError, HostResult, LifecycleError, LifecycleResult, RuntimeError, RuntimeResult,
};
pub use host::{HostSystem, ShellHost, Volume};
pub use manager::{AppState, LifecycleManager};
pub use runtime::{ContainerConfig, ContainerRuntime, ContainerSummary, PullEvent};
