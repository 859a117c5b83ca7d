//! In-memory container runtime and host for tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use hive_core::types::ImageRef;

use crate::error::{HostError, HostResult, RuntimeError, RuntimeResult};
use crate::host::{HostSystem, Volume};
use crate::runtime::{ContainerConfig, ContainerRuntime, ContainerSummary, PullEvent};

fn guard<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[derive(Debug, Clone)]
struct MemoryContainer {
    config: ContainerConfig,
    running: bool,
}

/// Container runtime keeping containers in a map.
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    networks: Mutex<HashSet<String>>,
    images: Mutex<HashSet<String>>,
    containers: Mutex<HashMap<String, MemoryContainer>>,
    failing_pulls: Mutex<HashSet<String>>,
    failing_starts: Mutex<HashSet<String>>,
    created: AtomicUsize,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make pulls of `repotag` fail.
    pub fn fail_pull(&self, repotag: &str) {
        guard(&self.failing_pulls).insert(repotag.to_string());
    }

    /// Make starting container `name` fail.
    pub fn fail_start(&self, name: &str) {
        guard(&self.failing_starts).insert(name.to_string());
    }

    /// Add a container directly, bypassing create.
    pub fn insert(&self, config: ContainerConfig, running: bool) {
        guard(&self.containers).insert(config.name.clone(), MemoryContainer { config, running });
    }

    /// Simulate a container exiting.
    pub fn stop(&self, name: &str) {
        if let Some(c) = guard(&self.containers).get_mut(name) {
            c.running = false;
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        guard(&self.containers)
            .get(name)
            .is_some_and(|c| c.running)
    }

    pub fn config(&self, name: &str) -> Option<ContainerConfig> {
        guard(&self.containers).get(name).map(|c| c.config.clone())
    }

    pub fn has_image(&self, repotag: &str) -> bool {
        guard(&self.images).contains(repotag)
    }

    pub fn has_network(&self, name: &str) -> bool {
        guard(&self.networks).contains(name)
    }

    /// Number of successful container creations so far.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn ensure_network(&self, name: &str) -> RuntimeResult<()> {
        guard(&self.networks).insert(name.to_string());
        Ok(())
    }

    async fn pull_image(&self, image: &ImageRef) -> RuntimeResult<mpsc::Receiver<PullEvent>> {
        let repotag = image.to_string();
        let (tx, rx) = mpsc::channel(4);
        let _ = tx.try_send(PullEvent::Progress {
            id: None,
            status: format!("Pulling from {}", image.repository()),
        });
        if guard(&self.failing_pulls).contains(&repotag) {
            let _ = tx.try_send(PullEvent::Failed("manifest unknown".to_string()));
        } else {
            guard(&self.images).insert(repotag);
            let _ = tx.try_send(PullEvent::Done);
        }
        Ok(rx)
    }

    async fn create_container(&self, config: &ContainerConfig) -> RuntimeResult<String> {
        let mut containers = guard(&self.containers);
        if containers.contains_key(&config.name) {
            return Err(RuntimeError::Api {
                status: 409,
                message: format!("container name {} is already in use", config.name),
            });
        }
        containers.insert(
            config.name.clone(),
            MemoryContainer {
                config: config.clone(),
                running: false,
            },
        );
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("id-{}", config.name))
    }

    async fn start_container(&self, name: &str) -> RuntimeResult<()> {
        if guard(&self.failing_starts).contains(name) {
            return Err(RuntimeError::Api {
                status: 500,
                message: "port is already allocated".to_string(),
            });
        }
        match guard(&self.containers).get_mut(name) {
            Some(c) => {
                c.running = true;
                Ok(())
            }
            None => Err(RuntimeError::NotFound(name.to_string())),
        }
    }

    async fn stop_container(&self, name: &str) -> RuntimeResult<()> {
        match guard(&self.containers).get_mut(name) {
            Some(c) => {
                c.running = false;
                Ok(())
            }
            None => Err(RuntimeError::NotFound(name.to_string())),
        }
    }

    async fn restart_container(&self, name: &str) -> RuntimeResult<()> {
        self.start_container(name).await
    }

    async fn remove_container(&self, name: &str) -> RuntimeResult<()> {
        guard(&self.containers)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))
    }

    async fn remove_image(&self, image: &str) -> RuntimeResult<()> {
        if guard(&self.images).remove(image) {
            Ok(())
        } else {
            Err(RuntimeError::NotFound(image.to_string()))
        }
    }

    async fn list_containers(&self, all: bool) -> RuntimeResult<Vec<ContainerSummary>> {
        Ok(guard(&self.containers)
            .values()
            .filter(|c| all || c.running)
            .map(|c| ContainerSummary {
                name: c.config.name.clone(),
                image: c.config.image.clone(),
                running: c.running,
            })
            .collect())
    }
}

/// Host keeping files, mounts, boot entries and firewall ports in memory.
#[derive(Debug, Default)]
pub struct MemoryHost {
    volumes: Mutex<Vec<Volume>>,
    /// Allocated files and their size in GB.
    files: Mutex<HashMap<PathBuf, u64>>,
    /// Mount point to backing file.
    mounts: Mutex<HashMap<PathBuf, PathBuf>>,
    boot_mounts: Mutex<HashSet<PathBuf>>,
    ports: Mutex<HashSet<u16>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host with one ext4 volume at `mount` with `available_gb` free.
    pub fn with_volume(mount: &str, available_gb: u64) -> Self {
        let host = Self::new();
        guard(&host.volumes).push(Volume {
            filesystem: "/dev/sdb1".to_string(),
            fs_type: "ext4".to_string(),
            mount: PathBuf::from(mount),
            available_gb,
        });
        host
    }

    pub fn has_file(&self, path: &str) -> bool {
        guard(&self.files).contains_key(Path::new(path))
    }

    pub fn file_size(&self, path: &str) -> Option<u64> {
        guard(&self.files).get(Path::new(path)).copied()
    }

    pub fn is_mounted(&self, mount_point: &str) -> bool {
        guard(&self.mounts).contains_key(Path::new(mount_point))
    }

    pub fn has_boot_mount(&self, mount_point: &str) -> bool {
        guard(&self.boot_mounts).contains(Path::new(mount_point))
    }

    pub fn port_open(&self, port: u16) -> bool {
        guard(&self.ports).contains(&port)
    }
}

fn command_failed(program: &str, stderr: String) -> HostError {
    HostError::Command {
        program: program.to_string(),
        status: "exit status: 1".to_string(),
        stderr,
    }
}

#[async_trait]
impl HostSystem for MemoryHost {
    async fn volumes(&self) -> HostResult<Vec<Volume>> {
        Ok(guard(&self.volumes).clone())
    }

    async fn allocate_volume(&self, file: &Path, size_gb: u64) -> HostResult<()> {
        guard(&self.files).insert(file.to_path_buf(), size_gb);
        Ok(())
    }

    async fn mount_volume(&self, file: &Path, mount_point: &Path) -> HostResult<()> {
        if !guard(&self.files).contains_key(file) {
            return Err(command_failed(
                "mount",
                format!("{}: No such file or directory", file.display()),
            ));
        }
        guard(&self.mounts).insert(mount_point.to_path_buf(), file.to_path_buf());
        Ok(())
    }

    async fn unmount_volume(&self, mount_point: &Path) -> HostResult<()> {
        match guard(&self.mounts).remove(mount_point) {
            Some(_) => Ok(()),
            None => Err(command_failed(
                "umount",
                format!("{}: not mounted", mount_point.display()),
            )),
        }
    }

    async fn remove_file(&self, file: &Path) -> HostResult<bool> {
        Ok(guard(&self.files).remove(file).is_some())
    }

    async fn add_boot_mount(&self, _file: &Path, mount_point: &Path) -> HostResult<()> {
        guard(&self.boot_mounts).insert(mount_point.to_path_buf());
        Ok(())
    }

    async fn remove_boot_mount(&self, mount_point: &Path) -> HostResult<()> {
        guard(&self.boot_mounts).remove(mount_point);
        Ok(())
    }

    async fn open_port(&self, port: u16) -> HostResult<()> {
        guard(&self.ports).insert(port);
        Ok(())
    }

    async fn close_port(&self, port: u16) -> HostResult<()> {
        guard(&self.ports).remove(&port);
        Ok(())
    }
}
