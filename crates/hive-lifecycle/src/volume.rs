//! Backing volume placement for an application.
//!
//! Each application gets a loop-mounted file `<volume>/<name>.hivevol`
//! sized to its `hdd`, mounted at `<apps_folder>/<name>`.

use std::path::{Path, PathBuf};

use crate::host::Volume;

/// Filesystem types that never hold application volumes.
const PSEUDO_FILESYSTEMS: &[&str] = &[
    "tmpfs", "devtmpfs", "overlay", "squashfs", "proc", "sysfs", "cgroup", "cgroup2", "devpts",
    "mqueue", "efivarfs", "fuse.lxcfs",
];

/// Suffix of volume files.
pub const VOLUME_EXTENSION: &str = "hivevol";

fn is_candidate(volume: &Volume) -> bool {
    !PSEUDO_FILESYSTEMS.contains(&volume.fs_type.as_str())
        && !volume.filesystem.starts_with("/dev/loop")
        && !volume.mount.starts_with("/boot")
}

/// First real volume with more than `requested_gb + reserve_gb` free.
pub fn select_volume(volumes: &[Volume], requested_gb: u64, reserve_gb: u64) -> Option<&Volume> {
    let needed = requested_gb.saturating_add(reserve_gb);
    volumes
        .iter()
        .filter(|v| is_candidate(v))
        .find(|v| v.available_gb > needed)
}

/// Backing file of `name` on a volume mounted at `mount`.
pub fn volume_file(mount: &Path, name: &str) -> PathBuf {
    mount.join(format!("{name}.{VOLUME_EXTENSION}"))
}

/// Where the volume of `name` is mounted.
pub fn mount_point(apps_folder: &Path, name: &str) -> PathBuf {
    apps_folder.join(name)
}

/// Volumes that could hold a backing file, for cleanup.
pub fn candidates(volumes: &[Volume]) -> impl Iterator<Item = &Volume> {
    volumes.iter().filter(|v| is_candidate(v))
}
