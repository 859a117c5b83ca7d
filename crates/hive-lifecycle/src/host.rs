//! Host operations: filesystem listing, loop-mounted volumes, the boot
//! mount table, and firewall ports.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{HostError, HostResult};

/// A mounted filesystem as reported by `df`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub filesystem: String,
    pub fs_type: String,
    pub mount: PathBuf,
    pub available_gb: u64,
}

#[async_trait]
pub trait HostSystem: Send + Sync {
    /// Mounted filesystems.
    async fn volumes(&self) -> HostResult<Vec<Volume>>;

    /// Allocate a file of `size_gb` and format it.
    async fn allocate_volume(&self, file: &Path, size_gb: u64) -> HostResult<()>;

    /// Loop-mount `file` at `mount_point`, creating the directory.
    async fn mount_volume(&self, file: &Path, mount_point: &Path) -> HostResult<()>;

    async fn unmount_volume(&self, mount_point: &Path) -> HostResult<()>;

    /// Delete a file. Returns false if it did not exist.
    async fn remove_file(&self, file: &Path) -> HostResult<bool>;

    /// Record the mount so it is restored after a reboot.
    async fn add_boot_mount(&self, file: &Path, mount_point: &Path) -> HostResult<()>;

    async fn remove_boot_mount(&self, mount_point: &Path) -> HostResult<()>;

    async fn open_port(&self, port: u16) -> HostResult<()>;

    async fn close_port(&self, port: u16) -> HostResult<()>;
}

/// Line recorded in the crontab for a volume.
pub fn boot_mount_line(file: &Path, mount_point: &Path) -> String {
    format!(
        "@reboot mount -o loop {} {}",
        file.display(),
        mount_point.display()
    )
}

/// Parse `df --output=source,fstype,avail,target -B1` output.
pub fn parse_df(output: &str) -> HostResult<Vec<Volume>> {
    let mut volumes = Vec::new();
    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let [filesystem, fs_type, avail, mount] = fields.as_slice() else {
            return Err(HostError::Parse {
                what: "df line",
                line: line.to_string(),
            });
        };
        let bytes: u64 = avail.parse().map_err(|_| HostError::Parse {
            what: "df size",
            line: line.to_string(),
        })?;
        volumes.push(Volume {
            filesystem: filesystem.to_string(),
            fs_type: fs_type.to_string(),
            mount: PathBuf::from(*mount),
            available_gb: bytes / 1_000_000_000,
        });
    }
    Ok(volumes)
}

/// [`HostSystem`] that shells out to the standard Linux tools.
#[derive(Debug, Default, Clone)]
pub struct ShellHost;

impl ShellHost {
    pub fn new() -> Self {
        Self
    }
}

async fn run(program: &str, args: &[&str]) -> HostResult<String> {
    debug!(%program, ?args, "running host command");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(HostError::Command {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn read_crontab() -> HostResult<String> {
    // `crontab -l` fails when the user has no crontab yet.
    Ok(run("crontab", &["-l"]).await.unwrap_or_default())
}

async fn write_crontab(content: &str) -> HostResult<()> {
    let mut child = Command::new("crontab")
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(content.as_bytes()).await?;
    }
    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Err(HostError::Command {
            program: "crontab".to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

#[async_trait]
impl HostSystem for ShellHost {
    async fn volumes(&self) -> HostResult<Vec<Volume>> {
        let out = run("df", &["--output=source,fstype,avail,target", "-B1"]).await?;
        parse_df(&out)
    }

    async fn allocate_volume(&self, file: &Path, size_gb: u64) -> HostResult<()> {
        let file = path_str(file);
        run("fallocate", &["-l", &format!("{size_gb}G"), &file]).await?;
        run("mkfs.ext4", &["-q", "-F", &file]).await?;
        Ok(())
    }

    async fn mount_volume(&self, file: &Path, mount_point: &Path) -> HostResult<()> {
        tokio::fs::create_dir_all(mount_point).await?;
        run("mount", &["-o", "loop", &path_str(file), &path_str(mount_point)]).await?;
        Ok(())
    }

    async fn unmount_volume(&self, mount_point: &Path) -> HostResult<()> {
        run("umount", &[&path_str(mount_point)]).await?;
        Ok(())
    }

    async fn remove_file(&self, file: &Path) -> HostResult<bool> {
        match tokio::fs::remove_file(file).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn add_boot_mount(&self, file: &Path, mount_point: &Path) -> HostResult<()> {
        let line = boot_mount_line(file, mount_point);
        let current = read_crontab().await?;
        if current.lines().any(|l| l.trim() == line) {
            return Ok(());
        }
        let mut updated = current;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&line);
        updated.push('\n');
        write_crontab(&updated).await
    }

    async fn remove_boot_mount(&self, mount_point: &Path) -> HostResult<()> {
        let suffix = format!(" {}", mount_point.display());
        let current = read_crontab().await?;
        let kept: Vec<&str> = current
            .lines()
            .filter(|l| !(l.starts_with("@reboot") && l.trim_end().ends_with(&suffix)))
            .collect();
        let mut updated = kept.join("\n");
        updated.push('\n');
        write_crontab(&updated).await
    }

    async fn open_port(&self, port: u16) -> HostResult<()> {
        run("ufw", &["allow", &port.to_string()]).await?;
        Ok(())
    }

    async fn close_port(&self, port: u16) -> HostResult<()> {
        run("ufw", &["delete", "allow", &port.to_string()]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_df_output() {
        let out = "\
Filesystem     Type     Avail Mounted on
/dev/sda1      ext4     120000000000 /
tmpfs          tmpfs    1000000000 /run
/dev/sdb1      xfs      2500000000000 /mnt/data
";
        let volumes = parse_df(out).unwrap();
        assert_eq!(volumes.len(), 3);
        assert_eq!(volumes[0].mount, PathBuf::from("/"));
        assert_eq!(volumes[0].available_gb, 120);
        assert_eq!(volumes[1].fs_type, "tmpfs");
        assert_eq!(volumes[2].available_gb, 2500);
    }

    #[test]
    fn malformed_df_line_is_an_error() {
        let out = "Filesystem Type Avail Mounted\n/dev/sda1 ext4 lots /\n";
        assert!(matches!(parse_df(out), Err(HostError::Parse { .. })));
    }

    #[test]
    fn boot_mount_line_format() {
        let line = boot_mount_line(
            Path::new("/mnt/data/demoapp.hivevol"),
            Path::new("/var/lib/hive/apps/demoapp"),
        );
        assert_eq!(
            line,
            "@reboot mount -o loop /mnt/data/demoapp.hivevol /var/lib/hive/apps/demoapp"
        );
    }

    #[tokio::test]
    async fn removing_missing_file_reports_false() {
        let dir = std::env::temp_dir().join("hive-host-test-missing.hivevol");
        assert!(!ShellHost::new().remove_file(&dir).await.unwrap());
    }
}
