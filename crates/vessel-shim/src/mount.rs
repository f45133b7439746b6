//! Rootfs unmount on container deletion.

use std::io;
use std::path::Path;

/// Unmount every mount stacked on `target`.
///
/// Succeeds when `target` is missing or no longer a mount point.
#[cfg(target_os = "linux")]
pub fn unmount_all(target: &Path) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::mount::{umount2, MntFlags};

    if !target.exists() {
        return Ok(());
    }
    loop {
        match umount2(target, MntFlags::empty()) {
            Ok(()) => tracing::debug!(target = %target.display(), "Unmounted"),
            Err(Errno::EINVAL) | Err(Errno::ENOENT) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Unmount every mount stacked on `target`. No-op off Linux.
#[cfg(not(target_os = "linux"))]
pub fn unmount_all(_target: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_target_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(unmount_all(&dir.path().join("rootfs")).is_ok());
    }
}
