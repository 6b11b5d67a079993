//! Scoped redirection of a stage's standard streams

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::unistd::dup2;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};

/// Where a stage reads from and writes to.
///
/// `None` means the stream is inherited unchanged. Every descriptor held here
/// is consumed by [`StageIo::apply`]; anything else the stage owned must be
/// dropped before that call.
#[derive(Debug, Default)]
pub struct StageIo {
    pub stdin: Option<OwnedFd>,
    pub stdout: Option<OwnedFd>,
}

impl StageIo {
    pub fn new(stdin: Option<OwnedFd>, stdout: Option<OwnedFd>) -> Self {
        Self { stdin, stdout }
    }

    /// Remap the held descriptors onto fd 0 and fd 1 and close the originals
    pub fn apply(self) -> nix::Result<()> {
        if let Some(fd) = self.stdin {
            remap(fd, libc::STDIN_FILENO)?;
        }
        if let Some(fd) = self.stdout {
            remap(fd, libc::STDOUT_FILENO)?;
        }
        Ok(())
    }
}

fn remap(fd: OwnedFd, target: RawFd) -> nix::Result<()> {
    if fd.as_raw_fd() == target {
        // Already in place: keep it open across exec instead of closing it.
        fcntl(target, FcntlArg::F_SETFD(FdFlag::empty()))?;
        let _ = fd.into_raw_fd();
        return Ok(());
    }
    // dup2 never copies FD_CLOEXEC; dropping `fd` closes the original.
    dup2(fd.as_raw_fd(), target)?;
    Ok(())
}
