//! Pipe acquisition
//!
//! A `PipePair` owns both ends of one OS pipe. Ends that are not moved into a
//! stage's redirection are closed when they go out of scope, which is what
//! lets the downstream reader see end-of-input.
//!
//! Both ends are created close-on-exec. Redirecting an end onto a standard
//! stream clears the flag on the copy, so only fd 0 and fd 1 survive `exec`.

use crate::errors::{PipelineError, PipelineResult};
use std::os::fd::OwnedFd;

/// Both ends of a unidirectional pipe
#[derive(Debug)]
pub struct PipePair {
    /// Read end, becomes the downstream stage's stdin
    pub read: OwnedFd,
    /// Write end, becomes the upstream stage's stdout
    pub write: OwnedFd,
}

impl PipePair {
    /// Request a new pipe from the OS
    pub fn acquire() -> PipelineResult<Self> {
        let (read, write) = pipe_cloexec().map_err(PipelineError::Pipe)?;
        Ok(Self { read, write })
    }

    /// Split into `(read, write)`
    pub fn into_ends(self) -> (OwnedFd, OwnedFd) {
        (self.read, self.write)
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn pipe_cloexec() -> nix::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::OFlag;
    nix::unistd::pipe2(OFlag::O_CLOEXEC)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn pipe_cloexec() -> nix::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    use std::os::fd::AsRawFd;

    let (read, write) = nix::unistd::pipe()?;
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read, write))
}
