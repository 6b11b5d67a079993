//! Utility functions for pipeline construction and inspection

use crate::errors::{PipelineError, PipelineResult};
use std::ffi::{CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::time::{Duration, Instant};

/// Measure the execution time of a closure
pub fn measure_time<T, F>(operation: F) -> (T, Duration)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = operation();
    let duration = start.elapsed();
    (result, duration)
}

/// Convert an OS string to a C-compatible string, byte for byte
pub fn to_cstring<S: AsRef<OsStr>>(s: S) -> PipelineResult<CString> {
    let s = s.as_ref();
    CString::new(s.as_bytes()).map_err(|e| {
        PipelineError::InvalidStage(format!(
            "{:?} contains a NUL byte at offset {}",
            s,
            e.nul_position()
        ))
    })
}

/// Platform-specific descriptor utilities
#[cfg(unix)]
pub mod unix {
    use crate::errors::PipelineResult;
    use std::os::unix::io::RawFd;

    /// List the descriptors currently open in this process
    ///
    /// The descriptor used to read the directory itself is excluded.
    pub fn open_descriptors() -> PipelineResult<Vec<RawFd>> {
        let dir = if cfg!(target_os = "linux") {
            "/proc/self/fd"
        } else {
            "/dev/fd"
        };

        // Collect first so the directory handle is closed before we probe.
        let candidates: Vec<RawFd> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();

        let mut fds: Vec<RawFd> = candidates
            .into_iter()
            .filter(|&fd| is_open(fd))
            .collect();
        fds.sort_unstable();
        Ok(fds)
    }

    /// Whether `fd` refers to an open descriptor
    pub fn is_open(fd: RawFd) -> bool {
        use nix::fcntl::{fcntl, FcntlArg};
        fcntl(fd, FcntlArg::F_GETFD).is_ok()
    }
}
