//! Error handling module
//!
//! Uses `thiserror` for library errors with detailed error types.
//! Every error maps onto a small, fixed set of process exit statuses so the
//! launcher and its forked stages report failures the same way.

use std::io;
use std::process::ExitCode;
use thiserror::Error;

/// Exit statuses used by the launcher and by forked stages that fail before
/// replacing themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LaunchStatus {
    Success = 0,
    InvalidArguments = 1,
    PipeFailed = 2,
    ForkFailed = 3,
    RedirectFailed = 4,
    ExecFailed = 5,
    WaitFailed = 6,
    IoFailed = 7,
}

impl LaunchStatus {
    /// Raw status code as seen by the parent's `wait`
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map a raw exit code back onto a known status
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::InvalidArguments),
            2 => Some(Self::PipeFailed),
            3 => Some(Self::ForkFailed),
            4 => Some(Self::RedirectFailed),
            5 => Some(Self::ExecFailed),
            6 => Some(Self::WaitFailed),
            7 => Some(Self::IoFailed),
            _ => None,
        }
    }
}

impl From<LaunchStatus> for ExitCode {
    fn from(status: LaunchStatus) -> Self {
        ExitCode::from(status as u8)
    }
}

/// Error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Wrong number of command-line arguments
    #[error("{0}")]
    InvalidArguments(String),

    /// A stage description cannot be turned into an argv
    #[error("Invalid stage: {0}")]
    InvalidStage(String),

    /// pipe(2) failed, usually descriptor exhaustion
    #[error("Pipe error: {0}")]
    Pipe(#[source] nix::Error),

    /// fork(2) failed
    #[error("Fork error ({stage}): {source}")]
    Fork {
        stage: String,
        #[source]
        source: nix::Error,
    },

    /// dup2(2) onto a standard stream failed
    #[error("Redirect error ({stage}): {source}")]
    Redirect {
        stage: String,
        #[source]
        source: nix::Error,
    },

    /// execvp(3) returned
    #[error("Exec error ({program}): {source}")]
    Exec {
        program: String,
        #[source]
        source: nix::Error,
    },

    /// waitpid(2) failed for a reason other than interruption
    #[error("Wait error: {0}")]
    Wait(#[source] nix::Error),

    /// IO operation failed
    #[error("IO operation failed: {0}")]
    Io(#[from] io::Error),
}

impl PipelineError {
    /// Exit status a process should terminate with after reporting this error
    pub fn exit_status(&self) -> LaunchStatus {
        match self {
            Self::InvalidArguments(_) | Self::InvalidStage(_) => LaunchStatus::InvalidArguments,
            Self::Pipe(_) => LaunchStatus::PipeFailed,
            Self::Fork { .. } => LaunchStatus::ForkFailed,
            Self::Redirect { .. } => LaunchStatus::RedirectFailed,
            Self::Exec { .. } => LaunchStatus::ExecFailed,
            Self::Wait(_) => LaunchStatus::WaitFailed,
            // Only descriptor inspection produces these; no stage is involved.
            Self::Io(_) => LaunchStatus::IoFailed,
        }
    }
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
