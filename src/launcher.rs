//! Pipeline construction, stage execution and completion
//!
//! The launcher forks exactly one child. That child builds the rest of the
//! chain from the consumer back to the producer: on every step it acquires the
//! pipe feeding the current stage, forks, turns itself into the current stage
//! and leaves the upstream part of the chain to its own child.
//!
//! ```text
//! launcher ── waits
//!   └─ wc -l          (stdin  <- pipe A)
//!        └─ grep term (stdin  <- pipe B, stdout -> pipe A)
//!             └─ ps -A            (stdout -> pipe B)
//! ```

use crate::errors::{LaunchStatus, PipelineError, PipelineResult};
use crate::pipe::PipePair;
use crate::redirect::StageIo;
use crate::stage::{PipelineSpec, StageCommand};
use crate::utils::measure_time;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{wait, waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which processes the launcher waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReapPolicy {
    /// Wait for the final stage only. Upstream stages are reaped by init
    /// after their parent stage exits.
    #[default]
    DirectChild,
    /// Adopt every stage as a child subreaper and wait until none is left.
    /// Falls back to `DirectChild` where subreapers are unavailable.
    ///
    /// The subreaper attribute is never cleared: once a launcher with this
    /// policy has run, the calling process adopts orphaned descendants for
    /// the rest of its life, including ones unrelated to any pipeline.
    AllDescendants,
}

/// How a reaped process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Exited(i32),
    Signaled(Signal),
}

impl StageOutcome {
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            Self::Signaled(_) => None,
        }
    }

    /// The launcher failure this outcome stands for, if it is one of ours
    pub fn launch_failure(&self) -> Option<LaunchStatus> {
        self.code()
            .and_then(LaunchStatus::from_code)
            .filter(|status| *status != LaunchStatus::Success)
    }
}

/// A pipeline process collected by the launcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReapedStage {
    pub pid: Pid,
    pub outcome: StageOutcome,
}

impl ReapedStage {
    fn from_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(pid, code) => Some(Self {
                pid,
                outcome: StageOutcome::Exited(code),
            }),
            WaitStatus::Signaled(pid, signal, _) => Some(Self {
                pid,
                outcome: StageOutcome::Signaled(signal),
            }),
            _ => None,
        }
    }
}

/// What the launcher observed while the pipeline ran
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Reaped processes, final stage first
    pub stages: Vec<ReapedStage>,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn final_stage(&self) -> Option<&ReapedStage> {
        self.stages.first()
    }

    pub fn all_succeeded(&self) -> bool {
        self.stages.iter().all(|s| s.outcome.success())
    }
}

/// Builds and runs a pipeline, then waits for it
#[derive(Debug, Clone, Default)]
pub struct Launcher {
    reap: ReapPolicy,
}

impl Launcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reaping policy
    pub fn reap(mut self, policy: ReapPolicy) -> Self {
        self.reap = policy;
        self
    }

    /// Run `spec` with the final stage writing to the inherited stdout
    ///
    /// Returns once the pipeline has finished, whatever the stages' exit
    /// codes were. Errors are limited to failures of the launcher itself.
    pub fn run(&self, spec: &PipelineSpec) -> PipelineResult<PipelineReport> {
        self.launch(spec, None)
    }

    /// Run `spec` with the final stage writing to `sink`
    pub fn run_into(&self, spec: &PipelineSpec, sink: OwnedFd) -> PipelineResult<PipelineReport> {
        self.launch(spec, Some(sink))
    }

    fn launch(&self, spec: &PipelineSpec, sink: Option<OwnedFd>) -> PipelineResult<PipelineReport> {
        info!(pipeline = %spec, "launching pipeline");
        let policy = self.prepare_reaping();
        let consumer = &spec.stages()[spec.len() - 1];

        let (stages, elapsed) = measure_time(|| {
            match unsafe { fork() } {
                Err(source) => Err(PipelineError::Fork {
                    stage: consumer.label().to_string(),
                    source,
                }),
                Ok(ForkResult::Child) => build_chain(spec, sink),
                Ok(ForkResult::Parent { child }) => {
                    // The sink now lives in the child only.
                    drop(sink);
                    debug!(pid = %child, stage = %consumer, "spawned final stage");
                    collect(child, policy)
                }
            }
        });
        let stages = stages?;

        for stage in &stages {
            debug!(pid = %stage.pid, outcome = ?stage.outcome, "reaped pipeline process");
            if let Some(status) = stage.outcome.launch_failure() {
                debug!(pid = %stage.pid, ?status, "stage failed before running its program");
            }
        }
        info!(reaped = stages.len(), ?elapsed, "pipeline finished");

        Ok(PipelineReport { stages, elapsed })
    }

    fn prepare_reaping(&self) -> ReapPolicy {
        match self.reap {
            ReapPolicy::DirectChild => ReapPolicy::DirectChild,
            ReapPolicy::AllDescendants => match become_subreaper() {
                Ok(()) => ReapPolicy::AllDescendants,
                Err(e) => {
                    warn!(error = %e, "cannot adopt upstream stages, waiting for the final stage only");
                    ReapPolicy::DirectChild
                }
            },
        }
    }
}

/// Runs in the launcher's only child and never returns.
///
/// No allocation happens here outside of error reporting: every argv and its
/// `execvp` pointer array were built by `PipelineSpec` before the first fork.
fn build_chain(spec: &PipelineSpec, sink: Option<OwnedFd>) -> ! {
    let stages = spec.stages();
    let mut downstream = sink;
    let mut index = stages.len() - 1;

    loop {
        let stage = &stages[index];
        if index == 0 {
            exec_stage(stage, StageIo::new(None, downstream));
        }

        let PipePair { read, write } = match PipePair::acquire() {
            Ok(pair) => pair,
            Err(e) => abort_stage(&e),
        };

        match unsafe { fork() } {
            Err(source) => abort_stage(&PipelineError::Fork {
                stage: stages[index - 1].label().to_string(),
                source,
            }),
            Ok(ForkResult::Parent { .. }) => {
                drop(write);
                exec_stage(stage, StageIo::new(Some(read), downstream));
            }
            Ok(ForkResult::Child) => {
                drop(read);
                // Replacing `downstream` closes this process's copy of the
                // previous pipe's write end.
                downstream = Some(write);
                index -= 1;
            }
        }
    }
}

/// Redirect, then replace the process image with the stage's program
fn exec_stage(stage: &StageCommand, io: StageIo) -> ! {
    if let Err(source) = io.apply() {
        abort_stage(&PipelineError::Redirect {
            stage: stage.label().to_string(),
            source,
        });
    }

    // libc directly: nix's execvp collects a fresh pointer array, and this
    // process may be a fork of a multithreaded parent.
    unsafe { libc::execvp(stage.program().as_ptr(), stage.exec_argv()) };
    let source = Errno::last();
    abort_stage(&PipelineError::Exec {
        program: stage.program().to_string_lossy().into_owned(),
        source,
    })
}

/// Report on stderr and terminate a forked process without unwinding
fn abort_stage(error: &PipelineError) -> ! {
    let _ = writeln!(io::stderr(), "{}", error);
    unsafe { libc::_exit(error.exit_status().code()) }
}

fn collect(child: Pid, policy: ReapPolicy) -> PipelineResult<Vec<ReapedStage>> {
    let mut reaped = Vec::new();

    loop {
        match waitpid(child, None) {
            Ok(status) => {
                if let Some(stage) = ReapedStage::from_status(status) {
                    reaped.push(stage);
                    break;
                }
            }
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(PipelineError::Wait(e)),
        }
    }

    if policy == ReapPolicy::AllDescendants {
        loop {
            match wait() {
                Ok(status) => reaped.extend(ReapedStage::from_status(status)),
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => break,
                Err(e) => return Err(PipelineError::Wait(e)),
            }
        }
    }

    Ok(reaped)
}

#[cfg(target_os = "linux")]
fn become_subreaper() -> io::Result<()> {
    let result = unsafe {
        libc::prctl(
            libc::PR_SET_CHILD_SUBREAPER,
            1 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
        )
    };
    if result == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn become_subreaper() -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "child subreapers are only available on Linux",
    ))
}
