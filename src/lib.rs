//! Process pipeline launcher
//!
//! Builds `ps -A | grep <term> | wc -l` out of forked processes joined by
//! pipes, without a shell. The pieces are usable on their own: a
//! [`PipelineSpec`] describes any chain of programs and a [`Launcher`] runs it.

pub mod cli;
pub mod errors;
pub mod launcher;
pub mod logging;
pub mod pipe;
pub mod redirect;
pub mod stage;
pub mod utils;

// Re-export commonly used types
pub use errors::{LaunchStatus, PipelineError, PipelineResult};
pub use launcher::{Launcher, PipelineReport, ReapPolicy, ReapedStage, StageOutcome};
pub use pipe::PipePair;
pub use stage::{PipelineSpec, Stage};
