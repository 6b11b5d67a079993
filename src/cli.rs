//! Command-line handling

use crate::errors::{PipelineError, PipelineResult};
use clap::{CommandFactory, Parser};
use std::ffi::OsString;

/// Count running processes whose `ps -A` line contains TERM.
///
/// Equivalent to `ps -A | grep TERM | wc -l`, built from forked processes
/// connected by pipes rather than a shell.
#[derive(Parser, Debug)]
#[command(name = "processes", disable_version_flag = true)]
pub struct Cli {
    /// Text to search for, passed to grep unchanged
    #[arg(value_name = "TERM", allow_hyphen_values = true)]
    pub term: OsString,
}

/// What the binary has been asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Print this usage text and exit successfully
    Help(String),
    /// Count processes matching the term
    Run { term: OsString },
}

impl Invocation {
    /// Parse a full argv, program name included
    ///
    /// Exactly one argument is accepted; the count is checked before the
    /// argument itself is looked at, so `-h` next to a second argument is an
    /// error rather than a help request. Apart from `-h` and `--help` the
    /// argument is taken as the term verbatim, `--` included.
    pub fn parse_from<I, T>(args: I) -> PipelineResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        if args.len() != 2 {
            return Err(invalid_count(args.len().saturating_sub(1)));
        }

        let term = args.swap_remove(1);
        if term == "-h" || term == "--help" {
            return Ok(Self::Help(Cli::command().render_help().to_string()));
        }
        Ok(Self::Run { term })
    }
}

fn invalid_count(given: usize) -> PipelineError {
    tracing::debug!(given, "wrong number of arguments");
    PipelineError::InvalidArguments(format!(
        "Incorrect number of arguments; aborting!\n{}",
        usage()
    ))
}

/// One-line usage string
pub fn usage() -> String {
    Cli::command().render_usage().to_string()
}
