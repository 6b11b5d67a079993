use anyhow::{anyhow, Context, Result};
use processes::cli::Invocation;
use processes::{logging, LaunchStatus, Launcher, PipelineError, PipelineSpec, ReapPolicy};
use std::process::ExitCode;
use tracing::debug;

fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("{:#}", e);
    }

    match run(std::env::args_os()) {
        Ok(()) => LaunchStatus::Success.into(),
        Err(e) => {
            eprintln!("{}", e);
            let status = e.exit_status();
            debug!(?status, "exiting with failure");
            status.into()
        }
    }
}

fn init_logging() -> Result<()> {
    logging::init()
        .map_err(|e| anyhow!("{e}"))
        .context("failed to initialise logging")
}

fn run(args: std::env::ArgsOs) -> Result<(), PipelineError> {
    let term = match Invocation::parse_from(args)? {
        Invocation::Help(text) => {
            println!("{}", text);
            return Ok(());
        }
        Invocation::Run { term } => term,
    };

    let spec = PipelineSpec::count_matching(&term)?;
    let report = Launcher::new()
        .reap(ReapPolicy::AllDescendants)
        .run(&spec)?;

    debug!(
        reaped = report.stages.len(),
        all_succeeded = report.all_succeeded(),
        "pipeline report"
    );
    Ok(())
}
