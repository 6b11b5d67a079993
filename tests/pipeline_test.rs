//! Integration tests for pipelines built through the library

use processes::errors::LaunchStatus;
use processes::{Launcher, PipelineReport, PipelineSpec, Stage, StageOutcome};
use std::os::fd::OwnedFd;
use tempfile::NamedTempFile;

fn run_capture(stages: Vec<Stage>) -> (String, PipelineReport) {
    let spec = PipelineSpec::new(stages).expect("valid pipeline");
    let out = NamedTempFile::new().expect("Failed to create temp file");
    let sink: OwnedFd = out.reopen().expect("Failed to reopen temp file").into();

    let report = Launcher::new()
        .run_into(&spec, sink)
        .expect("Failed to run pipeline");
    let text = std::fs::read_to_string(out.path()).expect("Failed to read output");
    (text.trim().to_string(), report)
}

fn lines(text: &str) -> Stage {
    Stage::new("printf").args(["%s", text])
}

#[test]
fn test_three_stage_count() {
    let (out, report) = run_capture(vec![
        lines("alpha\nbeta\nalphabet\n"),
        Stage::new("grep").arg("alpha"),
        Stage::new("wc").arg("-l"),
    ]);
    assert_eq!(out, "2");
    assert_eq!(report.stages.len(), 1);
    assert!(report.final_stage().unwrap().outcome.success());
}

#[test]
fn test_no_match_counts_zero() {
    let (out, _) = run_capture(vec![
        lines("alpha\nbeta\n"),
        Stage::new("grep").arg("gamma"),
        Stage::new("wc").arg("-l"),
    ]);
    assert_eq!(out, "0");
}

#[test]
fn test_single_stage() {
    let (out, _) = run_capture(vec![Stage::new("echo").arg("hello")]);
    assert_eq!(out, "hello");
}

#[test]
fn test_two_stages() {
    let (out, _) = run_capture(vec![lines("a\nb\nc\n"), Stage::new("wc").arg("-l")]);
    assert_eq!(out, "3");
}

#[test]
fn test_four_stages() {
    let (out, _) = run_capture(vec![
        lines("ab\nabc\nbc\nabcd\n"),
        Stage::new("grep").arg("a"),
        Stage::new("grep").arg("c"),
        Stage::new("wc").arg("-l"),
    ]);
    assert_eq!(out, "2");
}

#[test]
fn test_term_with_shell_characters_is_literal() {
    let (out, _) = run_capture(vec![
        lines("cost $5; total\nplain\n"),
        Stage::new("grep").arg("-F").arg("$5;"),
        Stage::new("wc").arg("-l"),
    ]);
    assert_eq!(out, "1");
}

#[test]
fn test_same_input_same_count() {
    let stages = || {
        vec![
            lines("x1\ny\nx2\nx3\n"),
            Stage::new("grep").arg("x"),
            Stage::new("wc").arg("-l"),
        ]
    };
    let (first, _) = run_capture(stages());
    let (second, _) = run_capture(stages());
    assert_eq!(first, "3");
    assert_eq!(first, second);
}

#[test]
fn test_missing_final_program_is_reported_not_raised() {
    let (out, report) = run_capture(vec![
        Stage::new("echo").arg("hi"),
        Stage::new("zz-no-such-program-zz"),
    ]);
    assert_eq!(out, "");
    let outcome = report.final_stage().unwrap().outcome;
    assert_eq!(outcome, StageOutcome::Exited(LaunchStatus::ExecFailed.code()));
    assert_eq!(outcome.launch_failure(), Some(LaunchStatus::ExecFailed));
}

#[test]
fn test_missing_producer_gives_end_of_input() {
    let (out, report) = run_capture(vec![
        Stage::new("zz-no-such-program-zz"),
        Stage::new("wc").arg("-l"),
    ]);
    assert_eq!(out, "0");
    assert!(report.final_stage().unwrap().outcome.success());
}
