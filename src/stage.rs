//! Stage descriptions and the validated pipeline specification

use crate::errors::{PipelineError, PipelineResult};
use crate::utils::to_cstring;
use std::ffi::{CStr, CString, OsStr, OsString};
use std::fmt;

/// Builder for a single pipeline stage: one program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    program: OsString,
    args: Vec<OsString>,
}

impl Stage {
    /// Create a new stage running `program`, looked up on `PATH`
    pub fn new<S: Into<OsString>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add an argument to the stage
    pub fn arg<S: Into<OsString>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments to the stage
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// Validate and convert into an exec-ready argv
    fn build(&self) -> PipelineResult<StageCommand> {
        if self.program.is_empty() {
            return Err(PipelineError::InvalidStage(
                "program name cannot be empty".into(),
            ));
        }

        let program = to_cstring(&self.program)?;
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(program.clone());
        for arg in &self.args {
            argv.push(to_cstring(arg)?);
        }

        Ok(StageCommand::new(program, argv, render(&self.program, &self.args)))
    }
}

/// An exec-ready stage. All allocation happens here, before any fork,
/// including the NULL-terminated pointer array handed to `execvp`.
#[derive(Debug)]
pub struct StageCommand {
    program: CString,
    argv: Vec<CString>,
    // Points into the heap buffers of `argv`, which never move or change.
    exec_argv: Vec<*const libc::c_char>,
    label: String,
}

// `exec_argv` only borrows from `argv`, owned by the same value and never mutated.
unsafe impl Send for StageCommand {}
unsafe impl Sync for StageCommand {}

impl StageCommand {
    fn new(program: CString, argv: Vec<CString>, label: String) -> Self {
        let exec_argv = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();
        Self {
            program,
            argv,
            exec_argv,
            label,
        }
    }

    pub fn program(&self) -> &CStr {
        &self.program
    }

    /// Full argument vector, program name first
    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    /// NULL-terminated `argv` for `execvp(3)`, valid as long as `self` is
    pub fn exec_argv(&self) -> *const *const libc::c_char {
        self.exec_argv.as_ptr()
    }

    /// Human readable form, e.g. `grep init`
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Clone for StageCommand {
    fn clone(&self) -> Self {
        Self::new(self.program.clone(), self.argv.clone(), self.label.clone())
    }
}

impl PartialEq for StageCommand {
    fn eq(&self, other: &Self) -> bool {
        self.program == other.program && self.argv == other.argv
    }
}

impl Eq for StageCommand {}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Ordered, immutable list of stages, producer first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    stages: Vec<StageCommand>,
}

impl PipelineSpec {
    /// Validate `stages` and prepare every argv
    pub fn new(stages: Vec<Stage>) -> PipelineResult<Self> {
        if stages.is_empty() {
            return Err(PipelineError::InvalidStage(
                "a pipeline needs at least one stage".into(),
            ));
        }

        let stages = stages
            .iter()
            .map(Stage::build)
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(Self { stages })
    }

    /// `ps -A | grep <term> | wc -l`
    pub fn count_matching<S: AsRef<OsStr>>(term: S) -> PipelineResult<Self> {
        Self::new(vec![
            Stage::new("ps").arg("-A"),
            Stage::new("grep").arg(term.as_ref()),
            Stage::new("wc").arg("-l"),
        ])
    }

    pub fn stages(&self) -> &[StageCommand] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl fmt::Display for PipelineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            f.write_str(stage.label())?;
        }
        Ok(())
    }
}

fn render(program: &OsStr, args: &[OsString]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(OsString::as_os_str))
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_matching_layout() {
        let spec = PipelineSpec::count_matching("init").unwrap();
        assert_eq!(spec.len(), 3);

        let argvs: Vec<Vec<String>> = spec
            .stages()
            .iter()
            .map(|s| {
                s.argv()
                    .iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect()
            })
            .collect();
        assert_eq!(
            argvs,
            vec![
                vec!["ps".to_string(), "-A".to_string()],
                vec!["grep".to_string(), "init".to_string()],
                vec!["wc".to_string(), "-l".to_string()],
            ]
        );
        assert_eq!(spec.to_string(), "ps -A | grep init | wc -l");
    }

    #[test]
    fn test_term_is_passed_verbatim() {
        let spec = PipelineSpec::count_matching("kworker/0:1 $HOME; *").unwrap();
        let grep = &spec.stages()[1];
        assert_eq!(grep.program().to_bytes(), b"grep");
        assert_eq!(grep.argv()[1].as_bytes(), b"kworker/0:1 $HOME; *");
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let err = PipelineSpec::new(Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidStage(_)));
    }

    #[test]
    fn test_empty_program_rejected() {
        let err = PipelineSpec::new(vec![Stage::new("")]).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_nul_in_argument_rejected() {
        let result = PipelineSpec::new(vec![Stage::new("grep").arg("in\0it")]);
        assert!(matches!(result, Err(PipelineError::InvalidStage(_))));
    }

    #[test]
    fn test_exec_argv_is_null_terminated() {
        let spec = PipelineSpec::count_matching("init").unwrap();
        let grep = &spec.stages()[1];
        let ptrs = unsafe { std::slice::from_raw_parts(grep.exec_argv(), 3) };
        assert_eq!(ptrs[0], grep.argv()[0].as_ptr());
        assert_eq!(ptrs[1], grep.argv()[1].as_ptr());
        assert!(ptrs[2].is_null());
    }

    #[test]
    fn test_cloned_stage_points_at_its_own_argv() {
        let spec = PipelineSpec::count_matching("init").unwrap();
        let copy = spec.clone();
        assert_eq!(spec, copy);

        let ptrs = unsafe { std::slice::from_raw_parts(copy.stages()[1].exec_argv(), 2) };
        assert_eq!(ptrs[1], copy.stages()[1].argv()[1].as_ptr());
        assert_ne!(ptrs[1], spec.stages()[1].argv()[1].as_ptr());
    }

    #[test]
    fn test_stage_builder_args() {
        let stage = Stage::new("printf").args(["%s\\n", "a", "b"]);
        assert_eq!(stage.program(), "printf");
        let spec = PipelineSpec::new(vec![stage]).unwrap();
        assert_eq!(spec.stages()[0].argv().len(), 4);
        assert_eq!(spec.stages()[0].label(), "printf %s\\n a b");
    }
}
