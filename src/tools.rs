//! External tool capability.
//!
//! Every binary introspection and rewrite goes through [`ToolRunner`] instead
//! of spawning processes directly. Production code uses [`SystemTools`];
//! tests substitute a fake that answers with canned tool output.

use std::ffi::OsString;
use std::io;
use std::process::Command;

use tracing::debug;

use crate::error::ToolError;

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Successful run with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed run with the given stderr.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs a named external program and captures its output.
///
/// A non-zero exit status is *not* an error at this level; it is reported
/// through [`ToolOutput::success`] so each caller can decide what it means.
pub trait ToolRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<ToolOutput, ToolError>;
}

/// Runs tools as blocking child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTools;

impl ToolRunner for SystemTools {
    fn run(&self, program: &str, args: &[OsString]) -> Result<ToolOutput, ToolError> {
        debug!(program, ?args, "running tool");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => ToolError::NotFound {
                    program: program.to_string(),
                },
                _ => ToolError::Spawn {
                    program: program.to_string(),
                    source,
                },
            })?;

        Ok(ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Render a command line for log and error messages.
pub(crate) fn command_line(program: &str, args: &[OsString]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_not_found() {
        let err = SystemTools
            .run("definitely-not-a-real-tool-7f3a", &[])
            .unwrap_err();
        assert!(
            matches!(err, ToolError::NotFound { .. }),
            "unexpected error: {err}"
        );
        assert!(err.to_string().contains("command not found"));
    }

    #[test]
    fn test_command_line_rendering() {
        let args: Vec<OsString> = vec!["--set-rpath".into(), "$ORIGIN".into(), "libfoo.so".into()];
        assert_eq!(
            command_line("patchelf", &args),
            "patchelf --set-rpath $ORIGIN libfoo.so"
        );
    }
}
