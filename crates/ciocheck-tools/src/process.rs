use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use ciocheck_core::{CiocheckError, Result};

/// Captured result of an external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Decoded standard output.
    pub stdout: String,
    /// Decoded standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run `args[0]` with the remaining arguments and capture its output.
///
/// A non-zero exit status is not an error: linters report findings that
/// way.
///
/// # Errors
///
/// Returns [`CiocheckError::Tool`] if `args` is empty or the program cannot
/// be started.
///
/// # Examples
///
/// ```no_run
/// use ciocheck_tools::process::run_command;
///
/// let out = run_command("flake8", &["flake8".into(), "setup.py".into()], None).unwrap();
/// println!("{}", out.stdout);
/// ```
pub fn run_command(tool: &str, args: &[String], cwd: Option<&Path>) -> Result<CommandOutput> {
    let mut command = build(tool, args, cwd)?;
    tracing::debug!(tool, ?args, "running command");

    let output = command
        .output()
        .map_err(|e| CiocheckError::tool(tool, format!("failed to run {}: {e}", args[0])))?;

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a command feeding `input` on its standard input.
///
/// # Errors
///
/// Same as [`run_command`], plus a write failure on the child's stdin.
pub fn run_with_stdin(
    tool: &str,
    args: &[String],
    input: &str,
    cwd: Option<&Path>,
) -> Result<CommandOutput> {
    let mut command = build(tool, args, cwd)?;
    tracing::debug!(tool, ?args, "running command with stdin");

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CiocheckError::tool(tool, format!("failed to run {}: {e}", args[0])))?;

    // The child may fill its stdout pipe before it finishes reading stdin.
    let writer = child.stdin.take().map(|mut stdin| {
        let input = input.to_owned();
        std::thread::spawn(move || stdin.write_all(input.as_bytes()))
    });

    let output = child.wait_with_output()?;
    if let Some(Ok(Err(e))) = writer.map(|w| w.join()) {
        tracing::debug!(tool, error = %e, "child closed stdin early");
    }
    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

fn build(tool: &str, args: &[String], cwd: Option<&Path>) -> Result<Command> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| CiocheckError::tool(tool, "empty command"))?;
    let mut command = Command::new(program);
    command.args(rest);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = run_command("empty", &[], None).unwrap_err();
        assert_eq!(err.to_string(), "empty: empty command");
    }

    #[test]
    fn missing_program_is_a_tool_error() {
        let err = run_command("ghost", &args(&["ciocheck-no-such-program"]), None).unwrap_err();
        assert!(matches!(err, CiocheckError::Tool { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn captures_output_and_exit_code() {
        let out = run_command("sh", &args(&["sh", "-c", "echo out; echo err >&2; exit 3"]), None)
            .unwrap();
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.code, Some(3));
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[test]
    fn stdin_is_piped_through() {
        let out = run_with_stdin("cat", &args(&["cat"]), "hello\n", None).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello\n");
    }
}
