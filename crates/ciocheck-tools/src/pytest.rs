//! `py.test` runner with pytest-json reports and coverage collection.

use std::fs;
use std::path::{Path, PathBuf};

use ciocheck_core::{FileSet, Finding, Result, ToolKind};
use serde_json::Value;

use crate::process::run_command;
use crate::tool::{CoverageMap, Tool, ToolContext, ToolOutput};

/// Report file written by the pytest-json plugin, relative to the root.
pub const REPORT_FILE: &str = ".pytestreport.json";
/// Coverage data file written by pytest-cov, relative to the root.
pub const COVERAGE_FILE: &str = ".coverage";
/// Coverage configuration picked up when present in the root.
pub const COVERAGE_CONFIG_FILE: &str = ".coveragerc";

const COVERAGE_PREFIX: &str = "!coverage.py: This is a private format, don't read it directly!";

/// Runs the project's test suite once, regardless of which files were
/// selected, and reports failing tests plus line coverage.
#[derive(Debug, Clone)]
pub struct PytestTool {
    extensions: Vec<String>,
}

impl Default for PytestTool {
    fn default() -> Self {
        Self {
            extensions: vec!["py".into()],
        }
    }
}

impl PytestTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command line for a run in `root`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ciocheck_tools::pytest::PytestTool;
    /// use std::path::Path;
    ///
    /// let args = PytestTool::new().args(Path::new("/nonexistent/project"), 4);
    /// assert_eq!(args[0], "py.test");
    /// assert_eq!(args[1], "--json=.pytestreport.json");
    /// assert_eq!(args.last().unwrap(), "--cov=/nonexistent/project");
    /// ```
    pub fn args(&self, root: &Path, cpus: usize) -> Vec<String> {
        let mut args = vec![
            "py.test".to_string(),
            format!("--json={REPORT_FILE}"),
            "-n".to_string(),
            cpus.to_string(),
        ];
        let coverage_config = root.join(COVERAGE_CONFIG_FILE);
        if coverage_config.is_file() {
            args.push("--cov-config".into());
            args.push(coverage_config.to_string_lossy().into_owned());
        }
        args.push(format!("--cov={}", root.display()));
        args
    }
}

/// Failing tests and the aggregate failure flag from a pytest-json report.
///
/// # Errors
///
/// Returns [`CiocheckError::Serialization`] if the report is not JSON.
///
/// # Examples
///
/// ```
/// use ciocheck_tools::pytest::parse_report;
/// use std::path::Path;
///
/// let report = r#"{"report": {"summary": {"passed": 1, "failed": 1},
///   "tests": [{"name": "tests/test_a.py::test_x", "outcome": "failed"}]}}"#;
/// let (findings, failed) = parse_report(Path::new("/p"), report).unwrap();
/// assert!(failed);
/// assert_eq!(findings[0].path(), Path::new("/p/tests/test_a.py"));
/// ```
pub fn parse_report(root: &Path, report: &str) -> Result<(Vec<Finding>, bool)> {
    let data: Value = serde_json::from_str(report)?;
    let report = data.get("report").unwrap_or(&data);

    let count = |key: &str| {
        report
            .pointer(&format!("/summary/{key}"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    let summary_failed = count("failed") + count("error") + count("errors") > 0;

    let findings = report
        .get("tests")
        .and_then(Value::as_array)
        .map(|tests| {
            tests
                .iter()
                .filter_map(|test| test_finding(root, test))
                .collect()
        })
        .unwrap_or_default();

    Ok((findings, summary_failed))
}

fn test_finding(root: &Path, test: &Value) -> Option<Finding> {
    let outcome = test.get("outcome").and_then(Value::as_str)?;
    if !matches!(outcome, "failed" | "error") {
        return None;
    }
    let name = test.get("name").and_then(Value::as_str)?;
    let module = name.split("::").next().unwrap_or(name);

    let message = ["call", "setup", "teardown"].iter().find_map(|stage| {
        test.pointer(&format!("/{stage}/longrepr"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    });
    let line = test
        .get("lineno")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok());

    Some(Finding::Test {
        path: root.join(module),
        line,
        name: name.to_string(),
        outcome: outcome.to_string(),
        message,
    })
}

/// Covered lines from a legacy JSON `.coverage` data file.
///
/// # Errors
///
/// Returns [`CiocheckError::Serialization`] if the data is not JSON once
/// the format banner is stripped.
///
/// # Examples
///
/// ```
/// use ciocheck_tools::pytest::parse_coverage;
/// use std::path::Path;
///
/// let data = r#"!coverage.py: This is a private format, don't read it directly!{"lines": {"/p/a.py": [1, 2, 5]}}"#;
/// let covered = parse_coverage(Path::new("/p"), data).unwrap();
/// assert_eq!(covered[Path::new("/p/a.py")], vec![1, 2, 5]);
/// ```
pub fn parse_coverage(root: &Path, data: &str) -> Result<CoverageMap> {
    let data: Value = serde_json::from_str(&data.replace(COVERAGE_PREFIX, ""))?;
    let mut covered = CoverageMap::new();
    if let Some(lines) = data.get("lines").and_then(Value::as_object) {
        for (path, numbers) in lines {
            let numbers = numbers
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(Value::as_u64)
                        .filter_map(|n| u32::try_from(n).ok())
                        .collect()
                })
                .unwrap_or_default();
            covered.insert(root.join(path), numbers);
        }
    }
    Ok(covered)
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Tool for PytestTool {
    fn name(&self) -> &str {
        "pytest"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Tester
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn run(&self, ctx: &ToolContext, _files: &FileSet) -> Result<ToolOutput> {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let out = run_command("pytest", &self.args(&ctx.root, cpus), Some(&ctx.root))?;
        if !out.stderr.trim().is_empty() {
            tracing::warn!(stderr = %out.stderr.trim(), "py.test wrote to stderr");
        }

        let report_path: PathBuf = ctx.root.join(REPORT_FILE);
        let (findings, summary_failed) = match read_optional(&report_path)? {
            Some(report) => parse_report(&ctx.root, &report)?,
            None => {
                tracing::warn!(path = %report_path.display(), "no pytest report written");
                (Vec::new(), !out.success())
            }
        };
        if report_path.exists() {
            fs::remove_file(&report_path)?;
        }

        let coverage = match read_optional(&ctx.root.join(COVERAGE_FILE))? {
            Some(data) => match parse_coverage(&ctx.root, &data) {
                Ok(map) => Some(map),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring unreadable coverage data");
                    None
                }
            },
            None => None,
        };

        tracing::info!(failed = findings.len(), summary_failed, "tests finished");
        Ok(ToolOutput {
            findings,
            coverage,
            summary_failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_collects_failed_and_errored_tests() {
        let report = r#"{"report": {
            "summary": {"passed": 3, "failed": 1, "error": 1, "num_tests": 5},
            "tests": [
                {"name": "tests/test_a.py::test_ok", "outcome": "passed"},
                {"name": "tests/test_a.py::test_bad", "outcome": "failed",
                 "call": {"longrepr": "assert 1 == 2"}},
                {"name": "tests/test_b.py::test_setup", "outcome": "error",
                 "setup": {"longrepr": "fixture 'db' not found"}}
            ]}}"#;
        let (findings, failed) = parse_report(Path::new("/p"), report).unwrap();
        assert!(failed);
        assert_eq!(findings.len(), 2);
        match &findings[0] {
            Finding::Test {
                path,
                name,
                outcome,
                message,
                ..
            } => {
                assert_eq!(path, Path::new("/p/tests/test_a.py"));
                assert_eq!(name, "tests/test_a.py::test_bad");
                assert_eq!(outcome, "failed");
                assert_eq!(message.as_deref(), Some("assert 1 == 2"));
            }
            other => panic!("unexpected finding {other:?}"),
        }
        assert_eq!(findings[1].path(), Path::new("/p/tests/test_b.py"));
    }

    #[test]
    fn passing_report_has_no_failure() {
        let report = r#"{"report": {"summary": {"passed": 2}, "tests": []}}"#;
        let (findings, failed) = parse_report(Path::new("/p"), report).unwrap();
        assert!(findings.is_empty());
        assert!(!failed);
    }

    #[test]
    fn coverage_relative_paths_resolve_against_root() {
        let data = r#"{"lines": {"pkg/a.py": [3, 4], "/abs/b.py": []}}"#;
        let covered = parse_coverage(Path::new("/p"), data).unwrap();
        assert_eq!(covered[Path::new("/p/pkg/a.py")], vec![3, 4]);
        assert!(covered[Path::new("/abs/b.py")].is_empty());
    }

    #[test]
    fn malformed_coverage_is_an_error() {
        assert!(parse_coverage(Path::new("/p"), "!coverage.py: garbage").is_err());
    }

    #[test]
    fn coverage_config_is_passed_when_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(COVERAGE_CONFIG_FILE), "[run]\n").unwrap();
        let args = PytestTool::new().args(dir.path(), 2);
        assert!(args.iter().any(|a| a == "--cov-config"));
        assert_eq!(args[2..4], ["-n".to_string(), "2".to_string()]);
    }
}
