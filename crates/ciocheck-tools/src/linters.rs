//! Linters whose output is parsed with a named-group regex or a JSON key
//! mapping.

use std::path::PathBuf;

use ciocheck_core::{CiocheckError, CustomLinter, FileSet, Finding, Result, ToolKind};
use regex::Regex;
use serde_json::{Map, Value};

use crate::process::run_command;
use crate::tool::{Tool, ToolContext, ToolOutput};

const PEP8_PATTERN: &str = r"(?x)
    (?P<path>.*?):(?P<line>\d+):
    (?P<column>\d+):\s
    (?P<type>[EWFCNTIBDSQ]\d{3})\s
    (?P<message>.*)
";

// ./bootstrap.py:1 at module level:
//         D400: First line should end with a period (not 't')
const PYDOCSTYLE_PATTERN: &str = r"(?x)
    (?P<path>.*?):
    (?P<line>\d+)[\ ]
    (?P<symbol>.*):\n.*?
    (?P<type>D\d{3}):\s
    (?P<message>.*)
";

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn linter_args(command: &[String], files: &FileSet) -> Vec<String> {
    let mut args = command.to_vec();
    args.extend(files.paths().iter().map(|p| p.to_string_lossy().into_owned()));
    args
}

/// A linter whose output is matched with a regex using the named groups
/// `path`, `line`, `column`, `type`, `message` and `symbol`.
///
/// # Examples
///
/// ```
/// use ciocheck_core::CheckConfig;
/// use ciocheck_tools::linters::RegexLinter;
/// use ciocheck_tools::ToolContext;
///
/// let flake8 = RegexLinter::flake8();
/// let ctx = ToolContext::new("/project", CheckConfig::default());
/// let findings = flake8.parse(&ctx, "pkg/a.py:3:1: E302 expected 2 blank lines, found 1\n");
/// assert_eq!(findings.len(), 1);
/// assert_eq!(findings[0].line(), Some(3));
/// ```
#[derive(Debug, Clone)]
pub struct RegexLinter {
    name: String,
    command: Vec<String>,
    extensions: Vec<String>,
    pattern: Regex,
    output_on_stderr: bool,
}

impl RegexLinter {
    /// Create a linter from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`CiocheckError::Config`] if `pattern` is not a valid regex.
    pub fn new(
        name: impl Into<String>,
        command: Vec<String>,
        extensions: Vec<String>,
        pattern: &str,
        output_on_stderr: bool,
    ) -> Result<Self> {
        let name = name.into();
        let pattern = Regex::new(pattern)
            .map_err(|e| CiocheckError::Config(format!("invalid pattern for linter {name}: {e}")))?;
        Ok(Self {
            name,
            command,
            extensions,
            pattern,
            output_on_stderr,
        })
    }

    /// Build a linter declared in a `[[linters]]` table.
    pub fn from_config(custom: &CustomLinter) -> Result<Self> {
        Self::new(
            custom.name.clone(),
            custom.command.clone(),
            custom.extensions.clone(),
            &custom.pattern,
            custom.output_on_stderr,
        )
    }

    pub fn flake8() -> Self {
        Self::builtin("flake8", &["flake8"], PEP8_PATTERN, false)
    }

    /// The `pep8` check, run through `pycodestyle`.
    pub fn pep8() -> Self {
        Self::builtin("pep8", &["pycodestyle"], PEP8_PATTERN, false)
    }

    pub fn pydocstyle() -> Self {
        Self::builtin("pydocstyle", &["pydocstyle"], PYDOCSTYLE_PATTERN, true)
    }

    fn builtin(name: &str, command: &[&str], pattern: &str, output_on_stderr: bool) -> Self {
        Self {
            name: name.into(),
            command: strings(command),
            extensions: strings(&["py"]),
            pattern: Regex::new(pattern).expect("built-in linter pattern is valid"),
            output_on_stderr,
        }
    }

    /// Turn raw tool output into findings, in output order.
    pub fn parse(&self, ctx: &ToolContext, output: &str) -> Vec<Finding> {
        self.pattern
            .captures_iter(output)
            .filter_map(|caps| {
                let group = |name: &str| caps.name(name).map(|m| m.as_str().trim());
                let path = group("path").filter(|p| !p.is_empty())?;
                Some(Finding::Lint {
                    path: ctx.resolve(path),
                    line: group("line").and_then(|l| l.parse().ok()),
                    column: group("column").and_then(|c| c.parse().ok()),
                    code: group("type").map(str::to_owned),
                    message: group("message").unwrap_or_default().to_owned(),
                    symbol: group("symbol").map(str::to_owned),
                    extra: Map::new(),
                })
            })
            .collect()
    }
}

impl Tool for RegexLinter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Linter
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn run(&self, ctx: &ToolContext, files: &FileSet) -> Result<ToolOutput> {
        if files.is_empty() {
            return Ok(ToolOutput::default());
        }
        let out = run_command(&self.name, &linter_args(&self.command, files), Some(&ctx.root))?;
        let text = if self.output_on_stderr {
            &out.stderr
        } else {
            &out.stdout
        };
        let findings = self.parse(ctx, text);
        tracing::debug!(tool = %self.name, findings = findings.len(), "linter finished");
        Ok(ToolOutput::from_findings(findings))
    }
}

/// A linter printing a JSON array of objects.
///
/// Each `(from, to)` pair in the key map renames a field; recognized target
/// names are `path`, `line`, `column`, `code`, `message` and `symbol`.
/// Fields not named in the map are kept as extras.
#[derive(Debug, Clone)]
pub struct JsonLinter {
    name: String,
    command: Vec<String>,
    extensions: Vec<String>,
    keys: Vec<(String, String)>,
}

impl JsonLinter {
    pub fn new(
        name: impl Into<String>,
        command: Vec<String>,
        extensions: Vec<String>,
        keys: Vec<(String, String)>,
    ) -> Self {
        Self {
            name: name.into(),
            command,
            extensions,
            keys,
        }
    }

    /// `pylint` with JSON output; `message-id` becomes the finding code.
    pub fn pylint() -> Self {
        let keys = [
            ("message", "message"),
            ("line", "line"),
            ("column", "column"),
            ("message-id", "code"),
            ("symbol", "symbol"),
            ("path", "path"),
        ];
        Self::new(
            "pylint",
            strings(&["pylint", "--output-format", "json", "-j", "0"]),
            strings(&["py"]),
            keys.iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        )
    }

    /// Turn raw JSON output into findings, in output order.
    ///
    /// # Errors
    ///
    /// Returns [`CiocheckError::Tool`] if the output is not a JSON array.
    pub fn parse(&self, ctx: &ToolContext, output: &str) -> Result<Vec<Finding>> {
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        let items: Vec<Map<String, Value>> = serde_json::from_str(output)
            .map_err(|e| CiocheckError::tool(&self.name, format!("unreadable JSON output: {e}")))?;

        Ok(items
            .into_iter()
            .filter_map(|item| self.finding(ctx, item))
            .collect())
    }

    fn finding(&self, ctx: &ToolContext, mut item: Map<String, Value>) -> Option<Finding> {
        let mut mapped = Map::new();
        for (from, to) in &self.keys {
            if let Some(value) = item.remove(from) {
                mapped.insert(to.clone(), value);
            }
        }

        let text = |key: &str| mapped.get(key).and_then(Value::as_str).map(str::to_owned);
        let number = |key: &str| {
            mapped
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
        };

        let path: PathBuf = ctx.resolve(&text("path")?);
        Some(Finding::Lint {
            path,
            line: number("line"),
            column: number("column"),
            code: text("code"),
            message: text("message").unwrap_or_default(),
            symbol: text("symbol"),
            extra: item,
        })
    }
}

impl Tool for JsonLinter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Linter
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn run(&self, ctx: &ToolContext, files: &FileSet) -> Result<ToolOutput> {
        if files.is_empty() {
            return Ok(ToolOutput::default());
        }
        let out = run_command(&self.name, &linter_args(&self.command, files), Some(&ctx.root))?;
        Ok(ToolOutput::from_findings(self.parse(ctx, &out.stdout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciocheck_core::CheckConfig;
    use std::path::Path;

    fn ctx() -> ToolContext {
        ToolContext::new("/project", CheckConfig::default())
    }

    #[test]
    fn flake8_output_is_parsed_in_order() {
        let output = "\
pkg/a.py:3:1: E302 expected 2 blank lines, found 1
/abs/b.py:10:80: E501 line too long (88 > 79 characters)
pkg/a.py:7:5: F841 local variable 'x' is assigned to but never used
";
        let findings = RegexLinter::flake8().parse(&ctx(), output);
        assert_eq!(findings.len(), 3);
        match &findings[1] {
            Finding::Lint {
                path,
                line,
                column,
                code,
                message,
                ..
            } => {
                assert_eq!(path, Path::new("/abs/b.py"));
                assert_eq!(*line, Some(10));
                assert_eq!(*column, Some(80));
                assert_eq!(code.as_deref(), Some("E501"));
                assert_eq!(message, "line too long (88 > 79 characters)");
            }
            other => panic!("unexpected finding {other:?}"),
        }
        assert_eq!(findings[0].path(), Path::new("/project/pkg/a.py"));
    }

    #[test]
    fn pydocstyle_two_line_output() {
        let output = "\
./bootstrap.py:1 at module level:
        D400: First line should end with a period (not 't')
./pkg/core.py:12 in public function `run`:
        D103: Missing docstring in public function
";
        let findings = RegexLinter::pydocstyle().parse(&ctx(), output);
        assert_eq!(findings.len(), 2);
        match &findings[1] {
            Finding::Lint {
                line, code, symbol, ..
            } => {
                assert_eq!(*line, Some(12));
                assert_eq!(code.as_deref(), Some("D103"));
                assert_eq!(symbol.as_deref(), Some("in public function `run`"));
            }
            other => panic!("unexpected finding {other:?}"),
        }
    }

    #[test]
    fn pylint_json_keys_are_remapped() {
        let output = r#"[
            {"type": "convention", "module": "pkg.a", "obj": "", "line": 1, "column": 0,
             "path": "pkg/a.py", "symbol": "missing-docstring",
             "message": "Missing module docstring", "message-id": "C0111"}
        ]"#;
        let findings = JsonLinter::pylint().parse(&ctx(), output).unwrap();
        assert_eq!(findings.len(), 1);
        match &findings[0] {
            Finding::Lint {
                path,
                line,
                code,
                symbol,
                extra,
                ..
            } => {
                assert_eq!(path, Path::new("/project/pkg/a.py"));
                assert_eq!(*line, Some(1));
                assert_eq!(code.as_deref(), Some("C0111"));
                assert_eq!(symbol.as_deref(), Some("missing-docstring"));
                assert_eq!(extra["type"], "convention");
                assert!(!extra.contains_key("path"));
            }
            other => panic!("unexpected finding {other:?}"),
        }
    }

    #[test]
    fn json_linter_rejects_garbage() {
        assert!(JsonLinter::pylint().parse(&ctx(), "not json").is_err());
        assert!(JsonLinter::pylint().parse(&ctx(), "  \n").unwrap().is_empty());
    }

    #[test]
    fn invalid_custom_pattern_is_config_error() {
        let custom = CustomLinter {
            name: "broken".into(),
            command: vec!["true".into()],
            pattern: "(?P<path".into(),
            extensions: vec![],
            output_on_stderr: false,
        };
        assert!(matches!(
            RegexLinter::from_config(&custom),
            Err(CiocheckError::Config(_))
        ));
    }

    #[test]
    fn empty_selection_does_not_run_the_command() {
        let linter = RegexLinter::new(
            "ghost",
            vec!["ciocheck-no-such-linter".into()],
            vec![],
            PEP8_PATTERN,
            false,
        )
        .unwrap();
        let output = linter.run(&ctx(), &FileSet::Files(vec![])).unwrap();
        assert!(output.findings.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn custom_grep_linter_runs_against_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let file = root.join("a.py");
        std::fs::write(&file, "x = 1\n# TODO: remove\n").unwrap();

        let custom = CustomLinter {
            name: "todo".into(),
            command: strings(&["grep", "-n", "-H", "TODO"]),
            pattern: r"(?P<path>[^:\n]+):(?P<line>\d+):(?P<message>.*)".into(),
            extensions: strings(&["py"]),
            output_on_stderr: false,
        };
        let linter = RegexLinter::from_config(&custom).unwrap();
        let ctx = ToolContext::new(&root, CheckConfig::default());
        let output = linter.run(&ctx, &FileSet::Files(vec![file.clone()])).unwrap();

        assert_eq!(output.findings.len(), 1);
        assert_eq!(output.findings[0].path(), file);
        assert_eq!(output.findings[0].line(), Some(2));
    }
}
