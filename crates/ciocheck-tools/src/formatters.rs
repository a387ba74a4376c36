//! Formatters that rewrite files in place.
//!
//! [`ExternalFormatter`] pipes a file through a stdin-to-stdout command;
//! [`PythonFormatter`] adds missing package markers and file headers.
//! Every rewrite goes through [`atomic_replace`] and is reported as a
//! [`Finding::Format`] carrying a unified diff.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use ciocheck_core::{CiocheckError, FileSet, Finding, Result, ToolKind, DEFAULT_COPYRIGHT_HEADER};
use ciocheck_difflens::filter::matches_extensions;
use regex::Regex;

use crate::process::run_with_stdin;
use crate::tool::{Tool, ToolContext, ToolOutput};

static COPYRIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"# *Copyright ").expect("valid copyright regex"));

/// Unified diff between two versions of a file.
///
/// # Examples
///
/// ```
/// use ciocheck_tools::formatters::unified_diff;
/// use std::path::Path;
///
/// let diff = unified_diff(Path::new("a.py"), "import b\nimport a\n", "import a\nimport b\n");
/// assert!(diff.contains("-import b"));
/// assert!(diff.contains("+import b"));
/// ```
pub fn unified_diff(path: &Path, old: &str, new: &str) -> String {
    let name = path.display().to_string();
    similar::TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&name, &name)
        .to_string()
}

/// Replace the contents of `path` through a temporary file in the same
/// folder, so readers never see a partially written file.
///
/// # Errors
///
/// Returns [`CiocheckError::Io`] if the temporary file cannot be written or
/// moved into place.
pub fn atomic_replace(path: &Path, contents: &str) -> Result<()> {
    let folder = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(folder)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.flush()?;
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions())?;
    }
    tmp.persist(path).map_err(|e| CiocheckError::Io(e.error))?;
    Ok(())
}

pub(crate) fn crashed(name: &str, path: &Path, err: &CiocheckError) -> Finding {
    Finding::Format {
        path: path.to_path_buf(),
        diff: String::new(),
        created: false,
        error: Some(format!("{name} crashed on {}: {err}", path.display())),
        added_header: false,
        added_copyright: false,
    }
}

/// A formatter that reads a file on stdin and prints the formatted version.
///
/// # Examples
///
/// ```
/// use ciocheck_tools::formatters::ExternalFormatter;
///
/// let isort = ExternalFormatter::isort();
/// assert_eq!(isort.name(), "isort");
/// ```
#[derive(Debug, Clone)]
pub struct ExternalFormatter {
    name: String,
    command: Vec<String>,
    extensions: Vec<String>,
    // (flag, file): pass `flag <root>/<file>` when that file exists.
    config_arg: Option<(String, String)>,
}

impl ExternalFormatter {
    pub fn new(name: impl Into<String>, command: Vec<String>, extensions: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            extensions,
            config_arg: None,
        }
    }

    pub fn isort() -> Self {
        Self::new("isort", vec!["isort".into(), "-".into()], vec!["py".into()])
    }

    /// `yapf`, styled by `.style.yapf` in the project root when present.
    pub fn yapf() -> Self {
        Self {
            config_arg: Some(("--style".into(), ".style.yapf".into())),
            ..Self::new("yapf", vec!["yapf".into()], vec!["py".into()])
        }
    }

    pub fn autopep8() -> Self {
        Self::new("autopep8", vec!["autopep8".into(), "-".into()], vec!["py".into()])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn args(&self, root: &Path) -> Vec<String> {
        let mut args = self.command.clone();
        if let Some((flag, file)) = &self.config_arg {
            let config = root.join(file);
            if config.is_file() {
                args.push(flag.clone());
                args.push(config.to_string_lossy().into_owned());
            }
        }
        args
    }

    /// Format `contents` and return the result.
    ///
    /// # Errors
    ///
    /// Returns [`CiocheckError::Tool`] if the command cannot be run or exits
    /// with a non-zero status.
    pub fn format_string(&self, root: &Path, contents: &str) -> Result<String> {
        let out = run_with_stdin(&self.name, &self.args(root), contents, Some(root))?;
        if !out.success() {
            let reason = match out.stderr.trim() {
                "" => format!("exited with {:?}", out.code),
                stderr => stderr.to_string(),
            };
            return Err(CiocheckError::tool(&self.name, reason));
        }
        Ok(out.stdout)
    }

    fn rewrite(&self, root: &Path, path: &Path) -> Result<Option<String>> {
        let old = fs::read_to_string(path)?;
        let new = self.format_string(root, &old)?;
        if new == old {
            return Ok(None);
        }
        atomic_replace(path, &new)?;
        Ok(Some(unified_diff(path, &old, &new)))
    }

    /// Format one file in place.
    ///
    /// Returns `None` when the file was already formatted. A failure is
    /// reported as a finding carrying an `error` rather than aborting the
    /// batch.
    pub fn format_file(&self, root: &Path, path: &Path) -> Option<Finding> {
        match self.rewrite(root, path) {
            Ok(None) => None,
            Ok(Some(diff)) => Some(Finding::Format {
                path: path.to_path_buf(),
                diff,
                created: false,
                error: None,
                added_header: false,
                added_copyright: false,
            }),
            Err(e) => {
                tracing::warn!(tool = %self.name, path = %path.display(), error = %e, "formatter crashed");
                Some(crashed(&self.name, path, &e))
            }
        }
    }
}

impl Tool for ExternalFormatter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Formatter
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn run(&self, ctx: &ToolContext, files: &FileSet) -> Result<ToolOutput> {
        let findings = files
            .paths()
            .into_iter()
            .filter(|path| matches_extensions(path, &self.extensions))
            .filter_map(|path| self.format_file(&ctx.root, path))
            .collect();
        Ok(ToolOutput::from_findings(findings))
    }
}

/// The `pyformat` tool: creates missing `__init__.py` files and makes sure
/// every Python file starts with the encoding and copyright headers.
#[derive(Debug, Clone)]
pub struct PythonFormatter {
    extensions: Vec<String>,
}

impl Default for PythonFormatter {
    fn default() -> Self {
        Self {
            extensions: vec!["py".into()],
        }
    }
}

impl PythonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    fn copyright_header(ctx: &ToolContext) -> String {
        let path = ctx.root.join(&ctx.config.copyright_file);
        fs::read_to_string(&path).unwrap_or_else(|_| DEFAULT_COPYRIGHT_HEADER.to_string())
    }

    /// Create an empty `__init__.py` next to each of `paths`, except in
    /// `root` itself. Returns the created files, sorted.
    pub fn add_missing_init(&self, root: &Path, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut folders: Vec<&Path> = paths
            .iter()
            .filter_map(|p| p.parent())
            .filter(|folder| *folder != root)
            .collect();
        folders.sort();
        folders.dedup();

        let mut created = Vec::new();
        for folder in folders {
            let init = folder.join("__init__.py");
            if !init.exists() {
                fs::write(&init, "")?;
                tracing::debug!(path = %init.display(), "created package marker");
                created.push(init);
            }
        }
        Ok(created)
    }

    /// Insert whichever of the encoding and copyright headers `path` lacks.
    ///
    /// An existing encoding line is moved above a newly added copyright
    /// block. Returns `None` when nothing changed.
    pub fn add_headers(
        &self,
        path: &Path,
        encoding: &str,
        copyright: &str,
        add_header: bool,
        add_copyright: bool,
    ) -> Result<Option<Finding>> {
        let old = fs::read_to_string(path)?;
        let has_encoding = old.contains(encoding);
        let has_copyright = COPYRIGHT.is_match(&old);
        if has_encoding && has_copyright {
            return Ok(None);
        }

        let mut body = old.clone();
        let mut head = String::new();
        if has_encoding {
            let marker = encoding.trim_end();
            body = old
                .split_inclusive('\n')
                .filter(|line| !line.contains(marker))
                .collect();
            head.push_str(encoding);
        } else if add_header {
            head.push_str(encoding);
        }
        if !has_copyright && add_copyright {
            head.push_str(copyright);
        }

        let new = head + &body;
        if new == old {
            return Ok(None);
        }
        atomic_replace(path, &new)?;
        Ok(Some(Finding::Format {
            path: path.to_path_buf(),
            diff: unified_diff(path, &old, &new),
            created: false,
            error: None,
            added_header: !has_encoding && add_header,
            added_copyright: !has_copyright && add_copyright,
        }))
    }
}

impl Tool for PythonFormatter {
    fn name(&self) -> &str {
        "pyformat"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Formatter
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn run(&self, ctx: &ToolContext, files: &FileSet) -> Result<ToolOutput> {
        let config = &ctx.config;
        let mut paths: Vec<PathBuf> = files
            .paths()
            .into_iter()
            .filter(|path| matches_extensions(path, &self.extensions))
            .map(Path::to_path_buf)
            .collect();

        let mut created = Vec::new();
        if config.add_init {
            created = self.add_missing_init(&ctx.root, &paths)?;
            paths.extend(created.iter().cloned());
        }
        paths.sort();
        paths.dedup();

        if !(config.add_header || config.add_copyright) {
            let findings = created
                .into_iter()
                .map(|path| Finding::Format {
                    path,
                    diff: String::new(),
                    created: true,
                    error: None,
                    added_header: false,
                    added_copyright: false,
                })
                .collect();
            return Ok(ToolOutput::from_findings(findings));
        }

        let copyright = Self::copyright_header(ctx);
        let mut findings = Vec::new();
        for path in &paths {
            match self.add_headers(
                path,
                &config.header,
                &copyright,
                config.add_header,
                config.add_copyright,
            ) {
                Ok(Some(mut finding)) => {
                    if let Finding::Format { created: flag, .. } = &mut finding {
                        *flag = created.contains(path);
                    }
                    findings.push(finding);
                }
                Ok(None) => {}
                Err(e) => findings.push(crashed(self.name(), path, &e)),
            }
        }
        Ok(ToolOutput::from_findings(findings))
    }
}
