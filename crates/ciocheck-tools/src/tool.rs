use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ciocheck_core::{CheckConfig, FileSet, Finding, Result, ToolKind};

/// Covered line numbers per absolute path, as reported by coverage.
pub type CoverageMap = BTreeMap<PathBuf, Vec<u32>>;

/// Everything a tool may consult while running.
///
/// Passed explicitly to every [`Tool::run`] call; tools hold no shared
/// mutable state of their own.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Project root; commands run here and relative paths resolve against it.
    pub root: PathBuf,
    /// Resolved run settings.
    pub config: CheckConfig,
}

impl ToolContext {
    pub fn new(root: impl Into<PathBuf>, config: CheckConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// `path` made absolute against the project root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path.strip_prefix("./").unwrap_or(path));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// What one tool run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// Findings in tool output order.
    pub findings: Vec<Finding>,
    /// Covered lines, for tools that measure coverage.
    pub coverage: Option<CoverageMap>,
    /// Set when the tool reported failure in aggregate (test summary), even
    /// if no individual finding survives filtering.
    pub summary_failed: bool,
}

impl ToolOutput {
    pub fn from_findings(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            ..Self::default()
        }
    }
}

/// A linter, formatter or test runner.
pub trait Tool: Send + Sync {
    /// Name used in `check` and `enforce` lists.
    fn name(&self) -> &str;

    /// Family the tool belongs to.
    fn kind(&self) -> ToolKind;

    /// Extensions (without the dot) the tool accepts; empty means all.
    fn extensions(&self) -> &[String];

    /// Run over the selected files.
    ///
    /// # Errors
    ///
    /// Returns [`ciocheck_core::CiocheckError::Tool`] when the tool cannot
    /// be run at all. Per-file problems are reported as findings.
    fn run(&self, ctx: &ToolContext, files: &FileSet) -> Result<ToolOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_joins_relative_paths() {
        let ctx = ToolContext::new("/project", CheckConfig::default());
        assert_eq!(ctx.resolve("pkg/a.py"), PathBuf::from("/project/pkg/a.py"));
        assert_eq!(ctx.resolve("/abs/b.py"), PathBuf::from("/abs/b.py"));
        assert_eq!(ctx.resolve("./setup.py"), PathBuf::from("/project/setup.py"));
    }
}
