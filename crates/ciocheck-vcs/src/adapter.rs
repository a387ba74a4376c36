use std::path::{Path, PathBuf};

use ciocheck_core::{DiffMode, LineMap, Result};

/// A source of changed files for one path on disk.
///
/// Implementors provide the two primitives [`files`](VcsAdapter::files) and
/// [`file_lines`](VcsAdapter::file_lines); the per-baseline queries are
/// derived from them. All returned paths are absolute.
pub trait VcsAdapter: Send + Sync {
    /// Short name used in logs (`git`, `hg`, `novcs`).
    fn name(&self) -> &'static str;

    /// The path this adapter was created for.
    fn path(&self) -> &Path;

    /// Whether [`path`](VcsAdapter::path) belongs to a repository this
    /// adapter understands.
    fn is_repo(&self) -> bool;

    /// Root directory of the repository.
    fn top_level(&self) -> Result<PathBuf>;

    /// Also answer for `path`, another folder under the same root.
    ///
    /// Adapters rooted at their own path never share a root, so the default
    /// ignores it.
    fn add_scope(&mut self, _path: &Path) {}

    /// Files added or modified against the `mode` baseline, sorted.
    ///
    /// `branch` is only consulted for [`DiffMode::Committed`].
    fn files(&self, mode: DiffMode, branch: &str) -> Result<Vec<PathBuf>>;

    /// Added and deleted lines per file against the `mode` baseline.
    fn file_lines(&self, mode: DiffMode, branch: &str) -> Result<LineMap>;

    /// Files changed on `HEAD` since it diverged from `branch`.
    fn commited_files(&self, branch: &str) -> Result<Vec<PathBuf>> {
        self.files(DiffMode::Committed, branch)
    }

    /// Files changed in the index.
    fn staged_files(&self) -> Result<Vec<PathBuf>> {
        self.files(DiffMode::Staged, "")
    }

    /// Files changed in the working tree but not staged.
    fn unstaged_files(&self) -> Result<Vec<PathBuf>> {
        self.files(DiffMode::Unstaged, "")
    }

    /// Changed lines on `HEAD` since it diverged from `branch`.
    fn commited_file_lines(&self, branch: &str) -> Result<LineMap> {
        self.file_lines(DiffMode::Committed, branch)
    }

    /// Changed lines in the index.
    fn staged_file_lines(&self) -> Result<LineMap> {
        self.file_lines(DiffMode::Staged, "")
    }

    /// Changed lines in the working tree but not staged.
    fn unstaged_file_lines(&self) -> Result<LineMap> {
        self.file_lines(DiffMode::Unstaged, "")
    }
}

/// Best-effort absolute form of `path`.
pub(crate) fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
