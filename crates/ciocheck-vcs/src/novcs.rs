use std::path::{Path, PathBuf};

use ciocheck_core::{DiffMode, LineChanges, LineMap, Result};

use crate::adapter::{absolute, VcsAdapter};
use crate::walker::{walk_paths, WalkOptions};

/// Fallback adapter for folders outside any repository.
///
/// Claims every path. With no history to diff against, every file under the
/// folder counts as changed and line queries report
/// [`LineChanges::WholeFile`].
///
/// # Examples
///
/// ```no_run
/// use ciocheck_vcs::novcs::NoVcsAdapter;
/// use ciocheck_vcs::{VcsAdapter, WalkOptions};
/// use std::path::Path;
///
/// let adapter = NoVcsAdapter::new(Path::new("/tmp/project"), WalkOptions::default());
/// assert!(adapter.is_repo());
/// ```
#[derive(Debug)]
pub struct NoVcsAdapter {
    path: PathBuf,
    options: WalkOptions,
}

impl NoVcsAdapter {
    pub fn new(path: &Path, options: WalkOptions) -> Self {
        Self {
            path: absolute(path),
            options,
        }
    }
}

impl VcsAdapter for NoVcsAdapter {
    fn name(&self) -> &'static str {
        "novcs"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn is_repo(&self) -> bool {
        true
    }

    fn top_level(&self) -> Result<PathBuf> {
        Ok(self.path.clone())
    }

    fn files(&self, _mode: DiffMode, _branch: &str) -> Result<Vec<PathBuf>> {
        walk_paths(std::slice::from_ref(&self.path), &self.options)
    }

    fn file_lines(&self, mode: DiffMode, branch: &str) -> Result<LineMap> {
        Ok(self
            .files(mode, branch)?
            .into_iter()
            .map(|path| (path, LineChanges::WholeFile))
            .collect())
    }
}
