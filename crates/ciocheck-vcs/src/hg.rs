//! Mercurial adapter.
//!
//! Repository detection is not implemented: every path reports as outside a
//! Mercurial repository, so selection falls through to [`NoVcsAdapter`].
//!
//! [`NoVcsAdapter`]: crate::novcs::NoVcsAdapter

use std::path::{Path, PathBuf};

use ciocheck_core::{DiffMode, LineMap, Result};

use crate::adapter::{absolute, VcsAdapter};

/// Placeholder adapter for Mercurial work trees.
#[derive(Debug)]
pub struct HgAdapter {
    path: PathBuf,
}

impl HgAdapter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: absolute(path),
        }
    }
}

impl VcsAdapter for HgAdapter {
    fn name(&self) -> &'static str {
        "hg"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn is_repo(&self) -> bool {
        false
    }

    fn top_level(&self) -> Result<PathBuf> {
        Ok(self.path.clone())
    }

    fn files(&self, _mode: DiffMode, _branch: &str) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    fn file_lines(&self, _mode: DiffMode, _branch: &str) -> Result<LineMap> {
        Ok(LineMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_claims_a_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".hg")).unwrap();
        let hg = HgAdapter::new(dir.path());
        assert!(!hg.is_repo());
        assert!(hg.staged_files().unwrap().is_empty());
        assert!(hg.commited_file_lines("default").unwrap().is_empty());
    }
}
