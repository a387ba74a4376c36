use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ciocheck_core::{CiocheckError, DiffMode, LineMap, Result};

use crate::adapter::VcsAdapter;
use crate::git::GitAdapter;
use crate::hg::HgAdapter;
use crate::novcs::NoVcsAdapter;
use crate::walker::WalkOptions;

/// Fans queries out to one adapter per repository root and merges the
/// answers.
///
/// Adapters are keyed by their root, so merged results do not depend on the
/// order the paths were given in.
pub struct DiffAggregator {
    adapters: BTreeMap<PathBuf, Box<dyn VcsAdapter>>,
}

impl std::fmt::Debug for DiffAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.adapters.iter().map(|(root, a)| (root, a.name())))
            .finish()
    }
}

impl DiffAggregator {
    /// Pick an adapter for each of `paths` (Git, then Mercurial, then
    /// NoVCS) and keep one per repository root.
    ///
    /// # Errors
    ///
    /// Returns [`CiocheckError::Selection`] if no adapter claims a path, and
    /// propagates root lookup failures.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ciocheck_vcs::{DiffAggregator, WalkOptions};
    /// use std::path::PathBuf;
    ///
    /// let aggregator = DiffAggregator::new(&[PathBuf::from(".")], &WalkOptions::default()).unwrap();
    /// println!("{:?}", aggregator.roots());
    /// ```
    pub fn new(paths: &[PathBuf], options: &WalkOptions) -> Result<Self> {
        let mut adapters = Vec::with_capacity(paths.len());
        for path in paths {
            adapters.push(select_adapter(path, options)?);
        }
        Self::from_adapters(adapters)
    }

    /// Build from already-selected adapters. The first adapter to claim a
    /// root is kept and takes on the paths of later adapters for that root,
    /// so each root is queried once.
    pub fn from_adapters(adapters: Vec<Box<dyn VcsAdapter>>) -> Result<Self> {
        let mut by_root: BTreeMap<PathBuf, Box<dyn VcsAdapter>> = BTreeMap::new();
        for adapter in adapters {
            let root = adapter.top_level()?;
            if let Some(kept) = by_root.get_mut(&root) {
                tracing::debug!(path = %adapter.path().display(), root = %root.display(), "root already claimed");
                kept.add_scope(adapter.path());
                continue;
            }
            tracing::debug!(adapter = adapter.name(), root = %root.display(), "selected adapter");
            by_root.insert(root, adapter);
        }
        Ok(Self { adapters: by_root })
    }

    /// Repository roots in query order.
    pub fn roots(&self) -> Vec<&Path> {
        self.adapters.keys().map(PathBuf::as_path).collect()
    }

    /// Changed files across every root, sorted and deduplicated.
    pub fn files(&self, mode: DiffMode, branch: &str) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for adapter in self.adapters.values() {
            files.extend(adapter.files(mode, branch)?);
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Changed lines across every root. A path already reported by an
    /// earlier root keeps its entry.
    pub fn file_lines(&self, mode: DiffMode, branch: &str) -> Result<LineMap> {
        let mut merged = LineMap::new();
        for adapter in self.adapters.values() {
            for (path, changes) in adapter.file_lines(mode, branch)? {
                merged.entry(path).or_insert(changes);
            }
        }
        Ok(merged)
    }

    pub fn commited_files(&self, branch: &str) -> Result<Vec<PathBuf>> {
        self.files(DiffMode::Committed, branch)
    }

    pub fn staged_files(&self) -> Result<Vec<PathBuf>> {
        self.files(DiffMode::Staged, "")
    }

    pub fn unstaged_files(&self) -> Result<Vec<PathBuf>> {
        self.files(DiffMode::Unstaged, "")
    }

    pub fn commited_file_lines(&self, branch: &str) -> Result<LineMap> {
        self.file_lines(DiffMode::Committed, branch)
    }

    pub fn staged_file_lines(&self) -> Result<LineMap> {
        self.file_lines(DiffMode::Staged, "")
    }

    pub fn unstaged_file_lines(&self) -> Result<LineMap> {
        self.file_lines(DiffMode::Unstaged, "")
    }
}

fn select_adapter(path: &Path, options: &WalkOptions) -> Result<Box<dyn VcsAdapter>> {
    let candidates: [Box<dyn VcsAdapter>; 3] = [
        Box::new(GitAdapter::new(path)),
        Box::new(HgAdapter::new(path)),
        Box::new(NoVcsAdapter::new(path, options.clone())),
    ];
    candidates
        .into_iter()
        .find(|adapter| adapter.is_repo())
        .ok_or_else(|| CiocheckError::Selection(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciocheck_core::LineChanges;
    use std::fs;

    struct FixedAdapter {
        root: PathBuf,
        scopes: Vec<PathBuf>,
        files: Vec<PathBuf>,
        lines: LineMap,
    }

    impl FixedAdapter {
        fn in_scope(&self, path: &Path) -> bool {
            self.scopes.iter().any(|scope| path.starts_with(scope))
        }
    }

    impl VcsAdapter for FixedAdapter {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn path(&self) -> &Path {
            &self.scopes[0]
        }
        fn is_repo(&self) -> bool {
            true
        }
        fn top_level(&self) -> Result<PathBuf> {
            Ok(self.root.clone())
        }
        fn add_scope(&mut self, path: &Path) {
            self.scopes.push(path.to_path_buf());
        }
        fn files(&self, _mode: DiffMode, _branch: &str) -> Result<Vec<PathBuf>> {
            Ok(self.files.iter().filter(|p| self.in_scope(p)).cloned().collect())
        }
        fn file_lines(&self, _mode: DiffMode, _branch: &str) -> Result<LineMap> {
            Ok(self
                .lines
                .iter()
                .filter(|(p, _)| self.in_scope(p))
                .map(|(p, c)| (p.clone(), c.clone()))
                .collect())
        }
    }

    fn fixed(root: &str, files: &[&str], added: u32) -> Box<dyn VcsAdapter> {
        scoped(root, root, files, added)
    }

    fn scoped(root: &str, path: &str, files: &[&str], added: u32) -> Box<dyn VcsAdapter> {
        let files: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
        let lines = files
            .iter()
            .map(|f| {
                (
                    f.clone(),
                    LineChanges::Lines {
                        added: vec![added],
                        deleted: vec![],
                    },
                )
            })
            .collect();
        Box::new(FixedAdapter {
            root: PathBuf::from(root),
            scopes: vec![PathBuf::from(path)],
            files,
            lines,
        })
    }

    #[test]
    fn merge_is_independent_of_root_order() {
        let forward = DiffAggregator::from_adapters(vec![
            fixed("/a", &["/a/x.py", "/a/b/shared.py"], 1),
            fixed("/a/b", &["/a/b/y.py", "/a/b/shared.py"], 2),
        ])
        .unwrap();
        let reversed = DiffAggregator::from_adapters(vec![
            fixed("/a/b", &["/a/b/y.py", "/a/b/shared.py"], 2),
            fixed("/a", &["/a/x.py", "/a/b/shared.py"], 1),
        ])
        .unwrap();

        assert_eq!(forward.staged_files().unwrap(), reversed.staged_files().unwrap());
        assert_eq!(
            forward.staged_files().unwrap(),
            vec![
                PathBuf::from("/a/b/shared.py"),
                PathBuf::from("/a/b/y.py"),
                PathBuf::from("/a/x.py")
            ]
        );

        let lines = forward.staged_file_lines().unwrap();
        assert_eq!(lines, reversed.staged_file_lines().unwrap());
        assert_eq!(lines[Path::new("/a/b/shared.py")].added(), &[1]);
    }

    #[test]
    fn shared_root_answers_for_every_sub_path() {
        let changed = ["/repo/pkg1/a.py", "/repo/pkg2/b.py", "/repo/other/c.py"];
        let forward = DiffAggregator::from_adapters(vec![
            scoped("/repo", "/repo/pkg1", &changed, 1),
            scoped("/repo", "/repo/pkg2", &changed, 1),
        ])
        .unwrap();
        let reversed = DiffAggregator::from_adapters(vec![
            scoped("/repo", "/repo/pkg2", &changed, 1),
            scoped("/repo", "/repo/pkg1", &changed, 1),
        ])
        .unwrap();

        assert_eq!(forward.roots(), vec![Path::new("/repo")]);
        let expected = vec![PathBuf::from("/repo/pkg1/a.py"), PathBuf::from("/repo/pkg2/b.py")];
        assert_eq!(forward.unstaged_files().unwrap(), expected);
        assert_eq!(reversed.unstaged_files().unwrap(), expected);

        let lines = reversed.staged_file_lines().unwrap();
        assert_eq!(lines.keys().cloned().collect::<Vec<_>>(), expected);
        assert_eq!(lines, forward.staged_file_lines().unwrap());
    }

    #[test]
    fn plain_folders_fall_back_to_novcs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("one")).unwrap();
        fs::create_dir_all(root.join("two")).unwrap();
        fs::write(root.join("one/a.py"), "").unwrap();
        fs::write(root.join("two/b.py"), "").unwrap();

        let paths = vec![root.join("two"), root.join("one")];
        let aggregator = DiffAggregator::new(&paths, &WalkOptions::default()).unwrap();
        if aggregator.adapters.values().any(|a| a.name() == "git") {
            // Temp dir lives inside an enclosing work tree; nothing to check.
            return;
        }
        assert_eq!(
            aggregator.commited_files("origin/master").unwrap(),
            vec![root.join("one/a.py"), root.join("two/b.py")]
        );
        let lines = aggregator.staged_file_lines().unwrap();
        assert!(lines.values().all(|c| *c == LineChanges::WholeFile));
    }
}
