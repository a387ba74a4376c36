//! Git adapter.
//!
//! Repository detection goes through `git2`; diffs come from the `git` CLI so
//! the output honours the same rename and filter rules users see.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use ciocheck_core::{CiocheckError, DiffMode, LineMap, Result};
use ciocheck_difflens::parser::parse_line_changes;
use git2::Repository;

use crate::adapter::{absolute, VcsAdapter};

/// Adapter for paths inside a Git work tree.
///
/// # Examples
///
/// ```no_run
/// use ciocheck_vcs::git::GitAdapter;
/// use ciocheck_vcs::VcsAdapter;
/// use std::path::Path;
///
/// let git = GitAdapter::new(Path::new("."));
/// if git.is_repo() {
///     for file in git.staged_files().unwrap() {
///         println!("{}", file.display());
///     }
/// }
/// ```
#[derive(Debug)]
pub struct GitAdapter {
    path: PathBuf,
    scopes: Vec<PathBuf>,
    root: OnceLock<Option<PathBuf>>,
}

impl GitAdapter {
    /// Create an adapter for `path` (a directory).
    pub fn new(path: &Path) -> Self {
        let path = absolute(path);
        Self {
            scopes: vec![path.clone()],
            path,
            root: OnceLock::new(),
        }
    }

    fn in_scope(&self, path: &Path) -> bool {
        self.scopes.iter().any(|scope| path.starts_with(scope))
    }

    fn root(&self) -> Option<&Path> {
        self.root
            .get_or_init(|| match Repository::discover(&self.path) {
                Ok(repo) => repo.workdir().map(absolute),
                Err(e) => {
                    tracing::debug!(path = %self.path.display(), error = %e, "not a git repository");
                    None
                }
            })
            .as_deref()
    }

    fn diff(&self, mode: DiffMode, branch: &str, names_only: bool) -> Result<String> {
        let args = diff_args(mode, branch, names_only);
        tracing::debug!(cwd = %self.path.display(), ?args, "running git");

        let output = Command::new("git")
            .args(&args)
            .current_dir(&self.path)
            .output()
            .map_err(|e| CiocheckError::Git(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CiocheckError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Arguments for `git diff` against the `mode` baseline.
///
/// # Examples
///
/// ```
/// use ciocheck_core::DiffMode;
/// use ciocheck_vcs::git::diff_args;
///
/// let args = diff_args(DiffMode::Committed, "origin/master", true);
/// assert_eq!(args[3], "origin/master...HEAD");
/// assert_eq!(args.last().unwrap(), "-z");
/// ```
pub fn diff_args(mode: DiffMode, branch: &str, names_only: bool) -> Vec<String> {
    let mut args: Vec<String> = vec!["-c".into(), "diff.mnemonicprefix=no".into(), "diff".into()];
    match mode {
        DiffMode::Committed => args.push(format!("{branch}...HEAD")),
        DiffMode::Staged => args.push("--cached".into()),
        DiffMode::Unstaged => {}
    }
    args.extend(
        ["--no-color", "--no-ext-diff", "--diff-filter=AM"]
            .iter()
            .map(|arg| arg.to_string()),
    );
    if names_only {
        args.push("--name-only".into());
        args.push("-z".into());
    }
    args
}

impl VcsAdapter for GitAdapter {
    fn name(&self) -> &'static str {
        "git"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn is_repo(&self) -> bool {
        self.root().is_some()
    }

    fn top_level(&self) -> Result<PathBuf> {
        self.root().map(Path::to_path_buf).ok_or_else(|| {
            CiocheckError::Git(format!("{} is not in a git repository", self.path.display()))
        })
    }

    fn add_scope(&mut self, path: &Path) {
        let path = absolute(path);
        if !self.scopes.contains(&path) {
            self.scopes.push(path);
        }
    }

    fn files(&self, mode: DiffMode, branch: &str) -> Result<Vec<PathBuf>> {
        let root = self.top_level()?;
        let output = self.diff(mode, branch, true)?;

        let mut files: Vec<PathBuf> = output
            .split('\0')
            .filter(|name| !name.is_empty())
            .map(|name| root.join(name))
            .filter(|path| self.in_scope(path))
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    fn file_lines(&self, mode: DiffMode, branch: &str) -> Result<LineMap> {
        let root = self.top_level()?;
        let output = self.diff(mode, branch, false)?;

        Ok(parse_line_changes(&output)?
            .into_iter()
            .map(|(name, changes)| (root.join(name), changes))
            .filter(|(path, _)| self.in_scope(path))
            .collect())
    }
}
