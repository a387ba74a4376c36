use std::path::{Path, PathBuf};

use ciocheck_core::{CheckConfig, CiocheckError, Result};

/// What a filesystem walk leaves out.
///
/// Hidden files and folders are always skipped. `.gitignore` rules are not
/// honoured: a walk selects everything a user could lint by hand.
///
/// # Examples
///
/// ```
/// use ciocheck_vcs::WalkOptions;
///
/// let options = WalkOptions::default();
/// assert!(options.ignore_folders.contains(&"__pycache__".to_string()));
/// assert!(options.ignore_extensions.contains(&"pyc".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    /// Folder names never descended into.
    pub ignore_folders: Vec<String>,
    /// Extensions (without the dot) never selected.
    pub ignore_extensions: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self::from_config(&CheckConfig::default())
    }
}

impl WalkOptions {
    /// Take the ignore lists from the run configuration.
    pub fn from_config(config: &CheckConfig) -> Self {
        Self {
            ignore_folders: config.ignore_folders.clone(),
            ignore_extensions: config.ignore_extensions.clone(),
        }
    }

    fn ignores_file(&self, name: &str) -> bool {
        self.ignore_extensions
            .iter()
            .any(|ext| name.ends_with(&format!(".{ext}")))
    }
}

/// Collect every file under `paths`.
///
/// Folder inputs are walked recursively; file inputs are returned as
/// themselves. Output is absolute, sorted and free of duplicates.
///
/// # Errors
///
/// Returns [`CiocheckError::FileNotFound`] if an input does not exist.
///
/// # Examples
///
/// ```no_run
/// use ciocheck_vcs::walker::walk_paths;
/// use ciocheck_vcs::WalkOptions;
/// use std::path::PathBuf;
///
/// let files = walk_paths(&[PathBuf::from(".")], &WalkOptions::default()).unwrap();
/// for f in &files {
///     println!("{}", f.display());
/// }
/// ```
pub fn walk_paths(paths: &[PathBuf], options: &WalkOptions) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in paths {
        let input = input
            .canonicalize()
            .map_err(|_| CiocheckError::FileNotFound(input.clone()))?;

        if input.is_file() {
            files.push(input);
            continue;
        }
        files.extend(walk_folder(&input, options));
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn walk_folder(root: &Path, options: &WalkOptions) -> Vec<PathBuf> {
    let skip_folders = options.ignore_folders.clone();
    let walker = ignore::WalkBuilder::new(root)
        .hidden(true)
        .parents(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && skip_folders.iter().any(|f| entry.file_name() == f.as_str()))
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if options.ignores_file(&name) {
            continue;
        }

        files.push(entry.into_path());
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_tree() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();

        fs::create_dir_all(root.join("pkg/__pycache__")).unwrap();
        fs::create_dir_all(root.join("build/lib")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::write(root.join("setup.py"), "").unwrap();
        fs::write(root.join("pkg/core.py"), "").unwrap();
        fs::write(root.join("pkg/core.py.orig"), "").unwrap();
        fs::write(root.join("pkg/core.pyc"), "").unwrap();
        fs::write(root.join("pkg/__pycache__/core.cpython-39.pyc"), "").unwrap();
        fs::write(root.join("build/lib/core.py"), "").unwrap();
        fs::write(root.join(".hidden/secret.py"), "").unwrap();
        fs::write(root.join(".env"), "").unwrap();
        fs::write(root.join(".gitignore"), "setup.py\n").unwrap();

        (dir, root)
    }

    #[test]
    fn walk_skips_ignored_and_hidden_entries() {
        let (_dir, root) = make_tree();
        let files = walk_paths(&[root.clone()], &WalkOptions::default()).unwrap();
        assert_eq!(files, vec![root.join("pkg/core.py"), root.join("setup.py")]);
    }

    #[test]
    fn file_input_is_returned_as_itself() {
        let (_dir, root) = make_tree();
        let files = walk_paths(
            &[root.join("pkg/core.py"), root.join("pkg")],
            &WalkOptions::default(),
        )
        .unwrap();
        assert_eq!(files, vec![root.join("pkg/core.py")]);
    }

    #[test]
    fn custom_ignore_lists() {
        let (_dir, root) = make_tree();
        let options = WalkOptions {
            ignore_folders: vec!["pkg".into()],
            ignore_extensions: vec![],
        };
        let files = walk_paths(&[root.clone()], &options).unwrap();
        assert_eq!(
            files,
            vec![root.join("build/lib/core.py"), root.join("setup.py")]
        );
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = walk_paths(&[dir.path().join("nope")], &WalkOptions::default()).unwrap_err();
        assert!(matches!(err, CiocheckError::FileNotFound(_)));
    }
}
