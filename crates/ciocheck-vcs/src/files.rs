use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ciocheck_core::{CiocheckError, DiffMode, FileMode, FileSet, Result};
use ciocheck_difflens::filter::{filter_files, filter_lines};

use crate::aggregator::DiffAggregator;
use crate::walker::{walk_paths, WalkOptions};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    branch: String,
    diff_mode: DiffMode,
    file_mode: FileMode,
    extensions: Vec<String>,
}

/// Answers "which files should this tool look at?" for one run.
///
/// Every distinct `(branch, diff_mode, file_mode, extensions)` query hits the
/// version-control layer once; repeats return the same shared set.
///
/// # Examples
///
/// ```no_run
/// use ciocheck_core::{DiffMode, FileMode};
/// use ciocheck_vcs::{FileManager, WalkOptions};
/// use std::path::PathBuf;
///
/// let mut manager = FileManager::new(&[PathBuf::from(".")], WalkOptions::default()).unwrap();
/// let files = manager
///     .get_files("origin/master", DiffMode::Staged, FileMode::ModifiedLines, &["py".into()])
///     .unwrap();
/// println!("{} files selected", files.len());
/// ```
#[derive(Debug)]
pub struct FileManager {
    inputs: Vec<PathBuf>,
    options: WalkOptions,
    aggregator: DiffAggregator,
    cache: HashMap<CacheKey, Arc<FileSet>>,
}

impl FileManager {
    /// Resolve `paths` and detect the repositories they belong to.
    ///
    /// A file input contributes its parent folder to repository detection.
    ///
    /// # Errors
    ///
    /// Returns [`CiocheckError::FileNotFound`] for a missing input and
    /// [`CiocheckError::Selection`] if no adapter claims a folder.
    pub fn new(paths: &[PathBuf], options: WalkOptions) -> Result<Self> {
        let inputs = resolve_inputs(paths)?;

        let mut folders: Vec<PathBuf> = Vec::new();
        for input in &inputs {
            let folder = if input.is_file() {
                input.parent().map(Path::to_path_buf).unwrap_or_else(|| input.clone())
            } else {
                input.clone()
            };
            if !folders.contains(&folder) {
                folders.push(folder);
            }
        }

        let aggregator = DiffAggregator::new(&folders, &options)?;
        Ok(Self::with_aggregator(inputs, options, aggregator))
    }

    /// Build around an existing aggregator. `inputs` must already be
    /// absolute.
    pub fn with_aggregator(
        inputs: Vec<PathBuf>,
        options: WalkOptions,
        aggregator: DiffAggregator,
    ) -> Self {
        Self {
            inputs,
            options,
            aggregator,
            cache: HashMap::new(),
        }
    }

    /// Files selected for `file_mode`, narrowed to `extensions` (empty
    /// means all) and restricted to the inputs.
    ///
    /// # Errors
    ///
    /// Propagates [`CiocheckError::Git`] and [`CiocheckError::Parse`] from
    /// the version-control layer.
    pub fn get_files(
        &mut self,
        branch: &str,
        diff_mode: DiffMode,
        file_mode: FileMode,
        extensions: &[String],
    ) -> Result<Arc<FileSet>> {
        let key = CacheKey {
            branch: branch.to_string(),
            diff_mode,
            file_mode,
            extensions: extensions.to_vec(),
        };
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(%diff_mode, %file_mode, ?extensions, "file selection cache hit");
            return Ok(Arc::clone(hit));
        }

        let set = match file_mode {
            FileMode::All => {
                FileSet::Files(filter_files(walk_paths(&self.inputs, &self.options)?, extensions))
            }
            FileMode::ModifiedFiles => {
                let files = self.aggregator.files(diff_mode, branch)?;
                let files = files.into_iter().filter(|p| self.in_scope(p)).collect();
                FileSet::Files(filter_files(files, extensions))
            }
            FileMode::ModifiedLines => {
                let lines = self.aggregator.file_lines(diff_mode, branch)?;
                let lines = lines.into_iter().filter(|(p, _)| self.in_scope(p)).collect();
                FileSet::Lines(filter_lines(lines, extensions))
            }
        };

        tracing::debug!(%diff_mode, %file_mode, files = set.len(), "selected files");
        let set = Arc::new(set);
        self.cache.insert(key, Arc::clone(&set));
        Ok(set)
    }

    fn in_scope(&self, path: &Path) -> bool {
        self.inputs.iter().any(|input| path.starts_with(input))
    }
}

fn resolve_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::with_capacity(paths.len());
    for path in paths {
        let absolute = path
            .canonicalize()
            .map_err(|_| CiocheckError::FileNotFound(path.clone()))?;
        if !inputs.contains(&absolute) {
            inputs.push(absolute);
        }
    }
    Ok(inputs)
}
