//! Parallel formatting over batches of files.
//!
//! Files are split into sorted batches and each batch runs either on the
//! blocking thread pool or in a worker subprocess (`ciocheck format-task`).
//! The worker learns what to do from its environment and prints a JSON
//! array with one object per changed file, mapping formatter name to the
//! change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ciocheck_core::{CiocheckConfig, CiocheckError, FileSet, Finding, Result, CONFIG_FILE_NAME};
use ciocheck_difflens::filter::matches_extensions;

use crate::formatters::{crashed, ExternalFormatter};
use crate::pool::{PoolLimits, WorkerPool};
use crate::registry::Registry;

/// Subcommand the worker subprocess is started with.
pub const FORMAT_TASK_COMMAND: &str = "format-task";
/// Project root handed to a worker.
pub const ENV_PROJECT_ROOT: &str = "CIOCHECK_PROJECT_ROOT";
/// JSON array of enabled formatter names handed to a worker.
pub const ENV_CHECK: &str = "CIOCHECK_CHECK";
/// Explicit configuration file handed to a worker.
pub const ENV_CONFIG: &str = "CIOCHECK_CONFIG";

/// Changes made to one file, keyed by formatter name.
pub type FileChanges = BTreeMap<String, Finding>;

/// Where batches run.
#[derive(Debug, Clone)]
pub enum WorkerMode {
    /// On tokio's blocking thread pool.
    InProcess,
    /// In `program format-task <files>...` subprocesses.
    Subprocess {
        /// Executable providing the `format-task` subcommand.
        program: PathBuf,
        /// Configuration file the worker should load instead of the one in
        /// the project root.
        config: Option<PathBuf>,
    },
}

/// Run every formatter that accepts each path, in order.
///
/// Files no formatter changed are left out.
pub fn format_batch(
    formatters: &[Arc<ExternalFormatter>],
    root: &Path,
    paths: &[PathBuf],
) -> Vec<FileChanges> {
    paths
        .iter()
        .filter_map(|path| {
            let changes: FileChanges = formatters
                .iter()
                .filter(|f| matches_extensions(path, f.extensions()))
                .filter_map(|f| {
                    f.format_file(root, path)
                        .map(|finding| (f.name().to_string(), finding))
                })
                .collect();
            (!changes.is_empty()).then_some(changes)
        })
        .collect()
}

/// Group per-file changes by formatter, each group sorted by path.
///
/// # Examples
///
/// ```
/// use ciocheck_core::Finding;
/// use ciocheck_tools::multiformat::{regroup, FileChanges};
/// use std::path::PathBuf;
///
/// let change = |p: &str| Finding::Format {
///     path: PathBuf::from(p),
///     diff: String::new(),
///     created: false,
///     error: None,
///     added_header: false,
///     added_copyright: false,
/// };
/// let mut b = FileChanges::new();
/// b.insert("isort".into(), change("/b.py"));
/// let mut a = FileChanges::new();
/// a.insert("isort".into(), change("/a.py"));
///
/// let grouped = regroup(vec![b, a]);
/// assert_eq!(grouped["isort"][0].path(), PathBuf::from("/a.py"));
/// ```
pub fn regroup(results: Vec<FileChanges>) -> BTreeMap<String, Vec<Finding>> {
    let mut grouped: BTreeMap<String, Vec<Finding>> = BTreeMap::new();
    for changes in results {
        for (name, finding) in changes {
            grouped.entry(name).or_default().push(finding);
        }
    }
    for findings in grouped.values_mut() {
        findings.sort_by(|a, b| a.path().cmp(b.path()));
    }
    grouped
}

/// Runs several stdin-to-stdout formatters over a file set in parallel.
#[derive(Debug, Clone)]
pub struct MultiFormatter {
    formatters: Vec<Arc<ExternalFormatter>>,
    limits: PoolLimits,
    mode: WorkerMode,
}

impl MultiFormatter {
    pub fn new(formatters: Vec<Arc<ExternalFormatter>>, limits: PoolLimits, mode: WorkerMode) -> Self {
        Self {
            formatters,
            limits,
            mode,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.formatters.is_empty()
    }

    /// Names of the formatters, in run order.
    pub fn names(&self) -> Vec<String> {
        self.formatters.iter().map(|f| f.name().to_string()).collect()
    }

    /// Extensions accepted by any formatter; empty when one accepts all.
    pub fn extensions(&self) -> Vec<String> {
        if self.formatters.iter().any(|f| f.extensions().is_empty()) {
            return Vec::new();
        }
        let mut all: Vec<String> = self
            .formatters
            .iter()
            .flat_map(|f| f.extensions().iter().cloned())
            .collect();
        all.sort();
        all.dedup();
        all
    }

    /// Format every file in `files`, returning the changes per formatter.
    ///
    /// A batch whose worker fails is recorded as a crash of every formatter
    /// on each of its files; the other batches keep their changes.
    ///
    /// # Errors
    ///
    /// Returns [`CiocheckError::Tool`] if a pool task panics or the formatter
    /// list cannot be encoded for the workers.
    pub async fn run(&self, root: &Path, files: &FileSet) -> Result<BTreeMap<String, Vec<Finding>>> {
        if self.formatters.is_empty() || files.is_empty() {
            return Ok(BTreeMap::new());
        }

        let mut paths: Vec<PathBuf> = files.paths().into_iter().map(Path::to_path_buf).collect();
        paths.sort();

        let check = serde_json::to_string(&self.names())?;
        let mut pool: WorkerPool<Vec<FileChanges>> = WorkerPool::new(self.limits);

        for batch in paths.chunks(self.limits.batch_size) {
            let batch = batch.to_vec();
            let root = root.to_path_buf();
            let formatters = self.formatters.clone();
            match &self.mode {
                WorkerMode::InProcess => {
                    pool.submit(async move {
                        let task_formatters = formatters.clone();
                        let task_batch = batch.clone();
                        let result = tokio::task::spawn_blocking(move || {
                            format_batch(&task_formatters, &root, &task_batch)
                        })
                        .await
                        .map_err(|e| CiocheckError::tool("multiformat", format!("batch failed: {e}")));
                        or_crashed(result, &formatters, &batch)
                    })
                    .await?;
                }
                WorkerMode::Subprocess { program, config } => {
                    let worker = run_worker(
                        program.clone(),
                        config.clone(),
                        root,
                        check.clone(),
                        batch.clone(),
                    );
                    pool.submit(async move { or_crashed(worker.await, &formatters, &batch) })
                        .await?;
                }
            }
        }

        let results: Vec<FileChanges> = pool.await_all().await?.into_iter().flatten().collect();
        tracing::info!(changed = results.len(), "formatting finished");
        Ok(regroup(results))
    }
}

/// Changes from a finished batch, or a crash finding from every matching
/// formatter for each file of a failed one.
fn or_crashed(
    result: Result<Vec<FileChanges>>,
    formatters: &[Arc<ExternalFormatter>],
    batch: &[PathBuf],
) -> Vec<FileChanges> {
    let err = match result {
        Ok(changes) => return changes,
        Err(e) => e,
    };
    tracing::error!(error = %err, files = batch.len(), "format batch failed");
    batch
        .iter()
        .map(|path| {
            formatters
                .iter()
                .filter(|f| matches_extensions(path, f.extensions()))
                .map(|f| (f.name().to_string(), crashed(f.name(), path, &err)))
                .collect::<FileChanges>()
        })
        .filter(|changes| !changes.is_empty())
        .collect()
}

async fn run_worker(
    program: PathBuf,
    config: Option<PathBuf>,
    root: PathBuf,
    check: String,
    batch: Vec<PathBuf>,
) -> Result<Vec<FileChanges>> {
    let mut command = tokio::process::Command::new(&program);
    command
        .arg(FORMAT_TASK_COMMAND)
        .args(&batch)
        .env(ENV_PROJECT_ROOT, &root)
        .env(ENV_CHECK, &check)
        .kill_on_drop(true);
    if let Some(config) = &config {
        command.env(ENV_CONFIG, config);
    }

    tracing::debug!(program = %program.display(), files = batch.len(), "starting format worker");
    let output = command
        .output()
        .await
        .map_err(|e| CiocheckError::tool("multiformat", format!("failed to start worker: {e}")))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        tracing::warn!(stderr = %stderr.trim(), "format worker wrote to stderr");
    }
    if !output.status.success() {
        return Err(CiocheckError::tool(
            "multiformat",
            format!("worker exited with {}", output.status),
        ));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| CiocheckError::tool("multiformat", format!("unreadable worker output: {e}")))
}

/// Worker side of the subprocess protocol: format `paths` with the
/// formatters named in the environment and return the JSON report.
///
/// # Errors
///
/// Returns [`CiocheckError::Config`] if the project root is not set or the
/// formatter list is not a JSON array of strings.
pub fn run_format_task(paths: &[PathBuf]) -> Result<String> {
    let root = std::env::var_os(ENV_PROJECT_ROOT)
        .map(PathBuf::from)
        .ok_or_else(|| CiocheckError::Config(format!("{ENV_PROJECT_ROOT} is not set")))?;
    let check: Vec<String> = match std::env::var(ENV_CHECK) {
        Ok(raw) => serde_json::from_str(&raw)
            .map_err(|e| CiocheckError::Config(format!("{ENV_CHECK} is not a JSON list: {e}")))?,
        Err(_) => Vec::new(),
    };
    let config_path = std::env::var_os(ENV_CONFIG)
        .map(PathBuf::from)
        .unwrap_or_else(|| root.join(CONFIG_FILE_NAME));

    let config = CiocheckConfig::load_or_default(&config_path);
    let formatters = Registry::from_config(&config).multi_formatters(&check);
    let results = format_batch(&formatters, &root, paths);
    Ok(serde_json::to_string(&results)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn extensions_are_merged() {
        let multi = MultiFormatter::new(
            vec![
                Arc::new(ExternalFormatter::yapf()),
                Arc::new(ExternalFormatter::isort()),
            ],
            PoolLimits::default(),
            WorkerMode::InProcess,
        );
        assert_eq!(multi.extensions(), vec!["py".to_string()]);
        assert_eq!(multi.names(), vec!["yapf".to_string(), "isort".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn in_process_batches_are_regrouped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut files = Vec::new();
        for name in ["e.py", "d.py", "c.py", "b.py", "a.py"] {
            let path = root.join(name);
            fs::write(&path, "abc\n").unwrap();
            files.push(path);
        }
        fs::write(root.join("ok.py"), "ALREADY\n").unwrap();
        files.push(root.join("ok.py"));

        let upper = ExternalFormatter::new(
            "upper",
            vec!["tr".into(), "a-z".into(), "A-Z".into()],
            vec!["py".into()],
        );
        let limits = PoolLimits {
            batch_size: 2,
            in_flight_factor: 1,
            workers: 1,
        };
        let multi = MultiFormatter::new(vec![Arc::new(upper)], limits, WorkerMode::InProcess);
        let grouped = multi.run(&root, &FileSet::Files(files)).await.unwrap();

        let paths: Vec<_> = grouped["upper"].iter().map(|f| f.path().to_path_buf()).collect();
        assert_eq!(
            paths,
            ["a.py", "b.py", "c.py", "d.py", "e.py"]
                .iter()
                .map(|n| root.join(n))
                .collect::<Vec<_>>()
        );
        assert_eq!(fs::read_to_string(root.join("c.py")).unwrap(), "ABC\n");
    }

    #[tokio::test]
    async fn empty_selection_skips_workers() {
        let multi = MultiFormatter::new(
            vec![Arc::new(ExternalFormatter::isort())],
            PoolLimits::default(),
            WorkerMode::Subprocess {
                program: PathBuf::from("ciocheck-no-such-binary"),
                config: None,
            },
        );
        let grouped = multi.run(Path::new("/"), &FileSet::Files(vec![])).await.unwrap();
        assert!(grouped.is_empty());
    }

    #[tokio::test]
    async fn missing_worker_binary_is_a_crash_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "x = 1\n").unwrap();
        let multi = MultiFormatter::new(
            vec![Arc::new(ExternalFormatter::isort())],
            PoolLimits::default(),
            WorkerMode::Subprocess {
                program: PathBuf::from("ciocheck-no-such-binary"),
                config: None,
            },
        );
        let grouped = multi.run(dir.path(), &FileSet::Files(vec![file.clone()])).await.unwrap();
        match &grouped["isort"][..] {
            [Finding::Format { path, error: Some(error), .. }] => {
                assert_eq!(path, &file);
                assert!(error.starts_with("isort crashed on"));
            }
            other => panic!("unexpected findings {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_worker_keeps_sibling_batches() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let worker = root.join("worker.sh");
        fs::write(
            &worker,
            r#"#!/bin/sh
shift
for f in "$@"; do
  case "$f" in *zbad*) exit 2 ;; esac
done
printf '['
sep=''
for f in "$@"; do
  printf '%s{"upper":{"kind":"format","path":"%s","diff":"-a +A"}}' "$sep" "$f"
  sep=','
done
printf ']'
"#,
        )
        .unwrap();
        fs::set_permissions(&worker, fs::Permissions::from_mode(0o755)).unwrap();

        let files: Vec<PathBuf> = ["a.py", "b.py", "c.py", "zbad.py"]
            .iter()
            .map(|n| root.join(n))
            .collect();
        let upper = ExternalFormatter::new("upper", vec!["tr".into()], vec!["py".into()]);
        let limits = PoolLimits {
            batch_size: 3,
            in_flight_factor: 2,
            workers: 2,
        };
        let multi = MultiFormatter::new(
            vec![Arc::new(upper)],
            limits,
            WorkerMode::Subprocess {
                program: worker,
                config: None,
            },
        );
        let grouped = multi.run(&root, &FileSet::Files(files)).await.unwrap();

        let findings = &grouped["upper"];
        assert_eq!(findings.len(), 4);
        for finding in &findings[..3] {
            assert!(matches!(finding, Finding::Format { error: None, .. }));
        }
        match &findings[3] {
            Finding::Format { path, error: Some(error), .. } => {
                assert_eq!(path, &root.join("zbad.py"));
                assert!(error.contains("worker exited"));
            }
            other => panic!("unexpected finding {other:?}"),
        }
    }
}
