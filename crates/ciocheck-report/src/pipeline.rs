//! One full check: select files, run tools, aggregate, enforce.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ciocheck_core::{CiocheckConfig, CiocheckError, FileSet, Result};
use ciocheck_tools::multiformat::{MultiFormatter, WorkerMode};
use ciocheck_tools::pool::PoolLimits;
use ciocheck_tools::registry::{RegisteredTool, Registry};
use ciocheck_tools::{CoverageMap, ToolContext, ToolOutput};
use ciocheck_vcs::{FileManager, WalkOptions};
use serde::Serialize;

use crate::aggregate::{aggregate, Report, ToolRun};
use crate::enforce::{enforced_failures, exit_code};

/// Result of [`Runner::run`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub report: Report,
    /// Enforced tools that failed.
    pub enforced_failures: BTreeSet<String>,
}

impl RunOutcome {
    /// 0 when no enforced tool failed, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        exit_code(&self.enforced_failures)
    }
}

/// Drives a check over a set of paths.
///
/// Tools run in phases: `pyformat` first, then every stdin-to-stdout
/// formatter through the worker pool, then linters, then the test runner.
/// Each tool gets the files matching its extensions from a shared
/// [`FileManager`], so identical selections hit version control once.
///
/// # Examples
///
/// ```no_run
/// use ciocheck_core::CiocheckConfig;
/// use ciocheck_report::Runner;
/// use std::path::{Path, PathBuf};
///
/// # async fn demo() -> ciocheck_core::Result<()> {
/// let mut runner = Runner::new(Path::new("."), &[PathBuf::from("src")], CiocheckConfig::default())?;
/// let outcome = runner.run().await?;
/// std::process::exit(outcome.exit_code());
/// # }
/// ```
#[derive(Debug)]
pub struct Runner {
    root: PathBuf,
    config: CiocheckConfig,
    files: FileManager,
    registry: Registry,
    mode: WorkerMode,
}

impl Runner {
    /// Detect repositories for `paths` and prepare the tools in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CiocheckError::FileNotFound`] for a missing path and
    /// [`CiocheckError::Selection`] if no adapter claims one.
    pub fn new(root: &Path, paths: &[PathBuf], config: CiocheckConfig) -> Result<Self> {
        let files = FileManager::new(paths, WalkOptions::from_config(&config.ciocheck))?;
        Ok(Self::with_file_manager(root, config, files))
    }

    /// Build around an existing file manager.
    pub fn with_file_manager(root: &Path, config: CiocheckConfig, files: FileManager) -> Self {
        let registry = Registry::from_config(&config);
        Self {
            root: root.to_path_buf(),
            config,
            files,
            registry,
            mode: WorkerMode::InProcess,
        }
    }

    /// Where formatter batches run (default: in process).
    pub fn worker_mode(mut self, mode: WorkerMode) -> Self {
        self.mode = mode;
        self
    }

    fn select(&mut self, extensions: &[String]) -> Result<Arc<FileSet>> {
        let check = &self.config.ciocheck;
        self.files
            .get_files(&check.branch, check.diff_mode, check.file_mode, extensions)
    }

    fn tool_run(&self, name: &str, files: Arc<FileSet>, output: ToolOutput) -> ToolRun {
        ToolRun {
            tool: name.to_string(),
            findings: output.findings,
            files,
            file_mode: self.config.ciocheck.file_mode,
            summary_failed: output.summary_failed,
        }
    }

    /// Run every configured tool and aggregate the results.
    ///
    /// # Errors
    ///
    /// File selection errors ([`CiocheckError::Git`],
    /// [`CiocheckError::Parse`], [`CiocheckError::Selection`]) abort the run.
    /// A tool that cannot be set up or cannot run is logged and counted as
    /// failed.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let resolved = self.registry.resolve(&self.config.ciocheck.check);
        let tools = resolved.tools;
        let ctx = Arc::new(ToolContext::new(&self.root, self.config.ciocheck.clone()));
        tracing::info!(
            tools = ?tools.iter().map(RegisteredTool::name).collect::<Vec<_>>(),
            "starting check"
        );

        let mut pyformat = Vec::new();
        let mut formatters = Vec::new();
        let mut linters = Vec::new();
        let mut testers = Vec::new();
        for tool in tools {
            match tool {
                RegisteredTool::PyFormat(_) => pyformat.push(tool),
                RegisteredTool::Formatter(formatter) => formatters.push(formatter),
                RegisteredTool::Linter(_) => linters.push(tool),
                RegisteredTool::Tester(_) => testers.push(tool),
            }
        }

        let mut runs = Vec::new();
        let mut coverage: Option<CoverageMap> = None;

        for tool in pyformat {
            runs.push(self.run_one(&ctx, tool).await?.0);
        }

        let multi = MultiFormatter::new(
            formatters,
            PoolLimits::from_config(&self.config.pool),
            self.mode.clone(),
        );
        if !multi.is_empty() {
            runs.extend(self.run_formatters(&multi).await?);
        }

        for tool in linters.into_iter().chain(testers) {
            let (run, covered) = self.run_one(&ctx, tool).await?;
            if covered.is_some() {
                coverage = covered;
            }
            runs.push(run);
        }

        for name in &resolved.broken {
            let output = ToolOutput {
                summary_failed: true,
                ..ToolOutput::default()
            };
            runs.push(self.tool_run(name, Arc::new(FileSet::Files(Vec::new())), output));
        }

        let report = aggregate(&runs, coverage.as_ref());
        let enforced = enforced_failures(&self.config.ciocheck.enforce, &report.failed);
        tracing::info!(
            failed = ?report.failed,
            enforced = ?enforced,
            "check finished"
        );
        Ok(RunOutcome {
            report,
            enforced_failures: enforced,
        })
    }

    async fn run_one(
        &mut self,
        ctx: &Arc<ToolContext>,
        tool: RegisteredTool,
    ) -> Result<(ToolRun, Option<CoverageMap>)> {
        let name = tool.name().to_string();
        let files = self.select(tool.as_tool().extensions())?;
        tracing::info!(tool = %name, files = files.len(), "running tool");

        let task_ctx = Arc::clone(ctx);
        let task_files = Arc::clone(&files);
        let result = tokio::task::spawn_blocking(move || tool.as_tool().run(&task_ctx, &task_files))
            .await
            .map_err(|e| CiocheckError::tool(&name, format!("task failed: {e}")))
            .and_then(|result| result);

        let mut output = match result {
            Ok(output) => output,
            Err(e) => failed_output(&name, &e),
        };
        let coverage = output.coverage.take();
        Ok((self.tool_run(&name, files, output), coverage))
    }

    async fn run_formatters(&mut self, multi: &MultiFormatter) -> Result<Vec<ToolRun>> {
        let files = self.select(&multi.extensions())?;
        tracing::info!(formatters = ?multi.names(), files = files.len(), "formatting");

        let mut grouped = match multi.run(&self.root, &files).await {
            Ok(grouped) => Some(grouped),
            Err(e) => {
                tracing::error!(error = %e, "formatting failed");
                None
            }
        };

        Ok(multi
            .names()
            .into_iter()
            .map(|name| {
                let output = match grouped.as_mut() {
                    Some(grouped) => {
                        ToolOutput::from_findings(grouped.remove(&name).unwrap_or_default())
                    }
                    None => ToolOutput {
                        summary_failed: true,
                        ..ToolOutput::default()
                    },
                };
                self.tool_run(&name, Arc::clone(&files), output)
            })
            .collect())
    }
}

fn failed_output(name: &str, err: &CiocheckError) -> ToolOutput {
    tracing::error!(tool = %name, error = %err, "tool could not run");
    ToolOutput {
        summary_failed: true,
        ..ToolOutput::default()
    }
}
