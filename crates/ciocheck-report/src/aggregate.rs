//! Merge per-tool results into a per-file report.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ciocheck_core::{FileMode, FileSet, Finding, LineChanges};
use ciocheck_tools::CoverageMap;
use serde::Serialize;

/// Names of the tools that failed in one run.
pub type EnforcementState = BTreeSet<String>;

/// What one tool produced, together with the selection it ran on.
#[derive(Debug, Clone)]
pub struct ToolRun {
    /// Tool name.
    pub tool: String,
    /// Findings in tool output order.
    pub findings: Vec<Finding>,
    /// Files the tool was given.
    pub files: Arc<FileSet>,
    /// Selection granularity used for `files`.
    pub file_mode: FileMode,
    /// Aggregate failure signal independent of findings (test summary,
    /// tool that could not run).
    pub summary_failed: bool,
}

/// Findings from one tool about one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolFindings {
    pub tool: String,
    pub findings: Vec<Finding>,
}

/// Everything reported about one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub path: PathBuf,
    /// Per-tool findings, tools in run order.
    pub results: Vec<ToolFindings>,
}

/// Test coverage of the lines added to one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageStat {
    /// Added lines no test executed.
    pub uncovered: Vec<u32>,
    /// Share of added lines left uncovered, in percent.
    pub uncovered_percent: f64,
}

/// Merged results of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Tools that ran, in run order.
    pub tools: Vec<String>,
    /// Files with at least one surviving finding, sorted by path.
    pub files: Vec<FileReport>,
    /// Tools with at least one surviving finding or a failed summary.
    pub failed: EnforcementState,
    /// Coverage of added lines, per file.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub coverage: BTreeMap<PathBuf, CoverageStat>,
}

impl Report {
    /// Total number of findings across all files and tools.
    pub fn finding_count(&self) -> usize {
        self.files
            .iter()
            .flat_map(|file| &file.results)
            .map(|result| result.findings.len())
            .sum()
    }

    /// Findings per tool, tools in run order, skipping tools without any.
    pub fn counts_by_tool(&self) -> Vec<(&str, usize)> {
        self.tools
            .iter()
            .filter_map(|tool| {
                let count: usize = self
                    .files
                    .iter()
                    .flat_map(|file| &file.results)
                    .filter(|result| &result.tool == tool)
                    .map(|result| result.findings.len())
                    .sum();
                (count > 0).then_some((tool.as_str(), count))
            })
            .collect()
    }
}

/// Whether `finding` survives line filtering against `files`.
///
/// Only line-mode selections filter: a finding with a line is kept when that
/// line was added, a finding without one is always kept. A path missing from
/// the selection keeps only line-less findings.
fn keep(finding: &Finding, files: &FileSet, file_mode: FileMode) -> bool {
    if file_mode != FileMode::ModifiedLines {
        return true;
    }
    let Some(line) = finding.line() else {
        return true;
    };
    match files.line_changes(finding.path()) {
        Some(changes) => changes.is_added(line),
        None => matches!(files, FileSet::Files(_)),
    }
}

fn coverage_stats(runs: &[ToolRun], coverage: &CoverageMap) -> BTreeMap<PathBuf, CoverageStat> {
    let mut added: BTreeMap<&Path, &[u32]> = BTreeMap::new();
    for run in runs {
        if let FileSet::Lines(map) = run.files.as_ref() {
            for (path, changes) in map {
                if let LineChanges::Lines { added: lines, .. } = changes {
                    added.entry(path.as_path()).or_insert(lines.as_slice());
                }
            }
        }
    }

    added
        .into_iter()
        .filter_map(|(path, lines)| {
            let covered = coverage.get(path)?;
            if lines.is_empty() || covered.is_empty() {
                return None;
            }
            let uncovered: Vec<u32> = lines
                .iter()
                .copied()
                .filter(|line| !covered.contains(line))
                .collect();
            let uncovered_percent = 100.0 * uncovered.len() as f64 / lines.len() as f64;
            Some((
                path.to_path_buf(),
                CoverageStat {
                    uncovered,
                    uncovered_percent,
                },
            ))
        })
        .collect()
}

/// Merge `runs` into one report.
///
/// Files are the union of every tool's finding paths, sorted. For each file,
/// tools appear in run order and findings in tool output order.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ciocheck_core::{FileMode, FileSet, Finding};
/// use ciocheck_report::{aggregate, ToolRun};
///
/// let finding = Finding::Lint {
///     path: "/repo/a.py".into(),
///     line: Some(1),
///     column: None,
///     code: Some("E501".into()),
///     message: "line too long".into(),
///     symbol: None,
///     extra: Default::default(),
/// };
/// let run = ToolRun {
///     tool: "pep8".into(),
///     findings: vec![finding],
///     files: Arc::new(FileSet::Files(vec!["/repo/a.py".into()])),
///     file_mode: FileMode::ModifiedFiles,
///     summary_failed: false,
/// };
/// let report = aggregate(&[run], None);
/// assert!(report.failed.contains("pep8"));
/// assert_eq!(report.files.len(), 1);
/// ```
pub fn aggregate(runs: &[ToolRun], coverage: Option<&CoverageMap>) -> Report {
    let mut by_path: BTreeMap<PathBuf, Vec<ToolFindings>> = BTreeMap::new();
    let mut failed = EnforcementState::new();

    for run in runs {
        let mut kept: BTreeMap<&Path, Vec<Finding>> = BTreeMap::new();
        let mut dropped = 0usize;
        for finding in &run.findings {
            if keep(finding, &run.files, run.file_mode) {
                kept.entry(finding.path()).or_default().push(finding.clone());
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::debug!(tool = %run.tool, dropped, "findings outside changed lines");
        }

        if !kept.is_empty() || run.summary_failed {
            failed.insert(run.tool.clone());
        }
        for (path, findings) in kept {
            by_path
                .entry(path.to_path_buf())
                .or_default()
                .push(ToolFindings {
                    tool: run.tool.clone(),
                    findings,
                });
        }
    }

    Report {
        tools: runs.iter().map(|run| run.tool.clone()).collect(),
        files: by_path
            .into_iter()
            .map(|(path, results)| FileReport { path, results })
            .collect(),
        failed,
        coverage: coverage
            .map(|map| coverage_stats(runs, map))
            .unwrap_or_default(),
    }
}
