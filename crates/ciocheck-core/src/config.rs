use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CiocheckError;
use crate::types::{DiffMode, FileMode};

/// Default configuration file name, looked up in the project root.
pub const CONFIG_FILE_NAME: &str = ".ciocheck.toml";

/// Base branch used by committed-mode diffs.
pub const DEFAULT_BRANCH: &str = "origin/master";

/// Encoding header inserted by the `pyformat` formatter.
pub const DEFAULT_ENCODING_HEADER: &str = "# -*- coding: utf-8 -*-\n";

/// Copyright header inserted when no copyright file exists.
pub const DEFAULT_COPYRIGHT_HEADER: &str = "\
# -----------------------------------------------------------------------------
# Copyright (c) 2016 Continuum Analytics, Inc.
#
# May be copied and distributed freely only as part of an Anaconda or
# Miniconda installation.
# -----------------------------------------------------------------------------
";

/// Top-level configuration loaded from `.ciocheck.toml`.
///
/// Supports layered resolution: CLI flags > config file (with
/// `inherit_config`) > defaults.
///
/// # Examples
///
/// ```
/// use ciocheck_core::CiocheckConfig;
///
/// let config = CiocheckConfig::default();
/// assert_eq!(config.ciocheck.branch, "origin/master");
/// assert_eq!(config.ciocheck.check, vec!["pep8".to_string()]);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CiocheckConfig {
    /// Main run settings.
    #[serde(default)]
    pub ciocheck: CheckConfig,
    /// Formatting worker pool settings.
    #[serde(default)]
    pub pool: PoolConfig,
    /// User-defined regex linters.
    #[serde(default)]
    pub linters: Vec<CustomLinter>,
    /// User-defined stdin-to-stdout formatters.
    #[serde(default)]
    pub formatters: Vec<CustomFormatter>,
}

impl CiocheckConfig {
    /// Load configuration from a TOML file at `path`, following
    /// `inherit_config` chains.
    ///
    /// A base file named by `inherit_config` is resolved relative to the
    /// inheriting file; keys in the inheriting file win. A file that
    /// (directly or indirectly) inherits from itself stops the chain.
    ///
    /// # Errors
    ///
    /// Returns [`CiocheckError::Io`] if a file cannot be read, or
    /// [`CiocheckError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ciocheck_core::CiocheckConfig;
    /// use std::path::Path;
    ///
    /// let config = CiocheckConfig::from_file(Path::new(".ciocheck.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, CiocheckError> {
        let mut visited = HashSet::new();
        let table = load_table(path, &mut visited)?;
        let config = toml::Value::Table(table).try_into()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string. `inherit_config` is not
    /// followed since there is no file to resolve it against.
    ///
    /// # Errors
    ///
    /// Returns [`CiocheckError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use ciocheck_core::{CiocheckConfig, FileMode};
    ///
    /// let toml = r#"
    /// [ciocheck]
    /// file_mode = "all"
    /// enforce = ["flake8"]
    /// "#;
    /// let config = CiocheckConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.ciocheck.file_mode, FileMode::All);
    /// assert_eq!(config.ciocheck.enforce, vec!["flake8".to_string()]);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, CiocheckError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load `path` if it exists, falling back to defaults.
    ///
    /// A missing file silently yields defaults; an unreadable or malformed
    /// file is logged and also yields defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring invalid configuration");
                Self::default()
            }
        }
    }
}

fn load_table(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Table, CiocheckError> {
    let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    visited.insert(key);

    let content = std::fs::read_to_string(path)?;
    let table: toml::Table = toml::from_str(&content)?;

    let inherit = table
        .get("ciocheck")
        .and_then(|section| section.get("inherit_config"))
        .and_then(toml::Value::as_str)
        .map(str::to_owned);

    let Some(base_name) = inherit else {
        return Ok(table);
    };

    let folder = path.parent().unwrap_or_else(|| Path::new("."));
    let base_path = folder.join(&base_name);
    let base_key = base_path
        .canonicalize()
        .unwrap_or_else(|_| base_path.clone());
    if visited.contains(&base_key) {
        tracing::debug!(path = %base_path.display(), "inherit_config cycle, stopping");
        return Ok(table);
    }

    let mut base = load_table(&base_path, visited)?;
    merge_tables(&mut base, table);
    Ok(base)
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Main run settings (`[ciocheck]` section).
///
/// # Examples
///
/// ```
/// use ciocheck_core::{CheckConfig, DiffMode, FileMode};
///
/// let config = CheckConfig::default();
/// assert_eq!(config.diff_mode, DiffMode::Staged);
/// assert_eq!(config.file_mode, FileMode::ModifiedLines);
/// assert!(config.enforce.is_empty());
/// assert!(config.add_init);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Base configuration file to merge under this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherit_config: Option<String>,
    /// Base branch for committed-mode diffs (default: `origin/master`).
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Diff baseline (default: staged).
    #[serde(default)]
    pub diff_mode: DiffMode,
    /// File selection granularity (default: lines).
    #[serde(default)]
    pub file_mode: FileMode,
    /// Tools to run, by name (default: `["pep8"]`).
    #[serde(default = "default_check")]
    pub check: Vec<String>,
    /// Tools whose findings fail the run.
    #[serde(default)]
    pub enforce: Vec<String>,
    /// Encoding header added by `pyformat`.
    #[serde(default = "default_header")]
    pub header: String,
    /// File in the project root holding the copyright header.
    #[serde(default = "default_copyright_file")]
    pub copyright_file: String,
    /// Add a copyright header where missing.
    #[serde(default = "default_true")]
    pub add_copyright: bool,
    /// Add an encoding header where missing.
    #[serde(default = "default_true")]
    pub add_header: bool,
    /// Create missing `__init__.py` files next to selected files.
    #[serde(default = "default_true")]
    pub add_init: bool,
    /// File extensions never selected by a tree walk.
    #[serde(default = "default_ignore_extensions")]
    pub ignore_extensions: Vec<String>,
    /// Folder names never descended into by a tree walk.
    #[serde(default = "default_ignore_folders")]
    pub ignore_folders: Vec<String>,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.into()
}

fn default_check() -> Vec<String> {
    vec!["pep8".into()]
}

fn default_header() -> String {
    DEFAULT_ENCODING_HEADER.into()
}

fn default_copyright_file() -> String {
    ".ciocopyright".into()
}

fn default_true() -> bool {
    true
}

fn default_ignore_extensions() -> Vec<String> {
    vec!["orig".into(), "pyc".into()]
}

fn default_ignore_folders() -> Vec<String> {
    vec!["build".into(), "__pycache__".into()]
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            inherit_config: None,
            branch: default_branch(),
            diff_mode: DiffMode::default(),
            file_mode: FileMode::default(),
            check: default_check(),
            enforce: Vec::new(),
            header: default_header(),
            copyright_file: default_copyright_file(),
            add_copyright: true,
            add_header: true,
            add_init: true,
            ignore_extensions: default_ignore_extensions(),
            ignore_folders: default_ignore_folders(),
        }
    }
}

/// Formatting worker pool settings (`[pool]` section).
///
/// # Examples
///
/// ```
/// use ciocheck_core::PoolConfig;
///
/// let config = PoolConfig::default();
/// assert_eq!(config.batch_size, 3);
/// assert_eq!(config.in_flight_factor, 3);
/// assert!(config.workers.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Files handed to one worker (default: 3).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// In-flight workers allowed per processor before draining (default: 3).
    #[serde(default = "default_in_flight_factor")]
    pub in_flight_factor: usize,
    /// Processor count override; detected when unset.
    #[serde(default)]
    pub workers: Option<usize>,
}

fn default_batch_size() -> usize {
    3
}

fn default_in_flight_factor() -> usize {
    3
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            in_flight_factor: default_in_flight_factor(),
            workers: None,
        }
    }
}

/// A user-defined linter whose output is parsed with a named-group regex.
///
/// The command receives the selected file paths as trailing arguments.
/// Recognized groups: `path`, `line`, `column`, `type`, `message`, `symbol`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomLinter {
    /// Tool name used in `check` / `enforce`.
    pub name: String,
    /// Program and leading arguments.
    pub command: Vec<String>,
    /// Regex applied to the whole output.
    pub pattern: String,
    /// Extensions (without the dot) the linter applies to; empty means all.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Read diagnostics from stderr instead of stdout.
    #[serde(default)]
    pub output_on_stderr: bool,
}

/// A user-defined formatter that reads a file on stdin and writes the
/// formatted version on stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFormatter {
    /// Tool name used in `check` / `enforce`.
    pub name: String,
    /// Program and arguments.
    pub command: Vec<String>,
    /// Extensions (without the dot) the formatter applies to; empty means all.
    #[serde(default)]
    pub extensions: Vec<String>,
}
