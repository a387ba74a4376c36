use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Which comparison baseline a diff query uses.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
/// The historical spelling `"commited"` is accepted everywhere.
///
/// # Examples
///
/// ```
/// use ciocheck_core::DiffMode;
///
/// let mode: DiffMode = "staged".parse().unwrap();
/// assert_eq!(mode, DiffMode::Staged);
///
/// let mode: DiffMode = "commited".parse().unwrap();
/// assert_eq!(mode, DiffMode::Committed);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    /// Commits on `HEAD` not on the base branch (`<branch>...HEAD`).
    #[serde(alias = "commited")]
    Committed,
    /// Index against `HEAD` (`--cached`).
    #[default]
    Staged,
    /// Working tree against the index.
    Unstaged,
}

impl fmt::Display for DiffMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffMode::Committed => write!(f, "committed"),
            DiffMode::Staged => write!(f, "staged"),
            DiffMode::Unstaged => write!(f, "unstaged"),
        }
    }
}

impl FromStr for DiffMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "committed" | "commited" => Ok(DiffMode::Committed),
            "staged" => Ok(DiffMode::Staged),
            "unstaged" => Ok(DiffMode::Unstaged),
            other => Err(format!("unknown diff mode: {other}")),
        }
    }
}

/// Granularity of file selection.
///
/// # Examples
///
/// ```
/// use ciocheck_core::FileMode;
///
/// assert_eq!("lines".parse::<FileMode>().unwrap(), FileMode::ModifiedLines);
/// assert_eq!("files".parse::<FileMode>().unwrap(), FileMode::ModifiedFiles);
/// assert_eq!("all".parse::<FileMode>().unwrap(), FileMode::All);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileMode {
    /// Every file under the requested paths.
    #[serde(rename = "all")]
    All,
    /// Files touched by the selected diff.
    #[serde(rename = "files")]
    ModifiedFiles,
    /// Files touched by the selected diff, with added/deleted line numbers.
    #[default]
    #[serde(rename = "lines")]
    ModifiedLines,
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileMode::All => write!(f, "all"),
            FileMode::ModifiedFiles => write!(f, "files"),
            FileMode::ModifiedLines => write!(f, "lines"),
        }
    }
}

impl FromStr for FileMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(FileMode::All),
            "files" | "modified-files" => Ok(FileMode::ModifiedFiles),
            "lines" | "modified-lines" => Ok(FileMode::ModifiedLines),
            other => Err(format!("unknown file mode: {other}")),
        }
    }
}

/// Lines touched in one file.
///
/// `WholeFile` is used when no line-level information exists (a folder not
/// under version control); every line of the file is then in scope. In JSON
/// it is written as `{"added": [-1], "deleted": [-1]}`.
///
/// # Examples
///
/// ```
/// use ciocheck_core::LineChanges;
///
/// let changes = LineChanges::Lines { added: vec![5, 6], deleted: vec![] };
/// assert!(changes.is_added(6));
/// assert!(!changes.is_added(7));
/// assert!(LineChanges::WholeFile.is_added(7));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineChanges {
    /// Line information unavailable; treat the whole file as changed.
    WholeFile,
    /// 1-based line numbers, in diff order.
    Lines {
        /// Lines added in the new version.
        added: Vec<u32>,
        /// Lines removed from the old version.
        deleted: Vec<u32>,
    },
}

impl LineChanges {
    /// Returns `true` if `line` counts as added.
    pub fn is_added(&self, line: u32) -> bool {
        match self {
            LineChanges::WholeFile => true,
            LineChanges::Lines { added, .. } => added.contains(&line),
        }
    }

    /// Added line numbers; empty for [`LineChanges::WholeFile`].
    pub fn added(&self) -> &[u32] {
        match self {
            LineChanges::WholeFile => &[],
            LineChanges::Lines { added, .. } => added,
        }
    }

    /// Deleted line numbers; empty for [`LineChanges::WholeFile`].
    pub fn deleted(&self) -> &[u32] {
        match self {
            LineChanges::WholeFile => &[],
            LineChanges::Lines { deleted, .. } => deleted,
        }
    }
}

impl Serialize for LineChanges {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("LineChanges", 2)?;
        match self {
            LineChanges::WholeFile => {
                state.serialize_field("added", &[-1i64])?;
                state.serialize_field("deleted", &[-1i64])?;
            }
            LineChanges::Lines { added, deleted } => {
                state.serialize_field("added", added)?;
                state.serialize_field("deleted", deleted)?;
            }
        }
        state.end()
    }
}

/// Changed-line map: absolute path to the lines touched in it, sorted by path.
pub type LineMap = BTreeMap<PathBuf, LineChanges>;

/// The files selected for one query.
///
/// # Examples
///
/// ```
/// use ciocheck_core::{FileSet, LineChanges, LineMap};
/// use std::path::{Path, PathBuf};
///
/// let mut map = LineMap::new();
/// map.insert(PathBuf::from("/repo/f.py"), LineChanges::Lines { added: vec![5], deleted: vec![] });
/// let set = FileSet::Lines(map);
/// assert_eq!(set.paths(), vec![Path::new("/repo/f.py")]);
/// assert!(set.line_changes(Path::new("/repo/f.py")).is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FileSet {
    /// Plain sorted list of absolute paths.
    Files(Vec<PathBuf>),
    /// Sorted map of absolute path to changed lines.
    Lines(LineMap),
}

impl FileSet {
    /// All paths in the set, in order.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            FileSet::Files(files) => files.iter().map(PathBuf::as_path).collect(),
            FileSet::Lines(map) => map.keys().map(PathBuf::as_path).collect(),
        }
    }

    /// Number of files in the set.
    pub fn len(&self) -> usize {
        match self {
            FileSet::Files(files) => files.len(),
            FileSet::Lines(map) => map.len(),
        }
    }

    /// Returns `true` if no file was selected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Line information for `path`, only available for [`FileSet::Lines`].
    pub fn line_changes(&self, path: &Path) -> Option<&LineChanges> {
        match self {
            FileSet::Files(_) => None,
            FileSet::Lines(map) => map.get(path),
        }
    }
}

/// Broad family a tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Reports problems without touching files.
    Linter,
    /// Rewrites files in place and reports what changed.
    Formatter,
    /// Runs a test suite.
    Tester,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolKind::Linter => write!(f, "linter"),
            ToolKind::Formatter => write!(f, "formatter"),
            ToolKind::Tester => write!(f, "tester"),
        }
    }
}

/// One tool's report about one location.
///
/// Each tool family keeps its own shape; `path` is the shared correlation key.
///
/// # Examples
///
/// ```
/// use ciocheck_core::Finding;
/// use std::path::PathBuf;
///
/// let finding = Finding::Lint {
///     path: PathBuf::from("/repo/f.py"),
///     line: Some(6),
///     column: Some(1),
///     code: Some("E302".into()),
///     message: "expected 2 blank lines, found 1".into(),
///     symbol: None,
///     extra: Default::default(),
/// };
/// assert_eq!(finding.line(), Some(6));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Finding {
    /// A linter diagnostic.
    Lint {
        /// Absolute path of the offending file.
        path: PathBuf,
        /// 1-based line, when the linter reports one.
        line: Option<u32>,
        /// 1-based column, when the linter reports one.
        column: Option<u32>,
        /// Error code such as `E302` or `D400`.
        code: Option<String>,
        /// Human-readable message.
        message: String,
        /// Symbol or scope the message refers to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        symbol: Option<String>,
        /// Remaining tool-specific fields.
        #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
        extra: serde_json::Map<String, serde_json::Value>,
    },
    /// A file rewritten (or created) by a formatter.
    Format {
        /// Absolute path of the changed file.
        path: PathBuf,
        /// Unified diff of the change.
        diff: String,
        /// Whether the file was created.
        #[serde(default)]
        created: bool,
        /// Set when the formatter itself crashed on this path.
        #[serde(default)]
        error: Option<String>,
        /// Whether an encoding header was inserted.
        #[serde(default, rename = "added-header")]
        added_header: bool,
        /// Whether a copyright header was inserted.
        #[serde(default, rename = "added-copyright")]
        added_copyright: bool,
    },
    /// A failing test.
    Test {
        /// Absolute path of the test module.
        path: PathBuf,
        /// Line of the failure, when known.
        line: Option<u32>,
        /// Test node id.
        name: String,
        /// Outcome reported by the runner (`failed`, `error`, ...).
        outcome: String,
        /// Failure representation, when available.
        message: Option<String>,
    },
}

impl Finding {
    /// Path this finding is about.
    pub fn path(&self) -> &Path {
        match self {
            Finding::Lint { path, .. } | Finding::Format { path, .. } | Finding::Test { path, .. } => {
                path
            }
        }
    }

    /// Line this finding is about; `None` for structural events.
    pub fn line(&self) -> Option<u32> {
        match self {
            Finding::Lint { line, .. } | Finding::Test { line, .. } => *line,
            Finding::Format { .. } => None,
        }
    }

    /// Short one-line description used by the text renderer.
    pub fn summary(&self) -> String {
        match self {
            Finding::Lint {
                code, message, ..
            } => match code {
                Some(code) => format!("{code} {message}"),
                None => message.clone(),
            },
            Finding::Format {
                created,
                error,
                added_header,
                added_copyright,
                ..
            } => {
                if let Some(error) = error {
                    error.clone()
                } else if *created {
                    "file created".into()
                } else if *added_header || *added_copyright {
                    "header added".into()
                } else {
                    "file reformatted".into()
                }
            }
            Finding::Test { name, outcome, .. } => format!("{name} {outcome}"),
        }
    }
}

/// Output format for CLI reports.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use ciocheck_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable per-file listing and summary.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "markdown".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn diff_mode_accepts_both_spellings() {
        assert_eq!("committed".parse::<DiffMode>().unwrap(), DiffMode::Committed);
        assert_eq!("Commited".parse::<DiffMode>().unwrap(), DiffMode::Committed);
        assert_eq!("unstaged".parse::<DiffMode>().unwrap(), DiffMode::Unstaged);
        assert!("cached".parse::<DiffMode>().is_err());

        let parsed: DiffMode = serde_json::from_str("\"commited\"").unwrap();
        assert_eq!(parsed, DiffMode::Committed);
    }

    #[test]
    fn file_mode_roundtrips_through_display() {
        for mode in [FileMode::All, FileMode::ModifiedFiles, FileMode::ModifiedLines] {
            assert_eq!(mode.to_string().parse::<FileMode>().unwrap(), mode);
        }
        assert_eq!(FileMode::default(), FileMode::ModifiedLines);
        assert_eq!(DiffMode::default(), DiffMode::Staged);
    }

    #[test]
    fn whole_file_serializes_as_sentinel() {
        let json = serde_json::to_value(LineChanges::WholeFile).unwrap();
        assert_eq!(json, serde_json::json!({"added": [-1], "deleted": [-1]}));

        let json = serde_json::to_value(LineChanges::Lines {
            added: vec![3],
            deleted: vec![1, 2],
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"added": [3], "deleted": [1, 2]}));
    }

    #[test]
    fn whole_file_has_no_explicit_lines() {
        assert!(LineChanges::WholeFile.added().is_empty());
        assert!(LineChanges::WholeFile.deleted().is_empty());
        assert!(LineChanges::WholeFile.is_added(1));
    }

    #[test]
    fn file_set_lists_paths_in_order() {
        let set = FileSet::Files(vec![PathBuf::from("/a.py"), PathBuf::from("/b.py")]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.paths(), vec![Path::new("/a.py"), Path::new("/b.py")]);
        assert!(set.line_changes(Path::new("/a.py")).is_none());
        assert!(FileSet::Lines(LineMap::new()).is_empty());
    }

    #[test]
    fn format_finding_has_no_line() {
        let finding = Finding::Format {
            path: PathBuf::from("/repo/pkg/__init__.py"),
            diff: String::new(),
            created: true,
            error: None,
            added_header: false,
            added_copyright: false,
        };
        assert_eq!(finding.line(), None);
        assert_eq!(finding.summary(), "file created");
    }

    #[test]
    fn finding_serializes_with_kind_tag() {
        let finding = Finding::Test {
            path: PathBuf::from("/repo/tests/test_a.py"),
            line: None,
            name: "tests/test_a.py::test_one".into(),
            outcome: "failed".into(),
            message: None,
        };
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["kind"], "test");

        let back: Finding = serde_json::from_value(json).unwrap();
        assert_eq!(back, finding);
    }

    #[test]
    fn format_finding_reads_worker_keys() {
        let json = serde_json::json!({
            "kind": "format",
            "path": "/repo/a.py",
            "diff": "--- original\n+++ fixed\n",
            "created": false,
            "error": null,
            "added-header": true
        });
        let finding: Finding = serde_json::from_value(json).unwrap();
        match finding {
            Finding::Format {
                added_header,
                added_copyright,
                ..
            } => {
                assert!(added_header);
                assert!(!added_copyright);
            }
            other => panic!("unexpected finding: {other:?}"),
        }
    }
}
