use std::path::PathBuf;
use std::sync::LazyLock;

use ciocheck_core::{CiocheckError, LineChanges, LineMap};
use regex::Regex;

static GIT_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^diff --git "?a/.*"? "?b/([^ \n"]*)"?"#).expect("valid git header regex")
});

static CC_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^diff --cc ([^ \n]*)").expect("valid combined header regex"));

static NEW_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+(\d+)").expect("valid hunk start regex"));

/// Running position inside one hunk.
///
/// Both counters start at the new-file start line of the hunk header, so
/// deleted lines are reported in new-file coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffHunk {
    /// Line number the next `+` line will get.
    pub new_line: u32,
    /// Line number the next `-` line will get.
    pub old_line: u32,
}

impl DiffHunk {
    fn starting_at(start: u32) -> Self {
        Self {
            new_line: start,
            old_line: start,
        }
    }
}

#[derive(Debug)]
struct Section {
    path: PathBuf,
    added: Vec<u32>,
    deleted: Vec<u32>,
    hunk: Option<DiffHunk>,
}

impl Section {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            added: Vec::new(),
            deleted: Vec::new(),
            hunk: None,
        }
    }

    fn finish(self, changes: &mut LineMap) {
        changes.insert(
            self.path,
            LineChanges::Lines {
                added: self.added,
                deleted: self.deleted,
            },
        );
    }
}

/// Parse `git diff` output into the added and deleted line numbers of every
/// file it touches.
///
/// Keys are the paths exactly as they appear in the `diff --git` (or
/// `diff --cc`) header, relative to the repository root. When the same path
/// shows up in several sections, the last one wins.
///
/// # Errors
///
/// Returns [`CiocheckError::Parse`] when a section header has no
/// extractable path, when a hunk appears before any section header, or when
/// a hunk header does not contain exactly one `+<start>` group.
///
/// # Examples
///
/// ```
/// use ciocheck_difflens::parser::parse_line_changes;
/// use std::path::Path;
///
/// let diff = "diff --git a/src/app.py b/src/app.py\n\
///             index 1111111..2222222 100644\n\
///             --- a/src/app.py\n\
///             +++ b/src/app.py\n\
///             @@ -10,3 +20,3 @@ def main():\n\
///             +foo\n\
///             +bar\n \
///             baz\n";
/// let changes = parse_line_changes(diff).unwrap();
/// let app = &changes[Path::new("src/app.py")];
/// assert_eq!(app.added(), &[20, 21]);
/// assert!(app.deleted().is_empty());
/// ```
pub fn parse_line_changes(diff: &str) -> Result<LineMap, CiocheckError> {
    let mut changes = LineMap::new();
    let mut section: Option<Section> = None;

    for line in diff.lines() {
        if line.starts_with("diff --git ") || line.starts_with("diff --cc ") {
            if let Some(done) = section.take() {
                done.finish(&mut changes);
            }
            section = Some(Section::new(header_path(line)?));
            continue;
        }

        if line.starts_with("@@") {
            let Some(current) = section.as_mut() else {
                return Err(CiocheckError::Parse(format!(
                    "Hunk has no source file: '{line}'"
                )));
            };
            current.hunk = Some(DiffHunk::starting_at(hunk_start(line)?));
            continue;
        }

        // Index, mode and ---/+++ lines sit between a header and its first hunk.
        let Some(current) = section.as_mut() else {
            continue;
        };
        let Some(hunk) = current.hunk.as_mut() else {
            continue;
        };

        if line.starts_with('\\') {
            continue;
        }

        if line.starts_with('+') {
            current.added.push(hunk.new_line);
            hunk.new_line += 1;
        } else if line.starts_with('-') {
            current.deleted.push(hunk.old_line);
            hunk.old_line += 1;
        } else {
            hunk.new_line += 1;
            hunk.old_line += 1;
        }
    }

    if let Some(done) = section.take() {
        done.finish(&mut changes);
    }

    tracing::debug!(files = changes.len(), "parsed diff");
    Ok(changes)
}

fn header_path(line: &str) -> Result<PathBuf, CiocheckError> {
    GIT_HEADER
        .captures(line)
        .or_else(|| CC_HEADER.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| CiocheckError::Parse(format!("Unable to find filename in: '{line}'")))
}

fn hunk_start(line: &str) -> Result<u32, CiocheckError> {
    let ranges = line.split("@@").nth(1).unwrap_or_default();
    let starts: Vec<&str> = NEW_START
        .captures_iter(ranges)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect();

    match starts.as_slice() {
        [start] => start
            .parse()
            .map_err(|_| CiocheckError::Parse(format!("Hunk start out of range: '{line}'"))),
        _ => Err(CiocheckError::Parse(format!(
            "Expected exactly one new-file range in hunk: '{line}'"
        ))),
    }
}
