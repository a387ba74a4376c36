//! Extension filtering for file selections.
//!
//! Tools declare the file extensions they handle; selections from the
//! VCS layer are narrowed down before a tool ever sees them.

use std::path::{Path, PathBuf};

use ciocheck_core::LineMap;

/// Returns `true` if `path` should be handed to a tool accepting
/// `extensions`.
///
/// An empty extension list accepts everything. Otherwise the path string
/// must end with `.<ext>` for one of the extensions, which also makes
/// compound extensions such as `tar.gz` work.
///
/// # Examples
///
/// ```
/// use ciocheck_difflens::filter::matches_extensions;
/// use std::path::Path;
///
/// let py = vec!["py".to_string()];
/// assert!(matches_extensions(Path::new("/repo/a.py"), &py));
/// assert!(!matches_extensions(Path::new("/repo/b.txt"), &py));
/// assert!(matches_extensions(Path::new("/repo/b.txt"), &[]));
/// ```
pub fn matches_extensions(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let path = path.to_string_lossy();
    extensions
        .iter()
        .any(|ext| path.ends_with(&format!(".{ext}")))
}

/// Keep only the files matching `extensions`, preserving order.
///
/// # Examples
///
/// ```
/// use ciocheck_difflens::filter::filter_files;
/// use std::path::PathBuf;
///
/// let files = vec![PathBuf::from("a.py"), PathBuf::from("b.txt")];
/// assert_eq!(filter_files(files, &["py".into()]), vec![PathBuf::from("a.py")]);
/// ```
pub fn filter_files(files: Vec<PathBuf>, extensions: &[String]) -> Vec<PathBuf> {
    files
        .into_iter()
        .filter(|path| matches_extensions(path, extensions))
        .collect()
}

/// Keep only the entries of a line map whose path matches `extensions`.
pub fn filter_lines(lines: LineMap, extensions: &[String]) -> LineMap {
    lines
        .into_iter()
        .filter(|(path, _)| matches_extensions(path, extensions))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciocheck_core::LineChanges;

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_extensions_accept_everything() {
        assert!(matches_extensions(Path::new("Makefile"), &[]));
    }

    #[test]
    fn suffix_must_include_the_dot() {
        let py = exts(&["py"]);
        assert!(!matches_extensions(Path::new("/repo/happy"), &py));
        assert!(!matches_extensions(Path::new("/repo/a.pyc"), &py));
        assert!(matches_extensions(Path::new("/repo/a.py"), &py));
    }

    #[test]
    fn compound_extension() {
        let gz = exts(&["tar.gz"]);
        assert!(matches_extensions(Path::new("dist/pkg.tar.gz"), &gz));
        assert!(!matches_extensions(Path::new("dist/pkg.gz"), &gz));
    }

    #[test]
    fn filter_lines_keeps_sorted_matching_keys() {
        let mut map = LineMap::new();
        map.insert(PathBuf::from("/r/b.py"), LineChanges::WholeFile);
        map.insert(PathBuf::from("/r/a.txt"), LineChanges::WholeFile);
        map.insert(PathBuf::from("/r/a.py"), LineChanges::WholeFile);

        let kept = filter_lines(map, &exts(&["py"]));
        let keys: Vec<_> = kept.keys().cloned().collect();
        assert_eq!(keys, vec![PathBuf::from("/r/a.py"), PathBuf::from("/r/b.py")]);
    }
}
