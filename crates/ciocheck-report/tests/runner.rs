#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use ciocheck_core::{CiocheckConfig, FileMode, Finding};
use ciocheck_report::Runner;

const TODO_LINTER: &str = r#"
[ciocheck]
check = ["todo"]

[[linters]]
name = "todo"
command = ["grep", "-Hn", "TODO"]
pattern = '(?m)^(?P<path>[^:\n]+):(?P<line>\d+):(?P<message>.*)$'
extensions = ["py"]
"#;

fn project() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    (dir, root)
}

fn config(file_mode: FileMode, enforce: &[&str]) -> CiocheckConfig {
    let mut config = CiocheckConfig::from_toml(TODO_LINTER).unwrap();
    config.ciocheck.file_mode = file_mode;
    config.ciocheck.enforce = enforce.iter().map(|s| s.to_string()).collect();
    config
}

fn git(root: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn enforced_linter_failure_exits_one() {
    let (_dir, root) = project();
    fs::write(root.join("a.py"), "x = 1  # TODO\n").unwrap();
    fs::write(root.join("b.txt"), "TODO\n").unwrap();

    let mut runner = Runner::new(&root, &[root.clone()], config(FileMode::All, &["todo"])).unwrap();
    let outcome = runner.run().await.unwrap();

    assert_eq!(outcome.exit_code(), 1);
    assert!(outcome.enforced_failures.contains("todo"));
    let paths: Vec<_> = outcome.report.files.iter().map(|f| f.path.clone()).collect();
    assert_eq!(paths, vec![root.join("a.py")]);
}

#[tokio::test]
async fn unenforced_failure_exits_zero() {
    let (_dir, root) = project();
    fs::write(root.join("a.py"), "# TODO\n").unwrap();

    let mut runner = Runner::new(&root, &[root.clone()], config(FileMode::All, &[])).unwrap();
    let outcome = runner.run().await.unwrap();

    assert!(outcome.report.failed.contains("todo"));
    assert!(outcome.enforced_failures.is_empty());
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn staged_line_mode_reports_only_added_lines() {
    let (_dir, root) = project();
    if !git(&root, &["init", "-q"]) {
        eprintln!("git not available, skipping");
        return;
    }
    git(&root, &["config", "user.email", "dev@example.com"]);
    git(&root, &["config", "user.name", "Dev"]);

    fs::write(root.join("f.py"), "a = 1  # TODO old\nb = 2\n").unwrap();
    assert!(git(&root, &["add", "f.py"]));
    assert!(git(&root, &["commit", "-q", "-m", "init"]));

    fs::write(root.join("f.py"), "a = 1  # TODO old\nb = 2\nc = 3  # TODO new\n").unwrap();
    assert!(git(&root, &["add", "f.py"]));

    let mut runner =
        Runner::new(&root, &[root.clone()], config(FileMode::ModifiedLines, &["todo"])).unwrap();
    let outcome = runner.run().await.unwrap();

    assert_eq!(outcome.report.files.len(), 1);
    let findings = &outcome.report.files[0].results[0].findings;
    assert_eq!(findings.len(), 1);
    match &findings[0] {
        Finding::Lint { line, message, .. } => {
            assert_eq!(*line, Some(3));
            assert!(message.contains("TODO new"));
        }
        other => panic!("unexpected finding {other:?}"),
    }
    assert_eq!(outcome.exit_code(), 1);
}
