use std::collections::BTreeSet;
use std::fmt;

use ciocheck_core::{Finding, OutputFormat, Result};

use crate::aggregate::Report;
use crate::enforce::failure_banner;

fn location(finding: &Finding) -> String {
    match finding {
        Finding::Lint {
            line: Some(line),
            column: Some(column),
            ..
        } => format!("{line}:{column} "),
        Finding::Lint { line: Some(line), .. } | Finding::Test { line: Some(line), .. } => {
            format!("{line} ")
        }
        _ => String::new(),
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ciocheck Results")?;
        writeln!(f, "================")?;
        writeln!(
            f,
            "Tools: {} | Files: {} | Findings: {}\n",
            self.tools.join(", "),
            self.files.len(),
            self.finding_count(),
        )?;

        if self.files.is_empty() {
            writeln!(f, "No issues found.")?;
        }
        for file in &self.files {
            writeln!(f, "{}", file.path.display())?;
            for result in &file.results {
                for finding in &result.findings {
                    writeln!(f, "  [{}] {}{}", result.tool, location(finding), finding.summary())?;
                }
            }
            writeln!(f)?;
        }

        let counts = self.counts_by_tool();
        if !counts.is_empty() || !self.failed.is_empty() {
            writeln!(f, "Summary")?;
        }
        for (tool, count) in &counts {
            writeln!(f, "  {tool}: {count}")?;
        }
        // Failed through a summary signal only.
        for tool in &self.failed {
            if !counts.iter().any(|(name, _)| *name == tool.as_str()) {
                writeln!(f, "  {tool}: failed")?;
            }
        }

        if !self.coverage.is_empty() {
            writeln!(f, "\nCoverage of added lines")?;
            for (path, stat) in &self.coverage {
                let lines: Vec<String> = stat.uncovered.iter().map(u32::to_string).collect();
                writeln!(
                    f,
                    "  {}: {:.0}% uncovered (lines: {})",
                    path.display(),
                    stat.uncovered_percent,
                    lines.join(", "),
                )?;
            }
        }
        Ok(())
    }
}

impl Report {
    /// Render the report as markdown.
    ///
    /// # Examples
    ///
    /// ```
    /// use ciocheck_report::Report;
    ///
    /// let md = Report::default().to_markdown();
    /// assert!(md.contains("# Ciocheck Results"));
    /// assert!(md.contains("No issues found."));
    /// ```
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Ciocheck Results\n\n");
        out.push_str(&format!(
            "**Tools:** {} | **Files:** {} | **Findings:** {}\n\n",
            self.tools.join(", "),
            self.files.len(),
            self.finding_count(),
        ));

        if self.files.is_empty() {
            out.push_str("No issues found.\n");
        }
        for file in &self.files {
            out.push_str(&format!("## `{}`\n\n", file.path.display()));
            for result in &file.results {
                for finding in &result.findings {
                    out.push_str(&format!(
                        "- **{}** {}{}\n",
                        result.tool,
                        location(finding),
                        finding.summary()
                    ));
                    if let Finding::Format { diff, .. } = finding {
                        if !diff.is_empty() {
                            out.push_str(&format!("\n```diff\n{}```\n", diff));
                        }
                    }
                }
            }
            out.push('\n');
        }

        if !self.coverage.is_empty() {
            out.push_str("## Coverage of added lines\n\n");
            out.push_str("| File | Uncovered | Lines |\n|---|---|---|\n");
            for (path, stat) in &self.coverage {
                let lines: Vec<String> = stat.uncovered.iter().map(u32::to_string).collect();
                out.push_str(&format!(
                    "| `{}` | {:.0}% | {} |\n",
                    path.display(),
                    stat.uncovered_percent,
                    lines.join(", ")
                ));
            }
        }
        out
    }
}

/// Render `report` in `format`. Text and markdown end with the failure
/// banner when enforced tools failed; JSON carries them as
/// `enforcedFailures`.
///
/// # Errors
///
/// Returns [`ciocheck_core::CiocheckError::Serialization`] if JSON encoding
/// fails.
pub fn render(report: &Report, enforced: &BTreeSet<String>, format: OutputFormat) -> Result<String> {
    let banner = failure_banner(enforced);
    Ok(match format {
        OutputFormat::Text => match banner {
            Some(banner) => format!("{report}\n{banner}\n"),
            None => report.to_string(),
        },
        OutputFormat::Markdown => match banner {
            Some(banner) => format!("{}\n**{banner}**\n", report.to_markdown()),
            None => report.to_markdown(),
        },
        OutputFormat::Json => {
            let value = serde_json::json!({
                "report": report,
                "enforcedFailures": enforced,
            });
            format!("{}\n", serde_json::to_string_pretty(&value)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{FileReport, ToolFindings};
    use std::path::PathBuf;

    fn report() -> Report {
        let finding = Finding::Lint {
            path: PathBuf::from("/r/f.py"),
            line: Some(6),
            column: Some(1),
            code: Some("E302".into()),
            message: "expected 2 blank lines, found 1".into(),
            symbol: None,
            extra: Default::default(),
        };
        Report {
            tools: vec!["flake8".into(), "pytest".into()],
            files: vec![FileReport {
                path: PathBuf::from("/r/f.py"),
                results: vec![ToolFindings {
                    tool: "flake8".into(),
                    findings: vec![finding],
                }],
            }],
            failed: ["flake8".to_string(), "pytest".to_string()].into(),
            coverage: Default::default(),
        }
    }

    #[test]
    fn text_lists_findings_and_summary() {
        let text = render(&report(), &BTreeSet::new(), OutputFormat::Text).unwrap();
        assert!(text.contains("/r/f.py"));
        assert!(text.contains("  [flake8] 6:1 E302 expected 2 blank lines, found 1"));
        assert!(text.contains("  flake8: 1"));
        assert!(text.contains("  pytest: failed"));
        assert!(!text.contains("Ciocheck failures in"));
    }

    #[test]
    fn banner_follows_text_report() {
        let enforced: BTreeSet<String> = ["flake8".to_string()].into();
        let text = render(&report(), &enforced, OutputFormat::Text).unwrap();
        assert!(text.trim_end().ends_with("Ciocheck failures in: [flake8]"));
    }

    #[test]
    fn json_uses_camel_case_keys() {
        let enforced: BTreeSet<String> = ["pytest".to_string()].into();
        let json = render(&report(), &enforced, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["enforcedFailures"][0], "pytest");
        assert_eq!(value["report"]["files"][0]["results"][0]["tool"], "flake8");
        assert_eq!(value["report"]["files"][0]["results"][0]["findings"][0]["kind"], "lint");
    }

    #[test]
    fn markdown_has_file_sections() {
        let md = render(&report(), &BTreeSet::new(), OutputFormat::Markdown).unwrap();
        assert!(md.contains("## `/r/f.py`"));
        assert!(md.contains("- **flake8** 6:1 E302"));
    }
}
