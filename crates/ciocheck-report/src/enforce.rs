//! Pass/fail gate over the enforced tools.

use std::collections::BTreeSet;

use crate::aggregate::EnforcementState;

/// Tools that are both enforced and failed.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeSet;
/// use ciocheck_report::enforce::{enforced_failures, exit_code};
///
/// let failed: BTreeSet<String> = ["flake8".to_string(), "pep8".to_string()].into();
/// let enforced = enforced_failures(&["flake8".to_string()], &failed);
/// assert_eq!(enforced.len(), 1);
/// assert_eq!(exit_code(&enforced), 1);
///
/// assert_eq!(exit_code(&enforced_failures(&[], &failed)), 0);
/// ```
pub fn enforced_failures(enforce: &[String], failed: &EnforcementState) -> BTreeSet<String> {
    enforce
        .iter()
        .filter(|tool| failed.contains(tool.as_str()))
        .cloned()
        .collect()
}

/// Process exit code for a set of enforced failures.
pub fn exit_code(enforced: &BTreeSet<String>) -> i32 {
    i32::from(!enforced.is_empty())
}

/// Line printed when enforced tools failed; `None` when none did.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeSet;
/// use ciocheck_report::enforce::failure_banner;
///
/// let enforced: BTreeSet<String> = ["pytest".to_string(), "flake8".to_string()].into();
/// assert_eq!(
///     failure_banner(&enforced).as_deref(),
///     Some("Ciocheck failures in: [flake8, pytest]")
/// );
/// assert!(failure_banner(&BTreeSet::new()).is_none());
/// ```
pub fn failure_banner(enforced: &BTreeSet<String>) -> Option<String> {
    if enforced.is_empty() {
        return None;
    }
    let names: Vec<&str> = enforced.iter().map(String::as_str).collect();
    Some(format!("Ciocheck failures in: [{}]", names.join(", ")))
}
