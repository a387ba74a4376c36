//! Result aggregation, enforcement and rendering, plus the [`Runner`] that
//! drives a whole check from file selection to exit code.

pub mod aggregate;
pub mod enforce;
pub mod pipeline;
pub mod render;

pub use aggregate::{aggregate, CoverageStat, FileReport, Report, ToolFindings, ToolRun};
pub use enforce::enforced_failures;
pub use pipeline::{RunOutcome, Runner};
