//! External tool runners: linters, formatters and the test runner.
//!
//! Every tool implements [`Tool`]. The [`registry`] turns the configured
//! `check` list into concrete tools, and [`multiformat`] fans formatter work
//! out over a bounded [`pool`] of workers.

pub mod formatters;
pub mod linters;
pub mod multiformat;
pub mod pool;
pub mod process;
pub mod pytest;
pub mod registry;
pub mod tool;

pub use tool::{CoverageMap, Tool, ToolContext, ToolOutput};
