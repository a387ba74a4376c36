//! Unified diff parsing and path filtering.
//!
//! Turns `git diff` output into per-file added/deleted line numbers and
//! narrows file selections down to the extensions a tool cares about.

pub mod filter;
pub mod parser;
