//! Version-control adapters and changed-file selection.
//!
//! Detects which repository each requested path lives in, asks it for the
//! files (or lines) changed against a baseline, and caches the answers for
//! the duration of one run.

pub mod adapter;
pub mod aggregator;
pub mod files;
pub mod git;
pub mod hg;
pub mod novcs;
pub mod walker;

pub use adapter::VcsAdapter;
pub use aggregator::DiffAggregator;
pub use files::FileManager;
pub use walker::WalkOptions;
