//! Core types, configuration, and error handling for ciocheck.
//!
//! This crate provides the shared foundation used by all other ciocheck crates:
//! - [`CiocheckError`]: unified error type using `thiserror`
//! - [`CiocheckConfig`]: configuration loaded from `.ciocheck.toml`
//! - Shared types: [`FileSet`], [`LineChanges`], [`Finding`], [`DiffMode`],
//!   [`FileMode`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    CheckConfig, CiocheckConfig, CustomFormatter, CustomLinter, PoolConfig, CONFIG_FILE_NAME,
    DEFAULT_BRANCH, DEFAULT_COPYRIGHT_HEADER, DEFAULT_ENCODING_HEADER,
};
pub use error::CiocheckError;
pub use types::{
    DiffMode, FileMode, FileSet, Finding, LineChanges, LineMap, OutputFormat, ToolKind,
};

/// A convenience `Result` type for ciocheck operations.
pub type Result<T> = std::result::Result<T, CiocheckError>;
