use std::path::PathBuf;

/// Errors that can occur across ciocheck.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate reports it through `miette` at the boundary.
///
/// # Examples
///
/// ```
/// use ciocheck_core::CiocheckError;
///
/// let err = CiocheckError::Parse("Hunk has no source file: '@@ -1 +1 @@'".into());
/// assert!(err.to_string().contains("Hunk has no source file"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum CiocheckError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A `git` invocation failed.
    #[error("git error: {0}")]
    Git(String),

    /// Unified diff text did not match the expected header/hunk grammar.
    #[error("diff parse error: {0}")]
    #[diagnostic(help("the diff output was not understood; line filtering would be unreliable"))]
    Parse(String),

    /// No version-control adapter claimed a requested path.
    #[error("no VCS adapter claims {}", .0.display())]
    Selection(PathBuf),

    /// An external tool could not be run or produced unreadable output.
    #[error("{tool}: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// What went wrong.
        message: String,
    },

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl CiocheckError {
    /// Shorthand for building a [`CiocheckError::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        CiocheckError::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}
