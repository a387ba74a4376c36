//! Name to tool lookup.
//!
//! The registry is an ordered table of constructors. Built-in tools come
//! first; `[[linters]]` and `[[formatters]]` tables from the configuration
//! are appended, replacing a built-in that has the same name.

use std::fmt;
use std::sync::Arc;

use ciocheck_core::{CiocheckConfig, Result, ToolKind};

use crate::formatters::{ExternalFormatter, PythonFormatter};
use crate::linters::{JsonLinter, RegexLinter};
use crate::pytest::PytestTool;
use crate::tool::Tool;

/// A constructed tool, tagged by the phase of a run it belongs to.
#[derive(Clone)]
pub enum RegisteredTool {
    /// The header and package marker formatter; runs before anything else.
    PyFormat(Arc<PythonFormatter>),
    /// A stdin-to-stdout formatter; runs in the parallel formatting phase.
    Formatter(Arc<ExternalFormatter>),
    /// A linter; runs after formatting.
    Linter(Arc<dyn Tool>),
    /// The test runner; runs last.
    Tester(Arc<PytestTool>),
}

impl RegisteredTool {
    pub fn name(&self) -> &str {
        self.as_tool().name()
    }

    pub fn kind(&self) -> ToolKind {
        self.as_tool().kind()
    }

    /// The tool behind the tag.
    pub fn as_tool(&self) -> &dyn Tool {
        match self {
            RegisteredTool::PyFormat(tool) => tool.as_ref(),
            RegisteredTool::Formatter(tool) => tool.as_ref(),
            RegisteredTool::Linter(tool) => tool.as_ref(),
            RegisteredTool::Tester(tool) => tool.as_ref(),
        }
    }
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

type Constructor = Box<dyn Fn() -> Result<RegisteredTool> + Send + Sync>;

/// Outcome of [`Registry::resolve`].
#[derive(Debug, Default)]
pub struct Resolved {
    /// Tools ready to run, in the order requested.
    pub tools: Vec<RegisteredTool>,
    /// Known tools that failed to construct. A run counts them as failed.
    pub broken: Vec<String>,
}

/// Ordered table of tool constructors.
///
/// # Examples
///
/// ```
/// use ciocheck_tools::registry::Registry;
///
/// let registry = Registry::builtin();
/// let tools = registry.resolve(&["flake8".to_string(), "nope".to_string()]).tools;
/// assert_eq!(tools.len(), 1);
/// assert_eq!(tools[0].name(), "flake8");
/// ```
pub struct Registry {
    entries: Vec<(String, Constructor)>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("names", &self.names()).finish()
    }
}

impl Registry {
    /// The tools ciocheck knows without configuration.
    pub fn builtin() -> Self {
        let mut registry = Self {
            entries: Vec::new(),
        };
        registry.register("pyformat", || {
            Ok(RegisteredTool::PyFormat(Arc::new(PythonFormatter::new())))
        });
        registry.register("isort", || {
            Ok(RegisteredTool::Formatter(Arc::new(ExternalFormatter::isort())))
        });
        registry.register("yapf", || {
            Ok(RegisteredTool::Formatter(Arc::new(ExternalFormatter::yapf())))
        });
        registry.register("autopep8", || {
            Ok(RegisteredTool::Formatter(Arc::new(ExternalFormatter::autopep8())))
        });
        registry.register("pep8", || Ok(RegisteredTool::Linter(Arc::new(RegexLinter::pep8()))));
        registry.register("pydocstyle", || {
            Ok(RegisteredTool::Linter(Arc::new(RegexLinter::pydocstyle())))
        });
        registry.register("flake8", || {
            Ok(RegisteredTool::Linter(Arc::new(RegexLinter::flake8())))
        });
        registry.register("pylint", || Ok(RegisteredTool::Linter(Arc::new(JsonLinter::pylint()))));
        registry.register("pytest", || Ok(RegisteredTool::Tester(Arc::new(PytestTool::new()))));
        registry
    }

    /// Built-in tools plus the custom linters and formatters in `config`.
    pub fn from_config(config: &CiocheckConfig) -> Self {
        let mut registry = Self::builtin();
        for linter in &config.linters {
            let linter = linter.clone();
            registry.register(&linter.name.clone(), move || {
                let tool = RegexLinter::from_config(&linter)?;
                Ok(RegisteredTool::Linter(Arc::new(tool)))
            });
        }
        for formatter in &config.formatters {
            let formatter = formatter.clone();
            registry.register(&formatter.name.clone(), move || {
                Ok(RegisteredTool::Formatter(Arc::new(ExternalFormatter::new(
                    formatter.name.clone(),
                    formatter.command.clone(),
                    formatter.extensions.clone(),
                ))))
            });
        }
        registry
    }

    /// Add a constructor under `name`, replacing any entry already there
    /// while keeping its position.
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn() -> Result<RegisteredTool> + Send + Sync + 'static,
    {
        let constructor: Constructor = Box::new(constructor);
        match self.entries.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => {
                tracing::debug!(tool = name, "overriding registered tool");
                entry.1 = constructor;
            }
            None => self.entries.push((name.to_string(), constructor)),
        }
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Construct the tools named in `names`, in the order given.
    ///
    /// Duplicates are dropped and unknown names are logged and skipped.
    /// Tools that fail to construct are logged and listed in
    /// [`Resolved::broken`].
    pub fn resolve(&self, names: &[String]) -> Resolved {
        let mut seen: Vec<&str> = Vec::new();
        let mut resolved = Resolved::default();
        for name in names {
            if seen.contains(&name.as_str()) {
                continue;
            }
            seen.push(name);

            let Some((_, constructor)) = self.entries.iter().find(|(existing, _)| existing == name)
            else {
                tracing::warn!(tool = %name, known = ?self.names(), "unknown tool, skipping");
                continue;
            };
            match constructor() {
                Ok(tool) => resolved.tools.push(tool),
                Err(e) => {
                    tracing::error!(tool = %name, error = %e, "cannot set up tool, counting it as failed");
                    resolved.broken.push(name.clone());
                }
            }
        }
        resolved
    }

    /// The stdin-to-stdout formatters among `names`, in the order given.
    pub fn multi_formatters(&self, names: &[String]) -> Vec<Arc<ExternalFormatter>> {
        self.resolve(names)
            .tools
            .into_iter()
            .filter_map(|tool| match tool {
                RegisteredTool::Formatter(formatter) => Some(formatter),
                _ => None,
            })
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
