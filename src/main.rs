use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use ciocheck_core::{CiocheckConfig, DiffMode, FileMode, OutputFormat, CONFIG_FILE_NAME};
use ciocheck_report::enforce::failure_banner;
use ciocheck_report::render::render;
use ciocheck_report::Runner;
use ciocheck_tools::multiformat::{run_format_task, WorkerMode};

#[derive(Parser)]
#[command(
    name = "ciocheck",
    version,
    about = "Diff-aware lint, format and test orchestration",
    long_about = "Runs linters, formatters and tests over the files (or lines) changed in\n\
                   version control, merges their output into one report and fails only\n\
                   when an enforced tool reports a problem.\n\n\
                   Examples:\n  \
                     ciocheck check .                       Check staged lines under .\n  \
                     ciocheck check src --file-mode all     Check every file under src\n  \
                     ciocheck check . --diff-mode committed --branch origin/main\n  \
                     ciocheck check . --check flake8,pytest --enforce flake8\n  \
                     ciocheck init                          Write a default .ciocheck.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .ciocheck.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for the report.\n\n\
                       Formats:\n  \
                         text      Per-file listing and summary (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Run the configured tools over changed files
    #[command(long_about = "Run the configured tools over changed files.\n\n\
        Files are selected from the version-control state of each path (git),\n\
        or by walking the tree when a path is not under version control.\n\
        Flags override the matching keys of the configuration file.")]
    Check {
        /// Files or folders to check
        paths: Vec<PathBuf>,

        /// Base branch for committed-mode diffs
        #[arg(long)]
        branch: Option<String>,

        /// Diff baseline: committed, staged or unstaged
        #[arg(long)]
        diff_mode: Option<DiffMode>,

        /// Selection granularity: lines, files or all
        #[arg(long)]
        file_mode: Option<FileMode>,

        /// Tools to run (comma-separated)
        #[arg(long, value_delimiter = ',')]
        check: Option<Vec<String>>,

        /// Tools whose findings fail the run (comma-separated)
        #[arg(long, value_delimiter = ',')]
        enforce: Option<Vec<String>>,
    },
    /// Create a default .ciocheck.toml configuration file
    #[command(long_about = "Create a default .ciocheck.toml configuration file.\n\n\
        Generates a commented template with all available options.\n\
        Fails if .ciocheck.toml already exists.")]
    Init,
    /// Format files for a parent ciocheck process
    #[command(name = "format-task", hide = true)]
    FormatTask {
        /// Files to format
        files: Vec<PathBuf>,
    },
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

const DEFAULT_CONFIG: &str = r##"# ciocheck configuration

[ciocheck]
# inherit_config = "../base.ciocheck.toml"
# branch = "origin/master"
# diff_mode = "staged"        # committed | staged | unstaged
# file_mode = "lines"         # lines | files | all
check = ["pep8"]
enforce = []
# header = "# -*- coding: utf-8 -*-\n"
# copyright_file = ".ciocopyright"
# add_copyright = true
# add_header = true
# add_init = true
# ignore_extensions = ["orig", "pyc"]
# ignore_folders = ["build", "__pycache__"]

[pool]
# batch_size = 3
# in_flight_factor = 3

# Custom regex linter
# [[linters]]
# name = "todo"
# command = ["grep", "-n", "-H", "TODO"]
# pattern = '(?P<path>[^:]+):(?P<line>\d+):(?P<message>.*)'
# extensions = ["py"]

# Custom stdin-to-stdout formatter
# [[formatters]]
# name = "black"
# command = ["black", "-q", "-"]
# extensions = ["py"]
"##;

fn init_tracing(verbose: bool, ansi: bool) {
    let default = if verbose { "warn,ciocheck=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .init();
}

fn load_config(explicit: Option<&Path>, root: &Path) -> Result<CiocheckConfig> {
    match explicit {
        Some(path) => CiocheckConfig::from_file(path)
            .wrap_err_with(|| format!("failed to load {}", path.display())),
        None => Ok(CiocheckConfig::load_or_default(&root.join(CONFIG_FILE_NAME))),
    }
}

fn spinner(enabled: bool) -> Option<indicatif::ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_style(
        indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner()),
    );
    pb.set_message("Running checks...");
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    human_panic::setup_panic!();
    let cli = Cli::parse();

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stderr().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };
    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .color(use_color)
                .build(),
        )
    }))
    .into_diagnostic()?;
    init_tracing(cli.verbose, use_color);

    let root = std::env::current_dir()
        .into_diagnostic()
        .wrap_err("cannot determine the working directory")?;

    match cli.command {
        Command::Check {
            paths,
            branch,
            diff_mode,
            file_mode,
            check,
            enforce,
        } => {
            if paths.is_empty() {
                miette::bail!("no file or folder to check was given");
            }

            let mut config = load_config(cli.config.as_deref(), &root)?;
            let settings = &mut config.ciocheck;
            if let Some(branch) = branch {
                settings.branch = branch;
            }
            if let Some(mode) = diff_mode {
                settings.diff_mode = mode;
            }
            if let Some(mode) = file_mode {
                settings.file_mode = mode;
            }
            if let Some(check) = check {
                settings.check = check;
            }
            if let Some(enforce) = enforce {
                settings.enforce = enforce;
            }
            tracing::debug!(?config, "resolved configuration");

            let mode = match std::env::current_exe() {
                Ok(program) => WorkerMode::Subprocess {
                    program,
                    config: cli.config.as_ref().map(|path| root.join(path)),
                },
                Err(e) => {
                    tracing::warn!(error = %e, "formatting in process");
                    WorkerMode::InProcess
                }
            };

            let mut runner = Runner::new(&root, &paths, config)?.worker_mode(mode);
            let pb = spinner(std::io::stderr().is_terminal() && cli.format == OutputFormat::Text);
            let outcome = runner.run().await;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            let outcome = outcome?;

            print!("{}", render(&outcome.report, &outcome.enforced_failures, cli.format)?);
            if cli.format == OutputFormat::Json {
                if let Some(banner) = failure_banner(&outcome.enforced_failures) {
                    eprintln!("{banner}");
                }
            }
            std::io::stdout().flush().into_diagnostic()?;
            if outcome.exit_code() != 0 {
                std::process::exit(outcome.exit_code());
            }
        }
        Command::Init => {
            let path = root.join(CONFIG_FILE_NAME);
            if path.exists() {
                miette::bail!("{CONFIG_FILE_NAME} already exists");
            }
            std::fs::write(&path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE_NAME} with default configuration");
        }
        Command::FormatTask { files } => {
            let output = run_format_task(&files)?;
            println!("{output}");
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "ciocheck", &mut std::io::stdout());
        }
    }

    Ok(())
}
