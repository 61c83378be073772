// Rollbook CLI - student-registry reconciliation from the shell

mod apply;
mod exit_codes;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::{EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "rollbook")]
#[command(about = "Reconcile a local student ledger against an external registry")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a reconciliation from a TOML config file
    #[command(after_help = "\
Examples:
  rollbook run rollbook.toml
  rollbook run rollbook.toml --json
  rollbook run rollbook.toml --output report.json --mapping-csv worklist.csv")]
    Run {
        /// Path to the rollbook TOML config file
        config: PathBuf,

        /// Print the report JSON to stdout instead of only the summary
        #[arg(long)]
        json: bool,

        /// Write the report JSON to a file (overrides [output] in the config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the local-to-registry mapping table as CSV
        #[arg(long)]
        mapping_csv: Option<PathBuf>,
    },

    /// Validate a config without running
    #[command(after_help = "\
Examples:
  rollbook validate rollbook.toml")]
    Validate {
        /// Path to the rollbook TOML config file
        config: PathBuf,
    },

    /// Apply a report's dedup plan to the live store
    #[command(after_help = "\
Examples:
  rollbook apply rollbook.toml --report report.json --dry-run
  rollbook apply rollbook.toml --report report.json")]
    Apply {
        /// Path to the rollbook TOML config file (must carry a [store] section)
        config: PathBuf,

        /// Report JSON produced by `rollbook run`
        #[arg(long)]
        report: PathBuf,

        /// Walk the plan and print what would change, without touching the store
        #[arg(long)]
        dry_run: bool,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  rollbook-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  rollbook-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version land here too; only genuine usage
            // errors print to stderr and exit 2.
            let code = if err.use_stderr() { EXIT_USAGE } else { EXIT_SUCCESS };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    let result = match cli.command {
        Commands::Run { config, json, output, mapping_csv } => {
            run::cmd_run(config, json, output, mapping_csv)
        }
        Commands::Validate { config } => run::cmd_validate(config),
        Commands::Apply { config, report, dry_run } => {
            apply::cmd_apply(config, report, dry_run)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

// ============================================================================
// CliError
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self { code: exit_codes::EXIT_INVALID_CONFIG, message: msg.into(), hint: None }
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self { code: exit_codes::EXIT_RUNTIME, message: msg.into(), hint: None }
    }

    /// Engine errors carry their own config-vs-runtime split.
    pub fn recon(err: rollbook_recon::ReconError) -> Self {
        Self {
            code: exit_codes::recon_exit_code(&err),
            message: err.to_string(),
            hint: None,
        }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
