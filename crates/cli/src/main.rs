// floorbook CLI - classify shop orders and sync class attendance

mod exit_codes;
mod feed;
mod inspect;
mod sources;
mod sync;
mod token;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_ERROR, EXIT_SUCCESS, EXIT_SYNC_INVALID_CONFIG, EXIT_USAGE};
use sources::SourceArgs;

#[derive(Parser)]
#[command(name = "fbook")]
#[command(about = "Dance-school order classification and attendance sync")]
#[command(long_version = long_version())]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug). FLOORBOOK_LOG overrides.
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull orders, rebuild the order snapshots, and append new attendance rows
    #[command(after_help = "\
Examples:
  fbook sync --orders orders.json --customers customers.json
  fbook sync --feed-url https://shop.example.com/admin/api -c term2.sync.toml
  fbook sync --orders orders.json --db school.db --today 2025-06-05 --json
  FLOORBOOK_FEED_TOKEN=shpat_... fbook sync --feed-url https://shop.example.com/admin/api")]
    Sync {
        #[command(flatten)]
        source: SourceArgs,

        /// Customer export file for display names (default: the feed, if used)
        #[arg(long)]
        customers: Option<PathBuf>,

        /// Attendance database (default: settings.toml, else the platform data dir)
        #[arg(long, env = "FLOORBOOK_DB")]
        db: Option<PathBuf>,

        /// Lock holder / run identifier (default: random UUID)
        #[arg(long)]
        run_id: Option<String>,

        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Also write the JSON report to a file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Show how a product title and variant are classified
    #[command(after_help = "\
Examples:
  fbook classify 'Unlimited Bundle' 'Term 2B / Leader'
  fbook classify 'Free Class - New York Salsa' '27th May / Follower' --json
  fbook classify 'Beginner Salsa' -c term2.sync.toml")]
    Classify {
        /// Product title
        title: String,

        /// Variant title
        variant: Option<String>,

        /// Sync config with extra classification rules
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Project orders into enrollment and free-class records without writing anything
    #[command(after_help = "\
Examples:
  fbook project --orders orders.json
  fbook project --orders orders.json --today 2025-06-05 --csv > enrollments.csv
  fbook project --feed-url https://shop.example.com/admin/api --json")]
    Project {
        #[command(flatten)]
        source: SourceArgs,

        /// Output CSV (one row per record)
        #[arg(long, conflicts_with = "json")]
        csv: bool,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Discount-adjusted revenue per class over paid orders
    #[command(after_help = "\
Examples:
  fbook revenue --orders orders.json
  fbook revenue --orders orders.json --window-start 2025-01-01 --json")]
    Revenue {
        #[command(flatten)]
        source: SourceArgs,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the feed access token
    #[command(after_help = "\
Examples:
  fbook token status
  fbook token set < token.txt
  fbook token clear")]
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Parse and validate a sync config without running
    #[command(after_help = "\
Examples:
  fbook validate term2.sync.toml")]
    Validate {
        /// Path to the .sync.toml config file
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Show where the feed token would be read from
    Status {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Store the feed token in the system keychain (reads stdin when omitted)
    Set {
        token: Option<String>,
    },

    /// Remove the feed token from the system keychain
    Clear,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("FBOOK_GIT_HASH"), ")",
        "\ntarget:  ", env!("FBOOK_TARGET"),
    )
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("FLOORBOOK_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        None => {
            // No subcommand = show help
            eprintln!("Usage: fbook <command> [options]");
            eprintln!("       fbook --help for more information");
            Ok(())
        }
        Some(Commands::Sync {
            source,
            customers,
            db,
            run_id,
            json,
            output,
        }) => sync::cmd_sync(sync::SyncOptions {
            source,
            customers,
            db,
            run_id,
            json,
            output,
        }),
        Some(Commands::Classify {
            title,
            variant,
            config,
            json,
        }) => inspect::cmd_classify(title, variant, config, json),
        Some(Commands::Project { source, csv, json }) => inspect::cmd_project(source, csv, json),
        Some(Commands::Revenue { source, json }) => inspect::cmd_revenue(source, json),
        Some(Commands::Token { command }) => match command {
            TokenCommands::Status { json } => token::cmd_token_status(json),
            TokenCommands::Set { token } => token::cmd_token_set(token),
            TokenCommands::Clear => token::cmd_token_clear(),
        },
        Some(Commands::Validate { config }) => sync::cmd_validate(config),
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

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_SYNC_INVALID_CONFIG, message: msg.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
