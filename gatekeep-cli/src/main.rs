//! Gatekeep: applies website access grants from the ledger to the site
//! configuration database.
//!
//! # Usage
//!
//! ```text
//! gatekeep [--config FILE] [-v|-q] [--dry-run] [--force-update-tree] [--no-push] <command>
//! gatekeep sync [--all] [--no-email] [--recipient-override-email ADDR] [--branch NAME]
//! gatekeep reset admins [--all]
//! gatekeep reset expiry YYYY-MM-DD
//! gatekeep site list
//! gatekeep site show <name|id>
//! gatekeep email test <address>
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use gatekeep_core::Config;
use gatekeep_store::CommitFlags;

use commands::{email::EmailCommand, reset::ResetCommand, site::SiteCommand, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "gatekeep",
    version,
    about = "Sync website access grants into the site configuration database",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags accepted by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Config file [default: ~/.gatekeep.yaml]
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log warnings and errors only. Ignored with --verbose.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Don't commit or push changes. Implies no ledger updates and no email.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// With --dry-run, still write changed sites to the working tree.
    #[arg(long, global = true)]
    pub force_update_tree: bool,

    /// Commit changes locally but don't push them.
    #[arg(long, global = true)]
    pub no_push: bool,
}

impl GlobalArgs {
    pub fn commit_flags(&self) -> CommitFlags {
        CommitFlags {
            dry_run: self.dry_run,
            force_update_tree: self.force_update_tree,
            no_push: self.no_push,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending access requests and revocations from the ledger.
    Sync(SyncArgs),

    /// Reset admins or expiry dates across sites.
    Reset {
        #[command(subcommand)]
        command: ResetCommand,
    },

    /// Inspect sites in the configuration database.
    Site {
        #[command(subcommand)]
        command: SiteCommand,
    },

    /// Email delivery tools.
    Email {
        #[command(subcommand)]
        command: EmailCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let Cli { global, command } = Cli::parse();
    init_tracing(global.verbose, global.quiet);

    let config = Config::load(global.config.as_deref()).context("failed to load config")?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        match command {
            Commands::Sync(args) => args.run(&global, config).await,
            Commands::Reset { command } => commands::reset::run(command, &global, &config).await,
            Commands::Site { command } => commands::site::run(command, &config).await,
            Commands::Email { command } => commands::email::run(command, &config).await,
        }
    })
}

fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
