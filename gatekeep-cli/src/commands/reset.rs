//! `gatekeep reset admins|expiry`.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Subcommand;

use gatekeep_core::Config;
use gatekeep_sync::{reset_admins, reset_expiry, AdminScope};

use crate::GlobalArgs;

use super::{open_ledger, open_store, print_outcome};

#[derive(Subcommand, Debug)]
pub enum ResetCommand {
    /// Clear site admins. By default only sites whose access is managed
    /// through the ledger; immortal admins are kept.
    Admins {
        /// Reset admins on every site in cdb.
        #[arg(long)]
        all: bool,
    },

    /// Set the user expiry date on every site.
    Expiry {
        /// New date, YYYY-MM-DD.
        #[arg(value_parser = parse_date, value_name = "YYYY-MM-DD")]
        date: NaiveDate,
    },
}

pub async fn run(command: ResetCommand, global: &GlobalArgs, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let flags = global.commit_flags();

    let outcome = match command {
        ResetCommand::Admins { all: true } => reset_admins(&store, AdminScope::AllSites, flags)
            .await
            .context("reset admins failed")?,
        ResetCommand::Admins { all: false } => {
            let ledger = open_ledger(config).await?;
            let outcome = reset_admins(&store, AdminScope::ManagedBy(&ledger), flags).await;
            ledger.close().await;
            outcome.context("reset admins failed")?
        }
        ResetCommand::Expiry { date } => reset_expiry(&store, date, flags)
            .await
            .context("reset expiry failed")?,
    };

    print_outcome(&outcome, flags.dry_run);
    Ok(())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| format!("invalid date '{s}', expected YYYY-MM-DD"))
}
