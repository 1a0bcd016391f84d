//! `gatekeep sync`: apply ledger grants, commit, finalize, notify.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use gatekeep_core::Config;
use gatekeep_sync::{apply_and_commit, finalize_and_notify, SyncOptions, SyncReport};

use crate::GlobalArgs;

use super::{open_ledger, open_store, print_outcome, start_mailer};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Sync all grants, including ones that have already been processed.
    #[arg(long)]
    pub all: bool,

    /// Don't send emails. Implied by --dry-run.
    #[arg(long)]
    pub no_email: bool,

    /// Send every generated email to this address instead of its recipient.
    #[arg(long, value_name = "ADDR")]
    pub recipient_override_email: Option<String>,

    /// Commit to this branch instead of `cdb.branch`.
    #[arg(long, value_name = "NAME")]
    pub branch: Option<String>,
}

impl SyncArgs {
    pub async fn run(self, global: &GlobalArgs, mut config: Config) -> Result<()> {
        if let Some(branch) = self.branch {
            config.cdb.branch = branch;
        }
        let store = open_store(&config)?;
        let ledger = open_ledger(&config).await?;

        let options = SyncOptions {
            dry_run: global.dry_run,
            force_update_tree: global.force_update_tree,
            no_push: global.no_push,
            no_email: self.no_email,
            include_non_pending: self.all,
            recipient_override: self.recipient_override_email,
        };

        let result = match apply_and_commit(&store, &ledger, &options).await {
            Ok(committed) => {
                // The mail server is only dialled once the commit has landed.
                let mailer = if options.dry_run || options.no_email || committed.pending().is_empty() {
                    None
                } else {
                    match start_mailer(&config).await {
                        Ok(mailer) => Some(mailer),
                        Err(err) => {
                            tracing::warn!(error = %format!("{err:#}"), "unable to start email worker, emails will not be sent");
                            None
                        }
                    }
                };
                let result =
                    finalize_and_notify(committed, &store, &ledger, mailer.as_ref(), &options).await;
                if let Some(mailer) = mailer {
                    if let Err(err) = mailer.shutdown().await {
                        tracing::warn!(error = %err, "email worker did not shut down cleanly");
                    }
                }
                result
            }
            Err(err) => Err(err),
        };
        ledger.close().await;

        let report = result.context("sync failed")?;
        print_report(&report, options.dry_run);
        Ok(())
    }
}

fn print_report(report: &SyncReport, dry_run: bool) {
    print_outcome(&report.commit, dry_run);
    println!(
        "  {} grant(s) fetched, {} finalized, {} email(s) queued",
        report.grants_fetched, report.finalized, report.notified
    );
    if report.sites_skipped > 0 {
        println!(
            "  {} {} site(s) not found in cdb, their grants were left pending",
            "!".yellow(),
            report.sites_skipped
        );
    }
}
