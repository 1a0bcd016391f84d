pub mod email;
pub mod reset;
pub mod site;
pub mod sync;

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use gatekeep_core::Config;
use gatekeep_ledger::SqlLedger;
use gatekeep_notify::{EmailRenderer, Mailer, MailerOptions, SmtpTransport};
use gatekeep_store::{CommitOutcome, GitRepository, SiteStore, StoreConfig};

/// Site store over the `cdb.path` checkout.
pub fn open_store(config: &Config) -> Result<SiteStore> {
    let store_config = StoreConfig::from_config(config)?;
    let repo = GitRepository::new(store_config.root.clone());
    Ok(SiteStore::new(store_config, Arc::new(repo)))
}

pub async fn open_ledger(config: &Config) -> Result<SqlLedger> {
    SqlLedger::from_config(config)
        .await
        .context("failed to connect to ledger")
}

/// Start the email worker from `email.*` settings.
pub async fn start_mailer(config: &Config) -> Result<Mailer> {
    let email = &config.email;
    let renderer = EmailRenderer::from_resources(&email.resources_path)
        .context("failed to load email templates")?;
    let transport = Arc::new(SmtpTransport::from_config(email));
    Mailer::start(transport, renderer, &email.sender, MailerOptions::from_config(email))
        .await
        .with_context(|| format!("unable to reach smtp server {}:{}", email.host, email.port))
}

pub fn print_outcome(outcome: &CommitOutcome, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    println!(
        "{prefix}{} {} site(s) changed, {} written",
        "✓".green(),
        outcome.sites_changed,
        outcome.saved.len()
    );
    match &outcome.message {
        Some(message) if outcome.committed => {
            let status = if outcome.pushed {
                "committed and pushed"
            } else {
                "committed locally"
            };
            println!("  {status}: {message}");
        }
        Some(message) => println!("  would commit: {message}"),
        None => println!("  {}", "nothing to commit".dimmed()),
    }
}
