//! `gatekeep email test`.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use gatekeep_core::Config;
use gatekeep_notify::{EmailKind, EmailRequest};

use super::start_mailer;

#[derive(Subcommand, Debug)]
pub enum EmailCommand {
    /// Send a test email.
    Test {
        /// Recipient address.
        address: String,
    },
}

pub async fn run(command: EmailCommand, config: &Config) -> Result<()> {
    match command {
        EmailCommand::Test { address } => {
            let mailer = start_mailer(config).await?;
            let request = EmailRequest::new(EmailKind::Test, address.clone());
            let queued = mailer.send(&request).await;
            mailer.shutdown().await.context("email worker failed")?;
            queued.with_context(|| format!("failed to send test email to {address}"))?;
            println!("{} test email handed to {}:{} for {address}", "✓".green(), config.email.host, config.email.port);
        }
    }
    Ok(())
}
