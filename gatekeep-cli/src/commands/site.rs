//! `gatekeep site list|show`.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use gatekeep_core::Config;

use super::open_store;

#[derive(Subcommand, Debug)]
pub enum SiteCommand {
    /// List every site.
    List,

    /// Print one site's record.
    Show {
        /// Site name or numeric id.
        site: String,
    },
}

#[derive(Tabled)]
struct SiteRow {
    id: i64,
    name: String,
    admins: String,
    expiry: String,
    status: String,
}

pub async fn run(command: SiteCommand, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    match command {
        SiteCommand::List => {
            let mut sites = store.get_all().await.context("failed to load sites")?;
            if sites.is_empty() {
                println!("No sites found in {}", store.config().sites_dir().display());
                return Ok(());
            }
            sites.sort_by(|a, b| a.name().cmp(b.name()));

            let rows: Vec<SiteRow> = sites
                .iter()
                .map(|site| {
                    let data = site.snapshot();
                    SiteRow {
                        id: site.id(),
                        name: site.name().to_string(),
                        admins: data.admins.join(", "),
                        expiry: data.expiry,
                        status: if data.disabled {
                            "disabled".red().to_string()
                        } else {
                            "active".green().to_string()
                        },
                    }
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        SiteCommand::Show { site: key } => {
            let found = match key.parse::<i64>() {
                Ok(id) => store.get_by_id(id).await,
                Err(_) => store.get_by_name(&key).await,
            }
            .context("failed to load sites")?;
            let Some(site) = found else {
                bail!("site '{key}' not found");
            };
            println!("{} {}", "#".dimmed(), site.repo_path().display());
            print!("{}", serde_yaml::to_string(&site.snapshot())?);
        }
    }
    Ok(())
}
