//! Remote table credential commands.

use clap::{Args, Subcommand};

use shopkeep_core::remote::DEFAULT_TABLE;
use shopkeep_core::{write_slot, RemoteCredentials, SlotStorage};

use crate::config::Config;

/// Manage remote table credentials
#[derive(Debug, Args)]
pub struct RemoteCommand {
    #[command(subcommand)]
    command: RemoteSubcommand,
}

#[derive(Debug, Subcommand)]
enum RemoteSubcommand {
    /// Store the remote URL and access key
    Configure {
        /// Backend base URL
        #[arg(long)]
        url: String,
        /// Public access key
        #[arg(long)]
        anon_key: String,
        /// Table name
        #[arg(long, default_value = DEFAULT_TABLE)]
        table: String,
    },

    /// Show the stored remote configuration
    Show,

    /// Remove the stored credentials, disabling sync
    Clear,
}

impl RemoteCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let storage = config.storage();
        let key = config.credentials_key();

        match &self.command {
            RemoteSubcommand::Configure {
                url,
                anon_key,
                table,
            } => {
                let creds = RemoteCredentials {
                    url: url.clone(),
                    anon_key: anon_key.clone(),
                    table: table.clone(),
                };
                if !creds.is_configured() {
                    return Err("Both --url and --anon-key must be non-empty".into());
                }
                write_slot(storage.as_ref(), &key, &creds)?;
                println!("Remote sync configured ({} / {}).", creds.url, creds.table);
                Ok(())
            }

            RemoteSubcommand::Show => {
                match RemoteCredentials::load(storage.as_ref(), &key) {
                    Some(creds) => {
                        println!("Remote");
                        println!("======");
                        println!();
                        println!("URL:   {}", creds.url);
                        println!("Table: {}", creds.table);
                        println!("Key:   {}", mask(&creds.anon_key));
                    }
                    None => {
                        println!("Status: Not configured");
                        println!();
                        println!("Run 'shopkeep remote configure --url <URL> --anon-key <KEY>'.");
                    }
                }
                Ok(())
            }

            RemoteSubcommand::Clear => {
                storage.remove_item(&key)?;
                println!("Remote credentials removed.");
                Ok(())
            }
        }
    }
}

/// Shows only the last four characters of a key.
fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}
