//! Bulk export and import commands.

use clap::{Args, Subcommand};
use std::fs;
use std::path::PathBuf;

use shopkeep_core::{backup, Backup};

use crate::config::Config;

/// Export or restore every slot under the prefix
#[derive(Debug, Args)]
pub struct BackupCommand {
    #[command(subcommand)]
    command: BackupSubcommand,
}

#[derive(Debug, Subcommand)]
enum BackupSubcommand {
    /// Write all slots to a JSON backup file
    Export {
        /// Output file (default: shopkeep-backup-<date>.json)
        file: Option<PathBuf>,
    },

    /// Replace all slots with the contents of a backup file
    Import {
        /// Backup file to restore
        file: PathBuf,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl BackupCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let storage = config.storage();
        let prefix = &config.prefix.value;

        match &self.command {
            BackupSubcommand::Export { file } => {
                let path = file.clone().unwrap_or_else(default_backup_path);
                let snapshot = backup::export(storage.as_ref(), prefix)?;
                fs::write(&path, snapshot.to_json()?)?;
                println!(
                    "Exported {} slot(s) to {}",
                    snapshot.slots.len(),
                    path.display()
                );
                Ok(())
            }

            BackupSubcommand::Import { file, force } => {
                let text = fs::read_to_string(file)?;
                let snapshot = Backup::from_json(&text)?;

                if !force {
                    use std::io::{self, Write};
                    print!(
                        "Replace every slot under '{}' with {} slot(s) from {}? [y/N] ",
                        prefix,
                        snapshot.slots.len(),
                        file.display()
                    );
                    io::stdout().flush()?;

                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;

                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Cancelled.");
                        return Ok(());
                    }
                }

                let report = backup::restore(storage.as_ref(), prefix, &snapshot)?;
                println!(
                    "Restored {} slot(s) ({} cleared).",
                    report.restored, report.cleared
                );
                Ok(())
            }
        }
    }
}

fn default_backup_path() -> PathBuf {
    PathBuf::from(format!(
        "shopkeep-backup-{}.json",
        chrono::Local::now().format("%Y-%m-%d")
    ))
}
