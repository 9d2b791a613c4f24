//! Slot inspection and editing commands.

use clap::{Args, Subcommand};
use serde_json::Value;

use shopkeep_core::{codec, read_slot, write_slot, SlotRead, SlotStorage};

use crate::config::Config;

/// Inspect and edit stored slots
#[derive(Debug, Args)]
pub struct SlotCommand {
    #[command(subcommand)]
    command: SlotSubcommand,
}

#[derive(Debug, Subcommand)]
enum SlotSubcommand {
    /// List slots under the configured prefix
    List,

    /// Print a slot's decoded value
    Get {
        /// Slot name (prefix optional)
        name: String,
    },

    /// Write a slot from a JSON value
    Set {
        /// Slot name (prefix optional)
        name: String,
        /// JSON value, e.g. '[{"sku":"A1","qty":3}]'
        json: String,
    },

    /// Print a slot's stored text without decoding
    Raw {
        /// Slot name (prefix optional)
        name: String,
    },
}

impl SlotCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let storage = config.storage();

        match &self.command {
            SlotSubcommand::List => list(storage.as_ref(), config),
            SlotSubcommand::Get { name } => get(storage.as_ref(), &config.slot_key(name)),
            SlotSubcommand::Set { name, json } => {
                let key = config.slot_key(name);
                let value: Value = serde_json::from_str(json)
                    .map_err(|e| format!("Invalid JSON for '{}': {}", key, e))?;
                write_slot(storage.as_ref(), &key, &value)?;
                println!(
                    "Wrote {}{}",
                    key,
                    if codec::is_sensitive(&key) {
                        " (obfuscated)"
                    } else {
                        ""
                    }
                );
                Ok(())
            }
            SlotSubcommand::Raw { name } => {
                let key = config.slot_key(name);
                match storage.get_item(&key)? {
                    Some(text) => println!("{}", text),
                    None => return Err(format!("Slot '{}' not found", key).into()),
                }
                Ok(())
            }
        }
    }
}

fn list(storage: &dyn SlotStorage, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let keys = storage.keys_with_prefix(&config.prefix.value)?;

    if keys.is_empty() {
        println!("No slots under '{}'.", config.prefix.value);
        return Ok(());
    }

    for key in keys {
        if codec::is_sensitive(&key) {
            println!("{}  [sensitive]", key);
        } else {
            println!("{}", key);
        }
    }
    Ok(())
}

fn get(storage: &dyn SlotStorage, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    match read_slot(storage, key)? {
        SlotRead::Value(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        SlotRead::Missing => Err(format!("Slot '{}' not found", key).into()),
        SlotRead::Corrupt => Err(format!("Slot '{}' is unreadable", key).into()),
    }
}
