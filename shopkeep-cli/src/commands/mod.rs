mod backup;
mod config_cmd;
mod remote;
mod slot;
mod sync_cmd;

pub use backup::BackupCommand;
pub use config_cmd::ConfigCommand;
pub use remote::RemoteCommand;
pub use slot::SlotCommand;
pub use sync_cmd::SyncCommand;
