mod config_cmd;
mod mushroom;

pub use config_cmd::ConfigCommand;
pub use mushroom::{AddCommand, ListCommand, WatchCommand};
