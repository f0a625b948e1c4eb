//! CLI command implementations

mod config;
mod session;

pub use config::{config_file_path, config_path, config_show, load_config_file, resolve_config};
pub use session::{connect_command, host_command};
