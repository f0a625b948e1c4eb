//! burrow CLI: command wiring for the `burrow` binary
//!
//! Builds the runtime configuration from flags and the config file, then
//! hands off to the host or connect flow.

pub mod commands;
pub mod output;
