//! burrow-core: Core abstractions and configuration for burrow
//!
//! This crate provides the shared configuration, error taxonomy, endpoint
//! derivation and tunnel capability traits used by the host, connect and
//! CLI components.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod traits;
pub mod types;

pub use config::Config;
pub use types::{TerminalSize, TunnelRemote, TunnelState};
