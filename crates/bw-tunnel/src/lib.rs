//! burrow-tunnel: supervised relay tunnel for burrow
//!
//! Both sides of a burrow reach each other through a public relay. This
//! crate provides the SSH-based relay client and the supervisor that keeps
//! one such client alive for as long as the owning flow runs.

pub mod supervisor;
pub mod tunnel;

pub use supervisor::{SupervisorHandle, TunnelSupervisor};
pub use tunnel::{RelayAddress, SshRelayClient, SshRelayFactory};
