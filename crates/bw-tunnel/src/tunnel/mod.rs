//! Relay tunnel client

mod address;
mod connector;
mod proxy;

pub use address::{RelayAddress, DEFAULT_RELAY_PORT};
pub use connector::{SshRelayClient, SshRelayFactory};
pub use proxy::{connect_via_proxy, ProxyUrl};
