//! Core trait definitions

mod tunnel;

pub use tunnel::{TunnelClient, TunnelClientConfig, TunnelFactory};
