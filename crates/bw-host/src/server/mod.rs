//! SSH session server

mod handler;
mod listener;

pub use handler::{server_config, SessionHandler, NO_PTY_MESSAGE};
pub use listener::{serve, SessionServer};
